//! Configuration models for the queue and session pool.

pub mod service;

pub use service::{DeploymentProfile, QueueConfig, ServiceConfig, SessionPoolConfig};
