//! Builders to construct the pool and queue from configuration.

pub mod service_builder;

pub use service_builder::{build_job_queue, build_service, build_session_pool, Service};
