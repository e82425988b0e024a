//! # Session Gate
//!
//! Admission control for a service where every user request needs two scarce
//! things at once: a live, authenticated per-user connection and one of a
//! small number of global execution slots (a "download").
//!
//! ## Core Problem Solved
//!
//! - **Heavyweight connections**: each user session costs a lot of memory, so
//!   only a handful may be resident at a time
//! - **Global slot ceiling**: concurrent downloads are capped to keep the host alive
//! - **Fairness with tiers**: paying users go ahead of free users, without ever
//!   preempting a download already running
//! - **One job per user**: duplicate submissions are refused with the current position
//! - **Cooperative cancellation**: users and operators can stop work, and the
//!   call returns once the work has actually let go of its slot
//!
//! ## Key Features
//!
//! - **SessionPool**: capacity-bounded LRU pool that never evicts a busy session;
//!   callers wait instead
//! - **JobQueue**: premium-then-standard, FIFO-within-band waiting sequence with
//!   O(1) position lookups, drained by a single scheduler loop
//! - **Cancellation**: waiting jobs are removed outright; active jobs are signalled
//!   through a cancellation token and awaited
//! - **Status**: per-user position and aggregate counts that never block on running work
//!
//! ## Example
//!
//! ```rust,ignore
//! use session_gate::builders::build_service;
//! use session_gate::config::ServiceConfig;
//! use session_gate::core::work_fn;
//! use session_gate::runtime::{submit_for, TokioSpawner};
//!
//! let cfg = ServiceConfig::from_env()?;
//! let service = build_service(&cfg, my_factory, TokioSpawner::current())?;
//!
//! let client = service.sessions.acquire(user_id, &session_string).await?;
//! let response = submit_for(&service.queue, &tiers, user_id, work_fn(move |cancel| async move {
//!     download_with(client, cancel).await
//! }))
//! .await;
//! println!("{}", response.message);
//! ```
//!
//! For complete examples, see:
//! - `tests/queue_scenarios_test.rs` - ordering, duplicate, and cancellation scenarios
//! - `tests/session_pool_test.rs` - eviction and busy protection

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core pool, queue, and scheduling abstractions.
pub mod core;
/// Configuration models for the queue and session pool.
pub mod config;
/// Builders to construct the pool and queue from configuration.
pub mod builders;
/// Infrastructure adapters for collaborator interfaces.
pub mod infra;
/// Runtime adapters and the command-handler API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
