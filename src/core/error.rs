//! Error types for pool and queue operations.

use thiserror::Error;

use crate::core::status::JobStatus;

/// Errors produced by admission, cancellation, and scheduling.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The user already has a waiting or running job.
    #[error("already queued or running: {status}")]
    DuplicateSubmission {
        /// Where the existing job currently stands.
        status: JobStatus,
    },
    /// Every slot is busy and the waiting sequence is at its depth limit.
    #[error("queue full: {waiting} waiting (max {max_depth})")]
    QueueFull {
        /// Jobs currently waiting.
        waiting: usize,
        /// Configured maximum depth.
        max_depth: usize,
    },
    /// Cancel target has neither a waiting nor an active job.
    #[error("no waiting or active job found")]
    NotFound,
    /// The scheduler has been stopped and no longer admits work.
    #[error("queue is shutting down")]
    ShuttingDown,
}

/// Errors raised by a connection factory while building or tearing down a handle.
#[derive(Debug, Clone, Error)]
pub enum FactoryError {
    /// Stored credentials were rejected, expired, or revoked.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// The remote side could not be reached or refused the connection.
    #[error("unavailable: {0}")]
    Unavailable(String),
    /// Disconnecting an existing handle failed.
    #[error("teardown failed: {0}")]
    Teardown(String),
}

impl FactoryError {
    /// Whether the failure means the stored credentials are no longer usable.
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

/// Errors surfaced by the session pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Handle construction or validation failed; nothing was inserted.
    #[error("session factory failed: {0}")]
    Factory(#[from] FactoryError),
    /// Pool is at capacity and every resident handle is busy.
    ///
    /// Only returned by the non-blocking acquire path; the blocking path waits.
    #[error("all {capacity} sessions are busy")]
    NoIdleVictim {
        /// Configured maximum number of sessions.
        capacity: usize,
    },
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
