//! Core pool, queue, and scheduling abstractions.

pub mod audit;
pub mod cancel;
pub mod collaborators;
pub mod error;
pub mod job;
pub mod queue;
pub mod session_pool;
pub mod status;
mod waiting;

pub use audit::{AuditEvent, AuditSink, InMemoryAuditSink, SharedBufferSink, build_audit_event};
pub use cancel::Cancellation;
pub use collaborators::{ConnectionFactory, TierLookup};
pub use error::{AppResult, FactoryError, PoolError, QueueError};
pub use job::{JobHandle, JobOutcome, JobState, UnitOfWork, WorkFn, work_fn};
pub use queue::{Accepted, JobQueue, QueueLimits, Spawn};
pub use session_pool::{SessionLease, SessionPool, SessionStats};
pub use status::{GlobalStatus, JobStatus, QueueSnapshot, QueueStats};
