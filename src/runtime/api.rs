//! Operations consumed by the surrounding command handlers.
//!
//! These wrap the core types into the plain response shapes a chat command
//! handler renders: a flag, a human-readable message, and a position.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::{
    Cancellation, ConnectionFactory, GlobalStatus, JobHandle, JobQueue, JobStatus, PoolError,
    QueueError, SessionPool, Spawn, TierLookup, UnitOfWork,
};
use crate::util::serde::{PriorityClass, UserId};

/// Minutes of estimated wait per queue position.
pub const MINUTES_PER_POSITION: usize = 2;

/// Outcome of a submission, ready to show to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// Whether the job was admitted.
    pub accepted: bool,
    /// Message for the user.
    pub message: String,
    /// Position in the waiting sequence (admitted) or of the existing job
    /// (duplicate); 0 when not applicable.
    pub position: usize,
    /// Completion channel of the admitted job.
    #[serde(skip)]
    pub handle: Option<JobHandle>,
}

/// Outcome of a cancel request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResponse {
    /// Whether a job was cancelled.
    pub success: bool,
    /// Message for the user.
    pub message: String,
}

/// Aggregate status as exposed to callers.
pub type GlobalStatusResponse = GlobalStatus;

/// Submit `work` for `user`, choosing the priority band via `tiers`.
pub async fn submit_for<S, T>(
    queue: &JobQueue<S>,
    tiers: &T,
    user: UserId,
    work: Box<dyn UnitOfWork>,
) -> SubmitResponse
where
    S: Spawn,
    T: TierLookup + ?Sized,
{
    let class = PriorityClass::from_premium(tiers.is_premium(user).await);
    let capacity = queue.limits().max_concurrency;

    match queue.submit(user, class, work) {
        Ok(accepted) => {
            let message = if accepted.starts_immediately(capacity) {
                "Download started.".to_string()
            } else {
                format!(
                    "Queued ({}) at position #{}/{}. Estimated wait: ~{} minutes.",
                    class.label(),
                    accepted.position,
                    accepted.waiting,
                    accepted.position * MINUTES_PER_POSITION
                )
            };
            SubmitResponse {
                accepted: true,
                message,
                position: accepted.position,
                handle: Some(accepted.handle),
            }
        }
        Err(QueueError::DuplicateSubmission { status }) => {
            let (message, position) = match status {
                JobStatus::Waiting {
                    position, waiting, ..
                } => (
                    format!(
                        "You already have a download in the queue (position #{position}/{waiting}). \
                         Cancel it first to submit another."
                    ),
                    position,
                ),
                _ => (
                    "You already have a download in progress. \
                     Wait for it to complete or cancel it first."
                        .to_string(),
                    0,
                ),
            };
            rejected(message, position)
        }
        Err(QueueError::QueueFull { waiting, max_depth }) => {
            let status = queue.global_status();
            rejected(
                format!(
                    "Download queue is full. Active downloads: {}/{}, waiting: {waiting}/{max_depth}. \
                     Please try again later.",
                    status.active, status.capacity
                ),
                0,
            )
        }
        Err(e) => rejected(format!("Download not accepted: {e}."), 0),
    }
}

fn rejected(message: String, position: usize) -> SubmitResponse {
    SubmitResponse {
        accepted: false,
        message,
        position,
        handle: None,
    }
}

/// Cancel `user`'s download, waiting or active.
pub async fn cancel_download<S: Spawn>(queue: &JobQueue<S>, user: UserId) -> CancelResponse {
    match queue.cancel(user).await {
        Ok(Cancellation::Dequeued) => CancelResponse {
            success: true,
            message: "Removed from download queue.".into(),
        },
        Ok(Cancellation::Stopped(_)) => CancelResponse {
            success: true,
            message: "Active download cancelled.".into(),
        },
        Err(_) => CancelResponse {
            success: false,
            message: "No active download or queue entry found.".into(),
        },
    }
}

/// Operator kill switch: cancel everything and return how many jobs stopped.
pub async fn cancel_all<S: Spawn>(queue: &JobQueue<S>) -> usize {
    queue.cancel_all().await
}

/// Aggregate queue status.
pub fn global_status<S: Spawn>(queue: &JobQueue<S>) -> GlobalStatusResponse {
    queue.global_status()
}

/// Human-readable status of `user`'s job.
pub fn status_message<S: Spawn>(queue: &JobQueue<S>, user: UserId) -> String {
    let global = queue.global_status();
    match queue.status_of(user) {
        JobStatus::Active { .. } => format!(
            "Your download is currently active.\nActive downloads: {}/{}\nWaiting in queue: {}/{}",
            global.active, global.capacity, global.waiting, global.max_queue_depth
        ),
        JobStatus::Waiting {
            position,
            class,
            waiting,
        } => format!(
            "You're in the queue ({}).\nYour position: #{position}/{waiting}\n\
             Active downloads: {}/{}\nEstimated wait: ~{} minutes",
            class.label(),
            global.active,
            global.capacity,
            position * MINUTES_PER_POSITION
        ),
        JobStatus::Idle => format!(
            "No active downloads.\nActive downloads: {}/{}\nWaiting in queue: {}/{}",
            global.active, global.capacity, global.waiting, global.max_queue_depth
        ),
    }
}

/// Human-readable aggregate status with the premium/standard breakdown.
pub fn global_status_message<S: Spawn>(queue: &JobQueue<S>) -> String {
    let s = queue.global_status();
    format!(
        "Queue system status\nActive downloads: {}/{}\nWaiting in queue: {}/{}\n\
         Premium in queue: {}\nFree in queue: {}",
        s.active, s.capacity, s.waiting, s.max_queue_depth, s.premium_waiting, s.standard_waiting
    )
}

/// Run `f` with `user`'s session held busy, so eviction cannot interrupt it.
///
/// The busy mark is held by a [`SessionLease`](crate::core::SessionLease), so it
/// is given back whether `f` succeeds, fails, panics, or this future is dropped
/// mid-call. Overlapping calls for one user each hold their own mark. When the
/// factory reports an authorization failure the error is returned as-is; the
/// caller owns the stored credentials and should discard them.
///
/// # Errors
///
/// Returns the pool error if the session cannot be acquired, otherwise
/// whatever `f` returns.
pub async fn with_session<F, T, Fut, Op>(
    pool: &SessionPool<F>,
    user: UserId,
    credentials: &F::Credentials,
    op: Op,
) -> Result<T, anyhow::Error>
where
    F: ConnectionFactory,
    Op: FnOnce(Arc<F::Connection>) -> Fut,
    Fut: Future<Output = Result<T, anyhow::Error>>,
{
    let lease = match pool.lease(user, credentials).await {
        Ok(lease) => lease,
        Err(PoolError::Factory(e)) if e.is_auth_failure() => {
            warn!(user_id = user, error = %e, "stored credentials rejected");
            return Err(PoolError::Factory(e).into());
        }
        Err(e) => return Err(e.into()),
    };

    let result = op(lease.connection()).await;
    drop(lease);
    result
}

/// Log a user out: drop any queued or running download, then release their session.
///
/// Returns whether a session was resident.
pub async fn logout<F, S>(pool: &SessionPool<F>, queue: &JobQueue<S>, user: UserId) -> bool
where
    F: ConnectionFactory,
    S: Spawn,
{
    // NotFound just means there was nothing to cancel.
    let _ = queue.cancel(user).await;
    pool.release(user).await
}
