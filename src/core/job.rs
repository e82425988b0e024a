//! Job lifecycle types and the unit-of-work abstraction.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::core::AppResult;
use crate::util::serde::{PriorityClass, Sequence, UserId};

/// Lifecycle state of a job.
///
/// `Waiting -> Active -> {Completed, Failed, Cancelled}` plus the direct
/// `Waiting -> Cancelled` edge. Only `Waiting` and `Active` are non-terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Admitted, not started.
    Waiting,
    /// Running in an active slot.
    Active,
    /// Unit of work returned successfully.
    Completed,
    /// Unit of work returned an error or panicked.
    Failed,
    /// Removed before starting, or stopped after acknowledging cancellation.
    Cancelled,
}

impl JobState {
    /// Whether no further transition can happen.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Final report for a job, delivered through its [`JobHandle`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// Unit of work finished.
    Completed,
    /// Unit of work failed; the reason is the rendered error.
    Failed(String),
    /// Job was cancelled, either while waiting or at a checkpoint.
    Cancelled,
}

impl JobOutcome {
    /// Terminal state this outcome corresponds to.
    #[must_use]
    pub const fn state(&self) -> JobState {
        match self {
            Self::Completed => JobState::Completed,
            Self::Failed(_) => JobState::Failed,
            Self::Cancelled => JobState::Cancelled,
        }
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// An opaque asynchronous operation run in an active slot.
///
/// Implementations must poll `cancel` at their own checkpoints and return
/// promptly (usually with an error) once it fires; the queue never aborts a
/// running unit of work.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use session_gate::core::{AppResult, UnitOfWork};
/// use tokio_util::sync::CancellationToken;
///
/// struct Download { url: String }
///
/// #[async_trait]
/// impl UnitOfWork for Download {
///     async fn run(self: Box<Self>, cancel: CancellationToken) -> AppResult<()> {
///         for chunk in fetch_chunks(&self.url) {
///             if cancel.is_cancelled() {
///                 anyhow::bail!("download cancelled");
///             }
///             write_chunk(chunk).await?;
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait UnitOfWork: Send + 'static {
    /// Run to completion or until `cancel` is observed.
    async fn run(self: Box<Self>, cancel: CancellationToken) -> AppResult<()>;
}

/// Adapter turning a closure into a [`UnitOfWork`].
pub struct WorkFn<F>(F);

#[async_trait]
impl<F, Fut> UnitOfWork for WorkFn<F>
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = AppResult<()>> + Send + 'static,
{
    async fn run(self: Box<Self>, cancel: CancellationToken) -> AppResult<()> {
        (self.0)(cancel).await
    }
}

/// Box a closure as a unit of work.
pub fn work_fn<F, Fut>(f: F) -> Box<dyn UnitOfWork>
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = AppResult<()>> + Send + 'static,
{
    Box::new(WorkFn(f))
}

/// Completion channel of one admitted job.
///
/// Resolves once the job reaches a terminal state.
#[derive(Debug, Clone)]
pub struct JobHandle {
    user: UserId,
    sequence: Sequence,
    rx: watch::Receiver<Option<JobOutcome>>,
}

impl JobHandle {
    pub(crate) fn channel(
        user: UserId,
        sequence: Sequence,
    ) -> (Self, watch::Sender<Option<JobOutcome>>) {
        let (tx, rx) = watch::channel(None);
        (Self { user, sequence, rx }, tx)
    }

    /// User that owns the job.
    #[must_use]
    pub const fn user(&self) -> UserId {
        self.user
    }

    /// Submission sequence number assigned at admission.
    #[must_use]
    pub const fn sequence(&self) -> Sequence {
        self.sequence
    }

    /// Outcome if the job already finished.
    #[must_use]
    pub fn try_outcome(&self) -> Option<JobOutcome> {
        self.rx.borrow().clone()
    }

    /// Wait for the job to reach a terminal state.
    pub async fn outcome(mut self) -> JobOutcome {
        wait_outcome(&mut self.rx).await
    }
}

/// Wait on a completion channel; a dropped sender counts as cancellation.
pub(crate) async fn wait_outcome(rx: &mut watch::Receiver<Option<JobOutcome>>) -> JobOutcome {
    let seen = rx.wait_for(Option::is_some).await.map(|o| o.clone());
    match seen {
        Ok(Some(outcome)) => outcome,
        _ => rx.borrow().clone().unwrap_or(JobOutcome::Cancelled),
    }
}

/// A job sitting in the waiting sequence.
pub(crate) struct WaitingJob {
    pub user: UserId,
    pub class: PriorityClass,
    pub sequence: Sequence,
    pub submitted_at_ms: u128,
    pub work: Box<dyn UnitOfWork>,
    pub done: watch::Sender<Option<JobOutcome>>,
}

impl fmt::Debug for WaitingJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitingJob")
            .field("user", &self.user)
            .field("class", &self.class)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

/// Bookkeeping for a job occupying an active slot.
pub(crate) struct ActiveJob {
    pub class: PriorityClass,
    pub sequence: Sequence,
    pub started_at_ms: u128,
    pub cancel: CancellationToken,
    pub done: watch::Receiver<Option<JobOutcome>>,
}
