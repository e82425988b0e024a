//! Admission, ordering, and the scheduler loop.
//!
//! All queue bookkeeping (waiting sequence, position index, active set) lives
//! in one [`QueueState`] behind a single `parking_lot::Mutex`. The lock is
//! never held across an await point, so status queries never wait on job
//! execution.
//!
//! A single background loop moves jobs from the waiting sequence into the
//! active set while slots are free, then parks on a [`Notify`] that `submit`,
//! `cancel`, and job completion all signal. A completed job removes itself
//! from the active set *before* publishing its outcome, so anyone awaiting the
//! outcome observes the slot already freed.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::audit::{self, AuditSink, SharedAuditSink};
use crate::core::job::{ActiveJob, JobHandle, JobOutcome, UnitOfWork, WaitingJob};
use crate::core::status::{JobStatus, QueueCounters};
use crate::core::waiting::WaitingQueue;
use crate::core::QueueError;
use crate::util::clock::now_ms;
use crate::util::serde::{PriorityClass, Sequence, UserId};

const COMPONENT: &str = "queue";

/// Abstraction for spawning task execution on a runtime.
pub trait Spawn: Clone + Send + Sync + 'static {
    /// Spawn a detached future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Capacity limits for the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueLimits {
    /// Maximum concurrently active jobs.
    pub max_concurrency: usize,
    /// Maximum waiting jobs once every active slot is taken.
    pub max_queue_depth: usize,
}

/// Result of a successful submission.
#[derive(Debug)]
pub struct Accepted {
    /// 1-based position in the waiting sequence at admission time.
    pub position: usize,
    /// Jobs waiting right after admission, this one included.
    pub waiting: usize,
    /// Jobs active at admission time.
    pub active: usize,
    /// Completion channel of the admitted job.
    pub handle: JobHandle,
}

impl Accepted {
    /// Whether a slot was free at admission, i.e. the job starts right away.
    #[must_use]
    pub const fn starts_immediately(&self, capacity: usize) -> bool {
        self.active < capacity && self.position <= capacity - self.active
    }
}

/// Shared queue state: one lock for waiting sequence, index, and active set.
pub(crate) struct QueueState {
    pub waiting: WaitingQueue,
    pub active: HashMap<UserId, ActiveJob>,
    next_sequence: Sequence,
    accepting: bool,
}

impl QueueState {
    fn new() -> Self {
        Self {
            waiting: WaitingQueue::new(),
            active: HashMap::new(),
            next_sequence: 0,
            accepting: true,
        }
    }

    /// Current standing of `user`, if they hold a waiting or active job.
    pub fn presence(&self, user: UserId) -> Option<JobStatus> {
        if let Some(job) = self.active.get(&user) {
            return Some(JobStatus::Active { class: job.class });
        }
        let position = self.waiting.position(user)?;
        let class = self.waiting.class_of(user)?;
        Some(JobStatus::Waiting {
            position,
            class,
            waiting: self.waiting.len(),
        })
    }
}

pub(crate) struct Shared {
    pub state: Mutex<QueueState>,
    pub wake: Notify,
    pub limits: QueueLimits,
    pub counters: QueueCounters,
    pub audit: Option<SharedAuditSink>,
}

impl Shared {
    /// Move as many waiting jobs into the active set as capacity allows.
    fn take_ready(&self) -> Vec<(WaitingJob, CancellationToken)> {
        let mut state = self.state.lock();
        let mut ready = Vec::new();
        while state.active.len() < self.limits.max_concurrency {
            let Some(job) = state.waiting.pop_front() else {
                break;
            };
            let cancel = CancellationToken::new();
            state.active.insert(
                job.user,
                ActiveJob {
                    class: job.class,
                    sequence: job.sequence,
                    started_at_ms: now_ms(),
                    cancel: cancel.clone(),
                    done: job.done.subscribe(),
                },
            );
            ready.push((job, cancel));
        }
        if !ready.is_empty() {
            debug!(
                started = ready.len(),
                active = state.active.len(),
                waiting = state.waiting.len(),
                "dequeued waiting jobs"
            );
        }
        ready
    }

    /// Remove a finished job from the active set and account for its outcome.
    fn finish(&self, user: UserId, sequence: Sequence, outcome: &JobOutcome) {
        let (active, waiting, elapsed_ms) = {
            let mut state = self.state.lock();
            let elapsed_ms = match state.active.get(&user) {
                Some(job) if job.sequence == sequence => {
                    let started = job.started_at_ms;
                    state.active.remove(&user);
                    now_ms().saturating_sub(started)
                }
                _ => 0,
            };
            (state.active.len(), state.waiting.len(), elapsed_ms)
        };

        let action = match outcome {
            JobOutcome::Completed => {
                QueueCounters::bump(&self.counters.completed);
                info!(user_id = user, active, waiting, elapsed_ms, "job completed");
                "complete"
            }
            JobOutcome::Failed(reason) => {
                QueueCounters::bump(&self.counters.failed);
                error!(user_id = user, reason = %reason, active, waiting, "job failed");
                "fail"
            }
            JobOutcome::Cancelled => {
                QueueCounters::bump(&self.counters.cancelled);
                info!(user_id = user, active, waiting, "active job cancelled");
                "cancel"
            }
        };
        let detail = match outcome {
            JobOutcome::Failed(reason) => Some(reason.clone()),
            _ => None,
        };
        audit::record(self.audit.as_ref(), user, COMPONENT, action, detail);
    }

    /// Account for a waiting job removed before it ever started.
    pub fn dequeued_cancelled(&self, job: WaitingJob) {
        job.done.send_replace(Some(JobOutcome::Cancelled));
        QueueCounters::bump(&self.counters.cancelled);
        info!(
            user_id = job.user,
            sequence = job.sequence,
            "removed waiting job from queue"
        );
        audit::record(self.audit.as_ref(), job.user, COMPONENT, "cancel", None);
    }
}

/// Start a dequeued job as an independently progressing task.
fn launch<S: Spawn>(shared: &Arc<Shared>, spawner: &S, job: WaitingJob, cancel: CancellationToken) {
    let WaitingJob {
        user,
        class,
        sequence,
        submitted_at_ms,
        work,
        done,
    } = job;

    QueueCounters::bump(&shared.counters.started);
    info!(
        user_id = user,
        sequence,
        class = class.label(),
        waited_ms = now_ms().saturating_sub(submitted_at_ms),
        "started job"
    );
    audit::record(shared.audit.as_ref(), user, COMPONENT, "start", None);

    let shared = Arc::clone(shared);
    spawner.spawn(async move {
        let result = AssertUnwindSafe(work.run(cancel.clone()))
            .catch_unwind()
            .await;
        let outcome = match result {
            Ok(Ok(())) => JobOutcome::Completed,
            Ok(Err(_)) if cancel.is_cancelled() => JobOutcome::Cancelled,
            Ok(Err(e)) => JobOutcome::Failed(format!("{e:#}")),
            Err(_) => JobOutcome::Failed("unit of work panicked".into()),
        };

        shared.finish(user, sequence, &outcome);
        done.send_replace(Some(outcome));
        shared.wake.notify_one();
    });
}

async fn scheduler_loop<S: Spawn>(shared: Arc<Shared>, spawner: S, stop: CancellationToken) {
    info!(
        max_concurrency = shared.limits.max_concurrency,
        "queue scheduler started"
    );
    loop {
        for (job, cancel) in shared.take_ready() {
            launch(&shared, &spawner, job, cancel);
        }
        tokio::select! {
            () = stop.cancelled() => break,
            () = shared.wake.notified() => {}
        }
    }
    info!("queue scheduler stopped");
}

#[derive(Default)]
struct LoopControl {
    stop: Option<CancellationToken>,
    exited: Option<oneshot::Receiver<()>>,
}

/// Priority admission queue with a bounded active set.
///
/// # Example
///
/// ```rust,ignore
/// use session_gate::core::{work_fn, JobQueue, QueueLimits};
/// use session_gate::runtime::TokioSpawner;
/// use session_gate::util::PriorityClass;
///
/// let queue = JobQueue::new(
///     QueueLimits { max_concurrency: 20, max_queue_depth: 100 },
///     TokioSpawner::current(),
/// );
/// queue.start();
///
/// let accepted = queue.submit(user_id, PriorityClass::Standard, work_fn(|cancel| async move {
///     download(cancel).await
/// }))?;
/// println!("queued at #{}", accepted.position);
/// let outcome = accepted.handle.outcome().await;
/// ```
pub struct JobQueue<S: Spawn> {
    pub(crate) shared: Arc<Shared>,
    spawner: S,
    control: Mutex<LoopControl>,
}

impl<S: Spawn> JobQueue<S> {
    /// Create a stopped queue; call [`start`](Self::start) to begin dispatching.
    ///
    /// Zero limits are raised to one.
    pub fn new(limits: QueueLimits, spawner: S) -> Self {
        let limits = QueueLimits {
            max_concurrency: limits.max_concurrency.max(1),
            max_queue_depth: limits.max_queue_depth.max(1),
        };
        info!(
            max_concurrency = limits.max_concurrency,
            max_queue_depth = limits.max_queue_depth,
            "job queue initialized"
        );
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::new()),
                wake: Notify::new(),
                limits,
                counters: QueueCounters::default(),
                audit: None,
            }),
            spawner,
            control: Mutex::new(LoopControl::default()),
        }
    }

    /// Attach an audit sink. Must be called before the queue is shared.
    #[must_use]
    pub fn with_audit(mut self, audit: Box<dyn AuditSink>) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.audit = Some(Arc::new(Mutex::new(audit)));
        } else {
            warn!("audit sink ignored: queue state already shared");
        }
        self
    }

    /// Configured limits.
    pub fn limits(&self) -> QueueLimits {
        self.shared.limits
    }

    /// Spawn the scheduler loop. Idempotent.
    pub fn start(&self) {
        let mut control = self.control.lock();
        if control.stop.is_some() {
            return;
        }
        self.shared.state.lock().accepting = true;

        let stop = CancellationToken::new();
        let (exited_tx, exited_rx) = oneshot::channel::<()>();
        let shared = Arc::clone(&self.shared);
        let spawner = self.spawner.clone();
        let token = stop.clone();
        self.spawner.spawn(async move {
            scheduler_loop(shared, spawner, token).await;
            drop(exited_tx);
        });

        control.stop = Some(stop);
        control.exited = Some(exited_rx);
    }

    /// Whether the scheduler loop is running.
    pub fn is_running(&self) -> bool {
        self.control.lock().stop.is_some()
    }

    /// Stop the scheduler loop and wait for it to exit.
    ///
    /// Further submissions are refused; running jobs are left to finish and
    /// waiting jobs stay queued until [`start`](Self::start) or
    /// [`cancel_all`](Self::cancel_all).
    pub async fn stop(&self) {
        let (stop, exited) = {
            // Admission flips under the control lock so it always agrees with
            // `is_running` against a concurrent `start`.
            let mut control = self.control.lock();
            self.shared.state.lock().accepting = false;
            (control.stop.take(), control.exited.take())
        };

        if let Some(stop) = stop {
            stop.cancel();
        }
        if let Some(exited) = exited {
            // The sender is dropped when the loop returns.
            let _ = exited.await;
        }
    }

    /// Stop dispatching, then cancel everything. Returns the cancelled count.
    pub async fn shutdown(&self) -> usize {
        self.stop().await;
        self.cancel_all().await
    }

    /// Admit a job for `user`.
    ///
    /// The job goes to the tail of its priority band; a premium job never
    /// preempts one that is already active.
    ///
    /// # Errors
    ///
    /// - [`QueueError::DuplicateSubmission`] if `user` already has a waiting or
    ///   active job; the current status is reported and `work` is dropped.
    /// - [`QueueError::QueueFull`] if every slot is taken and the waiting
    ///   sequence is at its depth limit.
    /// - [`QueueError::ShuttingDown`] after [`stop`](Self::stop).
    pub fn submit(
        &self,
        user: UserId,
        class: PriorityClass,
        work: Box<dyn UnitOfWork>,
    ) -> Result<Accepted, QueueError> {
        let mut state = self.shared.state.lock();

        if !state.accepting {
            drop(state);
            QueueCounters::bump(&self.shared.counters.rejected);
            return Err(QueueError::ShuttingDown);
        }

        if let Some(status) = state.presence(user) {
            drop(state);
            QueueCounters::bump(&self.shared.counters.rejected);
            warn!(user_id = user, %status, "duplicate submission rejected");
            return Err(QueueError::DuplicateSubmission { status });
        }

        let limits = self.shared.limits;
        if state.active.len() >= limits.max_concurrency
            && state.waiting.len() >= limits.max_queue_depth
        {
            let waiting = state.waiting.len();
            drop(state);
            QueueCounters::bump(&self.shared.counters.rejected);
            warn!(user_id = user, waiting, "queue full, submission rejected");
            return Err(QueueError::QueueFull {
                waiting,
                max_depth: limits.max_queue_depth,
            });
        }

        state.next_sequence += 1;
        let sequence = state.next_sequence;
        let (handle, done) = JobHandle::channel(user, sequence);
        let position = state.waiting.push(WaitingJob {
            user,
            class,
            sequence,
            submitted_at_ms: now_ms(),
            work,
            done,
        });
        let waiting = state.waiting.len();
        let active = state.active.len();
        drop(state);

        QueueCounters::bump(&self.shared.counters.submitted);
        info!(
            user_id = user,
            sequence,
            class = class.label(),
            position,
            waiting,
            active,
            "job enqueued"
        );
        audit::record(
            self.shared.audit.as_ref(),
            user,
            COMPONENT,
            "enqueue",
            Some(format!("position {position}")),
        );
        self.shared.wake.notify_one();

        Ok(Accepted {
            position,
            waiting,
            active,
            handle,
        })
    }
}

impl<S: Spawn> Drop for JobQueue<S> {
    fn drop(&mut self) {
        // Let the loop exit; running jobs keep their own Arc<Shared>.
        if let Some(stop) = self.control.get_mut().stop.take() {
            stop.cancel();
            debug!("JobQueue dropped without explicit stop - scheduler loop signalled");
        }
    }
}
