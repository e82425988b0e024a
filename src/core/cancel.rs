//! Cooperative cancellation of waiting and active jobs.
//!
//! A waiting job is pulled out of the sequence and never started. An active
//! job gets its token cancelled; the call then waits until the unit of work
//! reaches a checkpoint, returns, and its slot has been released.

use futures::future::join_all;
use tracing::info;

use crate::core::job::{wait_outcome, JobOutcome};
use crate::core::queue::{JobQueue, Spawn};
use crate::core::QueueError;
use crate::util::serde::UserId;

/// What a successful cancel did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cancellation {
    /// The job was still waiting and has been removed without starting.
    Dequeued,
    /// The job was active; it acknowledged and finished with this outcome.
    ///
    /// Usually [`JobOutcome::Cancelled`], but a job that completed before
    /// reaching its next checkpoint reports its real outcome.
    Stopped(JobOutcome),
}

impl<S: Spawn> JobQueue<S> {
    /// Cancel `user`'s waiting or active job.
    ///
    /// For an active job this waits for the unit of work to acknowledge.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotFound`] when `user` has no job.
    pub async fn cancel(&self, user: UserId) -> Result<Cancellation, QueueError> {
        let mut done = {
            let mut state = self.shared.state.lock();
            if let Some(job) = state.waiting.remove(user) {
                drop(state);
                self.shared.dequeued_cancelled(job);
                self.shared.wake.notify_one();
                return Ok(Cancellation::Dequeued);
            }
            let Some(active) = state.active.get(&user) else {
                return Err(QueueError::NotFound);
            };
            active.cancel.cancel();
            active.done.clone()
        };

        info!(
            user_id = user,
            "cancellation requested, waiting for active job to acknowledge"
        );
        let outcome = wait_outcome(&mut done).await;
        Ok(Cancellation::Stopped(outcome))
    }

    /// Cancel every waiting and active job; the operator kill switch.
    ///
    /// Waits until every active job has acknowledged. Returns how many jobs
    /// were cancelled.
    pub async fn cancel_all(&self) -> usize {
        let (drained, pending) = {
            let mut state = self.shared.state.lock();
            let drained = state.waiting.drain();
            let pending: Vec<_> = state
                .active
                .values()
                .map(|job| {
                    job.cancel.cancel();
                    job.done.clone()
                })
                .collect();
            (drained, pending)
        };

        let waiting = drained.len();
        let active = pending.len();
        for job in drained {
            self.shared.dequeued_cancelled(job);
        }

        join_all(pending.into_iter().map(|mut done| async move {
            wait_outcome(&mut done).await
        }))
        .await;

        self.shared.wake.notify_one();
        info!(waiting, active, "cancelled all jobs");
        waiting + active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::job::work_fn;
    use crate::core::queue::QueueLimits;
    use crate::runtime::TokioSpawner;
    use crate::util::serde::PriorityClass;
    use std::time::Duration;

    fn queue(max_concurrency: usize) -> JobQueue<TokioSpawner> {
        JobQueue::new(
            QueueLimits {
                max_concurrency,
                max_queue_depth: 10,
            },
            TokioSpawner::current(),
        )
    }

    #[tokio::test]
    async fn test_cancel_unknown_user() {
        let q = queue(1);
        assert!(matches!(q.cancel(9).await, Err(QueueError::NotFound)));
    }

    #[tokio::test]
    async fn test_cancel_waiting_never_starts() {
        // Not started, so nothing is ever dequeued.
        let q = queue(1);
        let accepted = q
            .submit(
                1,
                PriorityClass::Standard,
                work_fn(|_| async { anyhow::bail!("must not run") }),
            )
            .unwrap();

        assert_eq!(q.cancel(1).await.unwrap(), Cancellation::Dequeued);
        assert_eq!(accepted.handle.outcome().await, JobOutcome::Cancelled);
        assert_eq!(q.stats().started, 0);
        assert_eq!(q.stats().cancelled, 1);
    }

    #[tokio::test]
    async fn test_cancel_all_counts_both_sets() {
        let q = queue(1);
        q.start();
        for user in 1..=3 {
            q.submit(
                user,
                PriorityClass::Standard,
                work_fn(|cancel| async move {
                    cancel.cancelled().await;
                    anyhow::bail!("stopped")
                }),
            )
            .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(q.active_users().len(), 1);

        assert_eq!(q.cancel_all().await, 3);
        let status = q.global_status();
        assert_eq!(status.waiting, 0);
        assert_eq!(status.active, 0);
        q.stop().await;
    }
}
