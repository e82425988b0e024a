//! Read-only views over the queue: per-user status, aggregate status, counters.
//!
//! Every query takes the state lock briefly and never waits on job execution.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::core::queue::{JobQueue, Spawn};
use crate::util::serde::{PriorityClass, UserId};

/// Where a user's job currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum JobStatus {
    /// Waiting to start.
    Waiting {
        /// 1-based position in dequeue order.
        position: usize,
        /// Priority band the job sits in.
        class: PriorityClass,
        /// Total jobs waiting.
        waiting: usize,
    },
    /// Occupying an active slot.
    Active {
        /// Priority band the job was admitted with.
        class: PriorityClass,
    },
    /// No waiting or active job.
    Idle,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting {
                position, waiting, ..
            } => write!(f, "waiting at position {position}/{waiting}"),
            Self::Active { .. } => write!(f, "active"),
            Self::Idle => write!(f, "idle"),
        }
    }
}

/// Aggregate queue state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalStatus {
    /// Jobs waiting.
    pub waiting: usize,
    /// Jobs running.
    pub active: usize,
    /// Maximum concurrently running jobs.
    pub capacity: usize,
    /// Maximum waiting jobs while every slot is taken.
    pub max_queue_depth: usize,
    /// Waiting jobs in the premium band.
    pub premium_waiting: usize,
    /// Waiting jobs in the standard band.
    pub standard_waiting: usize,
}

/// Membership of both sets, read under one lock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Waiting users in dequeue order.
    pub waiting: Vec<UserId>,
    /// Active users, ascending.
    pub active: Vec<UserId>,
}

/// Lifetime counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Jobs admitted.
    pub submitted: u64,
    /// Submissions refused (duplicate, full, shutting down).
    pub rejected: u64,
    /// Jobs moved into an active slot.
    pub started: u64,
    /// Jobs that completed.
    pub completed: u64,
    /// Jobs that failed.
    pub failed: u64,
    /// Jobs cancelled while waiting or running.
    pub cancelled: u64,
}

#[derive(Debug, Default)]
pub(crate) struct QueueCounters {
    pub submitted: AtomicU64,
    pub rejected: AtomicU64,
    pub started: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub cancelled: AtomicU64,
}

impl QueueCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> QueueStats {
        QueueStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            started: self.started.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

impl<S: Spawn> JobQueue<S> {
    /// Status of `user`'s job.
    pub fn status_of(&self, user: UserId) -> JobStatus {
        self.shared
            .state
            .lock()
            .presence(user)
            .unwrap_or(JobStatus::Idle)
    }

    /// Aggregate waiting/active counts against capacity.
    pub fn global_status(&self) -> GlobalStatus {
        let state = self.shared.state.lock();
        GlobalStatus {
            waiting: state.waiting.len(),
            active: state.active.len(),
            capacity: self.shared.limits.max_concurrency,
            max_queue_depth: self.shared.limits.max_queue_depth,
            premium_waiting: state.waiting.premium_len(),
            standard_waiting: state.waiting.standard_len(),
        }
    }

    /// Lifetime counters.
    pub fn stats(&self) -> QueueStats {
        self.shared.counters.snapshot()
    }

    /// Waiting and active membership as of one instant.
    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.shared.state.lock();
        let mut active: Vec<UserId> = state.active.keys().copied().collect();
        active.sort_unstable();
        QueueSnapshot {
            waiting: state.waiting.users(),
            active,
        }
    }

    /// Waiting users in dequeue order.
    pub fn waiting_users(&self) -> Vec<UserId> {
        self.shared.state.lock().waiting.users()
    }

    /// Users with a running job, ascending.
    pub fn active_users(&self) -> Vec<UserId> {
        self.snapshot().active
    }
}
