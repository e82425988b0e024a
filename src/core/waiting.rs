//! Waiting sequence ordered by priority band, FIFO within a band.
//!
//! Layout is a single deque split at `premium_len`: every premium job sits in
//! `[0, premium_len)` and every standard job after it. A new job goes to the
//! tail of its own band, so a premium arrival lands ahead of all standard jobs
//! but behind earlier premium ones.
//!
//! The position index maps each waiting user to its slot and is rewritten from
//! the point of every mutation onward, which keeps duplicate checks and
//! position lookups O(1) without scanning the sequence.

use std::collections::{HashMap, VecDeque};

use crate::core::job::WaitingJob;
use crate::util::serde::{PriorityClass, UserId};

/// Priority-banded waiting sequence with a user -> slot index.
#[derive(Debug, Default)]
pub(crate) struct WaitingQueue {
    jobs: VecDeque<WaitingJob>,
    premium_len: usize,
    index: HashMap<UserId, usize>,
}

impl WaitingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub const fn premium_len(&self) -> usize {
        self.premium_len
    }

    pub fn standard_len(&self) -> usize {
        self.jobs.len() - self.premium_len
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.index.contains_key(&user)
    }

    /// 1-based position of `user`, if waiting.
    pub fn position(&self, user: UserId) -> Option<usize> {
        self.index.get(&user).map(|slot| slot + 1)
    }

    /// Priority class of `user`'s waiting job.
    pub fn class_of(&self, user: UserId) -> Option<PriorityClass> {
        self.index
            .get(&user)
            .and_then(|slot| self.jobs.get(*slot))
            .map(|job| job.class)
    }

    /// Insert at the tail of the job's band and return its 1-based position.
    ///
    /// Callers must have checked [`contains`](Self::contains) first.
    pub fn push(&mut self, job: WaitingJob) -> usize {
        debug_assert!(!self.contains(job.user));
        let slot = match job.class {
            PriorityClass::Premium => {
                self.premium_len += 1;
                self.premium_len - 1
            }
            PriorityClass::Standard => self.jobs.len(),
        };
        self.jobs.insert(slot, job);
        self.reindex_from(slot);
        slot + 1
    }

    /// Remove the head: highest class, earliest sequence.
    pub fn pop_front(&mut self) -> Option<WaitingJob> {
        let job = self.jobs.pop_front()?;
        self.forget(&job, 0);
        Some(job)
    }

    /// Remove `user`'s job wherever it sits.
    pub fn remove(&mut self, user: UserId) -> Option<WaitingJob> {
        let slot = *self.index.get(&user)?;
        let job = self.jobs.remove(slot)?;
        self.forget(&job, slot);
        Some(job)
    }

    /// Empty the sequence, head first.
    pub fn drain(&mut self) -> Vec<WaitingJob> {
        self.index.clear();
        self.premium_len = 0;
        self.jobs.drain(..).collect()
    }

    /// Users in dequeue order.
    pub fn users(&self) -> Vec<UserId> {
        self.jobs.iter().map(|job| job.user).collect()
    }

    fn forget(&mut self, job: &WaitingJob, slot: usize) {
        self.index.remove(&job.user);
        if job.class == PriorityClass::Premium {
            self.premium_len -= 1;
        }
        self.reindex_from(slot);
    }

    fn reindex_from(&mut self, slot: usize) {
        for (offset, job) in self.jobs.iter().enumerate().skip(slot) {
            self.index.insert(job.user, offset);
        }
    }
}
