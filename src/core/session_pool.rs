//! Capacity-bounded pool of per-user sessions with LRU eviction.
//!
//! Each resident entry carries a recency rank and a busy count. When the pool is
//! full and a new user arrives, the least recently used *idle* entry (count 0)
//! is torn down to make room. Busy entries are never evicted: if every resident
//! entry is busy, [`SessionPool::acquire`] parks until one goes idle or is
//! released.
//!
//! The busy count lives in an atomic shared with every [`SessionLease`], so a
//! lease gives its mark back on drop without touching the table lock. Counts
//! only grow under the table lock, which keeps an entry seen idle there idle
//! until the lock is released.
//!
//! The table lives behind a single async mutex that is held across handle
//! construction, so two concurrent acquires for the same new user build the
//! connection exactly once.

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, info};

use crate::core::audit::{self, AuditSink, SharedAuditSink};
use crate::core::{ConnectionFactory, PoolError};
use crate::util::serde::UserId;

const COMPONENT: &str = "sessions";

/// Snapshot of pool utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SessionStats {
    /// Sessions currently resident.
    pub resident: usize,
    /// Sessions currently marked busy.
    pub busy: usize,
    /// Configured maximum.
    pub capacity: usize,
    /// Handles built by the factory.
    pub created: u64,
    /// Acquires served by an already-resident handle.
    pub reused: u64,
    /// Handles torn down to make room.
    pub evicted: u64,
    /// Handles removed by explicit release.
    pub released: u64,
    /// Factory failures surfaced to callers.
    pub factory_failures: u64,
    /// Teardown failures that were logged and ignored.
    pub teardown_failures: u64,
}

#[derive(Debug, Default)]
struct SessionCounters {
    created: AtomicU64,
    reused: AtomicU64,
    evicted: AtomicU64,
    released: AtomicU64,
    factory_failures: AtomicU64,
    teardown_failures: AtomicU64,
}

struct SessionEntry<C> {
    connection: Arc<C>,
    rank: u64,
    busy: Arc<AtomicU32>,
}

impl<C> SessionEntry<C> {
    fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire) > 0
    }
}

/// Give back one busy mark; `true` when the entry just became idle.
fn unmark(busy: &AtomicU32) -> bool {
    busy.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        .is_ok_and(|previous| previous == 1)
}

/// A resident connection held busy until dropped.
///
/// Dropping the lease, including on panic or when the owning future is
/// cancelled, gives back its busy mark and wakes acquirers waiting for an
/// evictable entry.
pub struct SessionLease<C> {
    user: UserId,
    connection: Arc<C>,
    busy: Arc<AtomicU32>,
    idle: Arc<Notify>,
}

impl<C> SessionLease<C> {
    /// User the session belongs to.
    #[must_use]
    pub const fn user(&self) -> UserId {
        self.user
    }

    /// Shared handle to the connection.
    #[must_use]
    pub fn connection(&self) -> Arc<C> {
        Arc::clone(&self.connection)
    }
}

impl<C> Deref for SessionLease<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.connection
    }
}

impl<C> fmt::Debug for SessionLease<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLease")
            .field("user", &self.user)
            .field("busy", &self.busy.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<C> Drop for SessionLease<C> {
    fn drop(&mut self) {
        if unmark(&self.busy) {
            self.idle.notify_waiters();
        }
    }
}

type Acquired<C> = (Arc<C>, Arc<AtomicU32>);

/// Key -> entry arena; `rank` grows on every touch so the smallest rank is the LRU.
struct SessionTable<C> {
    entries: HashMap<UserId, SessionEntry<C>>,
    tick: u64,
}

impl<C> SessionTable<C> {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            tick: 0,
        }
    }

    fn next_rank(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    /// Mark `user` most recently used and hand back its connection.
    fn promote(&mut self, user: UserId, busy: bool) -> Option<Acquired<C>> {
        let rank = self.next_rank();
        let entry = self.entries.get_mut(&user)?;
        entry.rank = rank;
        if busy {
            entry.busy.fetch_add(1, Ordering::AcqRel);
        }
        Some((Arc::clone(&entry.connection), Arc::clone(&entry.busy)))
    }

    fn insert(&mut self, user: UserId, connection: Arc<C>, busy: bool) -> Arc<AtomicU32> {
        let rank = self.next_rank();
        let count = Arc::new(AtomicU32::new(u32::from(busy)));
        self.entries.insert(
            user,
            SessionEntry {
                connection,
                rank,
                busy: Arc::clone(&count),
            },
        );
        count
    }

    fn lru_idle(&self) -> Option<UserId> {
        self.entries
            .iter()
            .filter(|(_, e)| !e.is_busy())
            .min_by_key(|(_, e)| e.rank)
            .map(|(user, _)| *user)
    }

    fn remove(&mut self, user: UserId) -> Option<Arc<C>> {
        self.entries.remove(&user).map(|e| e.connection)
    }

    fn busy_count(&self, user: UserId) -> Option<&AtomicU32> {
        self.entries.get(&user).map(|e| e.busy.as_ref())
    }

    fn by_recency(&self) -> Vec<UserId> {
        let mut ranked: Vec<(u64, UserId)> =
            self.entries.iter().map(|(u, e)| (e.rank, *u)).collect();
        ranked.sort_unstable();
        ranked.into_iter().map(|(_, u)| u).collect()
    }
}

/// Bounded, LRU-evicting pool of live per-user connections.
pub struct SessionPool<F: ConnectionFactory> {
    factory: F,
    max_sessions: usize,
    table: Mutex<SessionTable<F::Connection>>,
    /// Signaled whenever an entry turns idle or a slot frees up.
    idle: Arc<Notify>,
    counters: SessionCounters,
    audit: Option<SharedAuditSink>,
}

impl<F: ConnectionFactory> SessionPool<F> {
    /// Create a pool holding at most `max_sessions` live connections.
    ///
    /// A capacity of zero is raised to one; configuration validation rejects it
    /// earlier on the normal construction path.
    pub fn new(factory: F, max_sessions: usize) -> Self {
        let max_sessions = max_sessions.max(1);
        info!(max_sessions, "session pool initialized");
        Self {
            factory,
            max_sessions,
            table: Mutex::new(SessionTable::new(max_sessions)),
            idle: Arc::new(Notify::new()),
            counters: SessionCounters::default(),
            audit: None,
        }
    }

    /// Attach an audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Box<dyn AuditSink>) -> Self {
        self.audit = Some(Arc::new(parking_lot::Mutex::new(audit)));
        self
    }

    /// Configured maximum number of resident sessions.
    pub const fn capacity(&self) -> usize {
        self.max_sessions
    }

    /// The factory this pool builds connections with.
    pub const fn factory(&self) -> &F {
        &self.factory
    }

    /// Get the resident connection for `user`, or build one.
    ///
    /// Parks while the pool is full and every resident entry is busy.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Factory`] when the connection cannot be built; the
    /// pool is left without an entry for `user`.
    pub async fn acquire(
        &self,
        user: UserId,
        credentials: &F::Credentials,
    ) -> Result<Arc<F::Connection>, PoolError> {
        let (connection, _) = self.acquire_inner(user, credentials, false, true).await?;
        Ok(connection)
    }

    /// Like [`acquire`](Self::acquire), but adds a busy mark in the same
    /// critical section so the entry cannot be evicted before the caller uses
    /// it. Pair every call with [`mark_idle`](Self::mark_idle).
    ///
    /// # Errors
    ///
    /// Same as [`acquire`](Self::acquire).
    pub async fn acquire_busy(
        &self,
        user: UserId,
        credentials: &F::Credentials,
    ) -> Result<Arc<F::Connection>, PoolError> {
        let (connection, _) = self.acquire_inner(user, credentials, true, true).await?;
        Ok(connection)
    }

    /// Acquire `user`'s session with a busy mark that the returned lease gives
    /// back when dropped.
    ///
    /// # Errors
    ///
    /// Same as [`acquire`](Self::acquire).
    pub async fn lease(
        &self,
        user: UserId,
        credentials: &F::Credentials,
    ) -> Result<SessionLease<F::Connection>, PoolError> {
        let (connection, busy) = self.acquire_inner(user, credentials, true, true).await?;
        Ok(SessionLease {
            user,
            connection,
            busy,
            idle: Arc::clone(&self.idle),
        })
    }

    /// Non-blocking variant of [`acquire`](Self::acquire).
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::NoIdleVictim`] instead of waiting when the pool is
    /// full of busy entries, and [`PoolError::Factory`] on construction failure.
    pub async fn try_acquire(
        &self,
        user: UserId,
        credentials: &F::Credentials,
    ) -> Result<Arc<F::Connection>, PoolError> {
        let (connection, _) = self.acquire_inner(user, credentials, false, false).await?;
        Ok(connection)
    }

    async fn acquire_inner(
        &self,
        user: UserId,
        credentials: &F::Credentials,
        busy: bool,
        wait: bool,
    ) -> Result<Acquired<F::Connection>, PoolError> {
        loop {
            // Register before inspecting the table so a mark_idle that lands
            // after we drop the lock still wakes us.
            let idle = self.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();

            let mut table = self.table.lock().await;

            if let Some(acquired) = table.promote(user, busy) {
                self.counters.reused.fetch_add(1, Ordering::Relaxed);
                debug!(user_id = user, "reusing resident session");
                return Ok(acquired);
            }

            if table.len() >= self.max_sessions {
                let Some(victim) = table.lru_idle() else {
                    if !wait {
                        return Err(PoolError::NoIdleVictim {
                            capacity: self.max_sessions,
                        });
                    }
                    drop(table);
                    debug!(
                        user_id = user,
                        capacity = self.max_sessions,
                        "all sessions busy, waiting for one to go idle"
                    );
                    idle.await;
                    continue;
                };

                if let Some(evicted) = table.remove(victim) {
                    self.counters.evicted.fetch_add(1, Ordering::Relaxed);
                    info!(
                        user_id = victim,
                        for_user = user,
                        "evicting least recently used session"
                    );
                    self.teardown(victim, &evicted).await;
                    audit::record(
                        self.audit.as_ref(),
                        victim,
                        COMPONENT,
                        "evict",
                        Some(format!("for user {user}")),
                    );
                }
            }

            let connection = match self.factory.connect(user, credentials).await {
                Ok(connection) => Arc::new(connection),
                Err(e) => {
                    self.counters
                        .factory_failures
                        .fetch_add(1, Ordering::Relaxed);
                    error!(user_id = user, error = %e, "failed to create session");
                    drop(table);
                    // An eviction may have freed a slot someone else can use.
                    self.idle.notify_waiters();
                    return Err(PoolError::Factory(e));
                }
            };

            let count = table.insert(user, Arc::clone(&connection), busy);
            self.counters.created.fetch_add(1, Ordering::Relaxed);
            info!(
                user_id = user,
                resident = table.len(),
                capacity = self.max_sessions,
                "created new session"
            );
            audit::record(self.audit.as_ref(), user, COMPONENT, "create", None);
            return Ok((connection, count));
        }
    }

    /// Add a busy mark to `user`'s session so eviction skips it.
    ///
    /// Marks nest: the entry stays busy until every mark is given back.
    /// Returns `false` if `user` has no resident session.
    pub async fn mark_busy(&self, user: UserId) -> bool {
        let table = self.table.lock().await;
        let Some(busy) = table.busy_count(user) else {
            return false;
        };
        busy.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Give back one busy mark; once none remain, wake anyone waiting for an
    /// evictable entry. Extra calls on an idle entry are ignored.
    ///
    /// Returns `false` if `user` has no resident session.
    pub async fn mark_idle(&self, user: UserId) -> bool {
        let table = self.table.lock().await;
        let Some(busy) = table.busy_count(user) else {
            return false;
        };
        let now_idle = unmark(busy);
        drop(table);
        if now_idle {
            self.idle.notify_waiters();
        }
        true
    }

    /// Remove and disconnect `user`'s session, e.g. on logout. Idempotent.
    ///
    /// Returns `true` if a session was resident.
    pub async fn release(&self, user: UserId) -> bool {
        let mut table = self.table.lock().await;
        let Some(connection) = table.remove(user) else {
            return false;
        };
        self.teardown(user, &connection).await;
        drop(table);

        self.counters.released.fetch_add(1, Ordering::Relaxed);
        self.idle.notify_waiters();
        info!(user_id = user, "released session");
        audit::record(self.audit.as_ref(), user, COMPONENT, "release", None);
        true
    }

    /// Disconnect every resident session. Used at process shutdown.
    ///
    /// Returns the number of sessions torn down.
    pub async fn release_all(&self) -> usize {
        let mut table = self.table.lock().await;
        let drained: Vec<(UserId, Arc<F::Connection>)> = table
            .entries
            .drain()
            .map(|(user, entry)| (user, entry.connection))
            .collect();
        for (user, connection) in &drained {
            self.teardown(*user, connection).await;
            audit::record(self.audit.as_ref(), *user, COMPONENT, "release", None);
        }
        drop(table);

        let count = drained.len();
        self.counters
            .released
            .fetch_add(count as u64, Ordering::Relaxed);
        self.idle.notify_waiters();
        info!(count, "all sessions disconnected");
        count
    }

    /// Number of resident sessions.
    pub async fn len(&self) -> usize {
        self.table.lock().await.len()
    }

    /// Whether no session is resident.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether `user` has a resident session.
    pub async fn contains(&self, user: UserId) -> bool {
        self.table.lock().await.entries.contains_key(&user)
    }

    /// Whether `user`'s session is resident and marked busy.
    pub async fn is_busy(&self, user: UserId) -> bool {
        self.table
            .lock()
            .await
            .entries
            .get(&user)
            .is_some_and(SessionEntry::is_busy)
    }

    /// Resident users ordered from least to most recently used.
    pub async fn resident_keys(&self) -> Vec<UserId> {
        self.table.lock().await.by_recency()
    }

    /// Current utilization and lifetime counters.
    pub async fn stats(&self) -> SessionStats {
        let table = self.table.lock().await;
        SessionStats {
            resident: table.len(),
            busy: table.entries.values().filter(|e| e.is_busy()).count(),
            capacity: self.max_sessions,
            created: self.counters.created.load(Ordering::Relaxed),
            reused: self.counters.reused.load(Ordering::Relaxed),
            evicted: self.counters.evicted.load(Ordering::Relaxed),
            released: self.counters.released.load(Ordering::Relaxed),
            factory_failures: self.counters.factory_failures.load(Ordering::Relaxed),
            teardown_failures: self.counters.teardown_failures.load(Ordering::Relaxed),
        }
    }

    /// Disconnect a handle leaving the pool; failures are logged, never raised.
    async fn teardown(&self, user: UserId, connection: &F::Connection) {
        if let Err(e) = self.factory.disconnect(user, connection).await {
            self.counters
                .teardown_failures
                .fetch_add(1, Ordering::Relaxed);
            error!(user_id = user, error = %e, "error disconnecting session");
        }
    }
}
