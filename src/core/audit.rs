//! Audit trail of session and job lifecycle events.
//!
//! The pool and the queue record one event per transition when a sink is
//! attached. The in-memory sink keeps a bounded ring so that a long-running
//! process can dump its most recent history when something goes wrong.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::util::clock::now_ms;
use crate::util::serde::UserId;

/// Audit event structure.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// User the event is about.
    pub user_id: UserId,
    /// Emitting component (`sessions` or `queue`).
    pub component: String,
    /// Action taken (create, evict, release, enqueue, start, complete, fail, cancel).
    pub action: String,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context.
    pub detail: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);
}

/// Shared handle to a sink, as held by the pool and the queue.
pub type SharedAuditSink = Arc<Mutex<Box<dyn AuditSink>>>;

/// In-memory audit sink for testing and dev.
pub struct InMemoryAuditSink {
    events: VecDeque<AuditEvent>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.iter().cloned().collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        if self.max_events == 0 {
            return;
        }
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Sink that clones every event into a shared buffer readable from elsewhere.
///
/// Handy in tests, where the sink itself is moved into the pool or queue.
#[derive(Clone, Default)]
pub struct SharedBufferSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl SharedBufferSink {
    /// Create an empty buffer sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Actions recorded so far for `user`, oldest first.
    #[must_use]
    pub fn actions_for(&self, user: UserId) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.user_id == user)
            .map(|e| e.action.clone())
            .collect()
    }

    /// Snapshot of every recorded event.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }
}

impl AuditSink for SharedBufferSink {
    fn record(&mut self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}

/// Helper to build an audit event with a fresh id and the current time.
pub fn build_audit_event(
    user_id: UserId,
    component: impl Into<String>,
    action: impl Into<String>,
    detail: Option<String>,
) -> AuditEvent {
    AuditEvent {
        event_id: uuid::Uuid::new_v4().to_string(),
        user_id,
        component: component.into(),
        action: action.into(),
        created_at_ms: now_ms(),
        detail,
    }
}

/// Record into an optional sink.
pub(crate) fn record(
    sink: Option<&SharedAuditSink>,
    user_id: UserId,
    component: &str,
    action: &str,
    detail: Option<String>,
) {
    if let Some(sink) = sink {
        sink.lock()
            .record(build_audit_event(user_id, component, action, detail));
    }
}
