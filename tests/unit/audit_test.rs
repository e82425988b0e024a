//! Tests for audit sinks

use session_gate::core::{build_audit_event, AuditSink, InMemoryAuditSink, SharedBufferSink};

#[test]
fn test_in_memory_audit_sink() {
    let mut sink = InMemoryAuditSink::new(10);

    let event = build_audit_event(42, "queue", "enqueue", Some("position 1".to_string()));
    sink.record(event.clone());

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_id, event.event_id);
    assert_eq!(events[0].user_id, 42);
    assert_eq!(events[0].action, "enqueue");
}

#[test]
fn test_audit_sink_overflow() {
    let mut sink = InMemoryAuditSink::new(2);

    sink.record(build_audit_event(1, "queue", "enqueue", None));
    sink.record(build_audit_event(2, "queue", "enqueue", None));
    sink.record(build_audit_event(3, "queue", "enqueue", None));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].user_id, 2); // oldest dropped
    assert_eq!(events[1].user_id, 3);
}

#[test]
fn test_zero_capacity_sink_drops_everything() {
    let mut sink = InMemoryAuditSink::new(0);
    sink.record(build_audit_event(1, "sessions", "create", None));
    assert!(sink.events().is_empty());
}

#[test]
fn test_build_audit_event() {
    let event = build_audit_event(7, "sessions", "evict", Some("for user 9".to_string()));

    assert_eq!(event.user_id, 7);
    assert_eq!(event.component, "sessions");
    assert_eq!(event.action, "evict");
    assert_eq!(event.detail, Some("for user 9".to_string()));
    assert!(event.created_at_ms > 0);
    assert_ne!(event.event_id, build_audit_event(7, "sessions", "evict", None).event_id);
}

#[test]
fn test_shared_buffer_sink_is_readable_after_move() {
    let reader = SharedBufferSink::new();
    let mut boxed: Box<dyn AuditSink> = Box::new(reader.clone());

    boxed.record(build_audit_event(1, "queue", "enqueue", None));
    boxed.record(build_audit_event(2, "queue", "enqueue", None));
    boxed.record(build_audit_event(1, "queue", "start", None));

    assert_eq!(reader.actions_for(1), vec!["enqueue", "start"]);
    assert_eq!(reader.events().len(), 3);
}
