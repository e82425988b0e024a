//! Tests for error types

use session_gate::core::{FactoryError, JobStatus, PoolError, QueueError};
use session_gate::util::serde::PriorityClass;

#[test]
fn test_queue_full_error() {
    let err = QueueError::QueueFull {
        waiting: 20,
        max_depth: 20,
    };
    assert_eq!(format!("{}", err), "queue full: 20 waiting (max 20)");
}

#[test]
fn test_duplicate_error_carries_status() {
    let err = QueueError::DuplicateSubmission {
        status: JobStatus::Waiting {
            position: 3,
            class: PriorityClass::Standard,
            waiting: 5,
        },
    };
    assert_eq!(
        format!("{}", err),
        "already queued or running: waiting at position 3/5"
    );
}

#[test]
fn test_not_found_and_shutdown_errors() {
    assert_eq!(
        format!("{}", QueueError::NotFound),
        "no waiting or active job found"
    );
    assert_eq!(format!("{}", QueueError::ShuttingDown), "queue is shutting down");
}

#[test]
fn test_factory_error_classification() {
    assert!(FactoryError::Unauthorized("revoked".into()).is_auth_failure());
    assert!(!FactoryError::Unavailable("timeout".into()).is_auth_failure());
    assert!(!FactoryError::Teardown("closed".into()).is_auth_failure());
}

#[test]
fn test_pool_error_wraps_factory_error() {
    let err: PoolError = FactoryError::Unavailable("dc down".into()).into();
    assert_eq!(
        format!("{}", err),
        "session factory failed: unavailable: dc down"
    );
}
