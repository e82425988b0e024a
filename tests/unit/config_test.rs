//! Tests for configuration validation

use session_gate::config::{DeploymentProfile, QueueConfig, ServiceConfig, SessionPoolConfig};

#[test]
fn test_queue_config_validation() {
    let valid = QueueConfig {
        max_concurrency: 3,
        max_queue_depth: 20,
    };
    assert!(valid.validate().is_ok());
    assert_eq!(valid.limits().max_concurrency, 3);
}

#[test]
fn test_queue_config_invalid_concurrency() {
    let invalid = QueueConfig {
        max_concurrency: 0,
        max_queue_depth: 20,
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_queue_config_invalid_depth() {
    let invalid = QueueConfig {
        max_concurrency: 3,
        max_queue_depth: 0,
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_session_config_invalid_capacity() {
    assert!(SessionPoolConfig { max_sessions: 0 }.validate().is_err());
    assert!(SessionPoolConfig { max_sessions: 1 }.validate().is_ok());
}

#[test]
fn test_profile_detection() {
    assert_eq!(
        DeploymentProfile::detect(|_| None),
        DeploymentProfile::Standard
    );
    assert_eq!(
        DeploymentProfile::detect(|name| (name == "RENDER").then(|| "true".to_string())),
        DeploymentProfile::Constrained
    );
    // An empty marker does not count.
    assert_eq!(
        DeploymentProfile::detect(|name| (name == "REPL_ID").then(String::new)),
        DeploymentProfile::Standard
    );
}

#[test]
fn test_service_config_from_json() {
    let json = r#"{
        "queue": { "max_concurrency": 4, "max_queue_depth": 40 },
        "sessions": { "max_sessions": 2 }
    }"#;

    let config = ServiceConfig::from_json_str(json).unwrap();
    assert_eq!(config.queue.max_concurrency, 4);
    assert_eq!(config.sessions.max_sessions, 2);
}

#[test]
fn test_service_config_from_json_rejects_invalid() {
    let json = r#"{
        "queue": { "max_concurrency": 4, "max_queue_depth": 0 },
        "sessions": { "max_sessions": 2 }
    }"#;
    let err = ServiceConfig::from_json_str(json).unwrap_err();
    assert!(err.contains("queue invalid"));

    assert!(ServiceConfig::from_json_str("{").is_err());
}
