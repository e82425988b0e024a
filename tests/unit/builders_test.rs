//! Tests for builder modules

use async_trait::async_trait;

use session_gate::builders::{build_job_queue, build_service, build_session_pool};
use session_gate::config::{QueueConfig, ServiceConfig, SessionPoolConfig};
use session_gate::core::{work_fn, ConnectionFactory, FactoryError, JobOutcome};
use session_gate::runtime::TokioSpawner;
use session_gate::util::serde::{PriorityClass, UserId};

struct EchoFactory;

#[async_trait]
impl ConnectionFactory for EchoFactory {
    type Connection = UserId;
    type Credentials = ();

    async fn connect(&self, user: UserId, _credentials: &()) -> Result<UserId, FactoryError> {
        Ok(user)
    }

    async fn disconnect(&self, _user: UserId, _connection: &UserId) -> Result<(), FactoryError> {
        Ok(())
    }
}

fn config() -> ServiceConfig {
    ServiceConfig {
        queue: QueueConfig {
            max_concurrency: 2,
            max_queue_depth: 8,
        },
        sessions: SessionPoolConfig { max_sessions: 4 },
    }
}

#[test]
fn test_build_session_pool_uses_capacity() {
    let pool = build_session_pool(&SessionPoolConfig { max_sessions: 4 }, EchoFactory).unwrap();
    assert_eq!(pool.capacity(), 4);
}

#[test]
fn test_build_rejects_zero_limits() {
    assert!(build_session_pool(&SessionPoolConfig { max_sessions: 0 }, EchoFactory).is_err());

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let bad = QueueConfig {
        max_concurrency: 0,
        max_queue_depth: 8,
    };
    assert!(build_job_queue(&bad, TokioSpawner::new(runtime.handle().clone())).is_err());
}

#[tokio::test]
async fn test_build_job_queue_is_stopped() {
    let queue = build_job_queue(&config().queue, TokioSpawner::current()).unwrap();
    assert!(!queue.is_running());
    assert_eq!(queue.limits().max_concurrency, 2);
    assert_eq!(queue.limits().max_queue_depth, 8);
}

#[tokio::test]
async fn test_build_service_runs_and_shuts_down() {
    let service = build_service(&config(), EchoFactory, TokioSpawner::current()).unwrap();
    assert!(service.queue.is_running());

    let connection = service.sessions.acquire(11, &()).await.unwrap();
    assert_eq!(*connection, 11);

    let accepted = service
        .queue
        .submit(11, PriorityClass::Standard, work_fn(|_| async { Ok(()) }))
        .unwrap();
    assert_eq!(accepted.handle.outcome().await, JobOutcome::Completed);

    let (jobs, sessions) = service.shutdown().await;
    assert_eq!(jobs, 0);
    assert_eq!(sessions, 1);
    assert!(!service.queue.is_running());
    assert!(service.sessions.is_empty().await);
}
