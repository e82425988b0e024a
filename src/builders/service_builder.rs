//! Builders to construct the session pool and job queue from configuration.

use std::sync::Arc;

use crate::config::{QueueConfig, ServiceConfig, SessionPoolConfig};
use crate::core::{ConnectionFactory, JobQueue, SessionPool, Spawn};

/// A configured pool and queue, ready to share across command handlers.
pub struct Service<F: ConnectionFactory, S: Spawn> {
    /// Session pool.
    pub sessions: Arc<SessionPool<F>>,
    /// Download queue; its scheduler loop is already running.
    pub queue: Arc<JobQueue<S>>,
}

impl<F: ConnectionFactory, S: Spawn> Service<F, S> {
    /// Stop the scheduler, cancel every job, then disconnect every session.
    ///
    /// Returns the number of cancelled jobs and released sessions.
    pub async fn shutdown(&self) -> (usize, usize) {
        let jobs = self.queue.shutdown().await;
        let sessions = self.sessions.release_all().await;
        tracing::info!(jobs, sessions, "service shut down");
        (jobs, sessions)
    }
}

/// Build a session pool from its configuration section.
pub fn build_session_pool<F: ConnectionFactory>(
    cfg: &SessionPoolConfig,
    factory: F,
) -> Result<SessionPool<F>, String> {
    cfg.validate()?;
    Ok(SessionPool::new(factory, cfg.max_sessions))
}

/// Build a stopped job queue from its configuration section.
pub fn build_job_queue<S: Spawn>(cfg: &QueueConfig, spawner: S) -> Result<JobQueue<S>, String> {
    cfg.validate()?;
    Ok(JobQueue::new(cfg.limits(), spawner))
}

/// Build both halves and start the scheduler loop.
///
/// # Errors
///
/// Fails when any configuration section is invalid.
pub fn build_service<F, S>(
    cfg: &ServiceConfig,
    factory: F,
    spawner: S,
) -> Result<Service<F, S>, anyhow::Error>
where
    F: ConnectionFactory,
    S: Spawn,
{
    cfg.validate()
        .map_err(|e| anyhow::anyhow!("config invalid: {e}"))?;

    let sessions = build_session_pool(&cfg.sessions, factory).map_err(anyhow::Error::msg)?;
    let queue = build_job_queue(&cfg.queue, spawner).map_err(anyhow::Error::msg)?;
    queue.start();

    Ok(Service {
        sessions: Arc::new(sessions),
        queue: Arc::new(queue),
    })
}
