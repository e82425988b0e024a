//! Queue and session-pool configuration structures.

use serde::{Deserialize, Serialize};

use crate::core::QueueLimits;

/// Environment variables whose presence marks a memory-constrained host.
pub const CONSTRAINED_HOST_VARS: [&str; 4] =
    ["RENDER", "RENDER_EXTERNAL_URL", "REPLIT_DEPLOYMENT", "REPL_ID"];

/// Override for [`QueueConfig::max_concurrency`].
pub const ENV_MAX_CONCURRENT: &str = "MAX_CONCURRENT_DOWNLOADS";
/// Override for [`QueueConfig::max_queue_depth`].
pub const ENV_MAX_QUEUE_DEPTH: &str = "MAX_QUEUE_DEPTH";
/// Override for [`SessionPoolConfig::max_sessions`].
pub const ENV_MAX_SESSIONS: &str = "MAX_SESSIONS";

/// Deployment profile used to pick default limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentProfile {
    /// Regular host.
    Standard,
    /// Small-memory host (free-tier PaaS); every connection and download is
    /// expensive, so limits are much tighter.
    Constrained,
}

impl DeploymentProfile {
    /// Detect the profile from an environment lookup.
    pub fn detect(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let constrained = CONSTRAINED_HOST_VARS
            .iter()
            .any(|name| lookup(name).is_some_and(|v| !v.is_empty()));
        if constrained {
            Self::Constrained
        } else {
            Self::Standard
        }
    }
}

/// Queue limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum concurrently running jobs.
    pub max_concurrency: usize,
    /// Maximum waiting jobs once every slot is taken.
    pub max_queue_depth: usize,
}

/// Session pool limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPoolConfig {
    /// Maximum resident sessions.
    pub max_sessions: usize,
}

/// Root service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Download queue limits.
    pub queue: QueueConfig,
    /// Session pool limits.
    pub sessions: SessionPoolConfig,
}

impl QueueConfig {
    /// Validate queue configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrency == 0 {
            return Err("max_concurrency must be greater than 0".into());
        }
        if self.max_queue_depth == 0 {
            return Err("max_queue_depth must be greater than 0".into());
        }
        Ok(())
    }

    /// Limits in the form the queue takes.
    #[must_use]
    pub const fn limits(&self) -> QueueLimits {
        QueueLimits {
            max_concurrency: self.max_concurrency,
            max_queue_depth: self.max_queue_depth,
        }
    }
}

impl SessionPoolConfig {
    /// Validate session pool configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_sessions == 0 {
            return Err("max_sessions must be greater than 0".into());
        }
        Ok(())
    }
}

impl ServiceConfig {
    /// Defaults for a deployment profile.
    #[must_use]
    pub const fn for_profile(profile: DeploymentProfile) -> Self {
        match profile {
            DeploymentProfile::Standard => Self {
                queue: QueueConfig {
                    max_concurrency: 20,
                    max_queue_depth: 100,
                },
                sessions: SessionPoolConfig { max_sessions: 5 },
            },
            DeploymentProfile::Constrained => Self {
                queue: QueueConfig {
                    max_concurrency: 3,
                    max_queue_depth: 20,
                },
                sessions: SessionPoolConfig { max_sessions: 3 },
            },
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.queue
            .validate()
            .map_err(|e| format!("queue invalid: {e}"))?;
        self.sessions
            .validate()
            .map_err(|e| format!("sessions invalid: {e}"))?;
        Ok(())
    }

    /// Parse service configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from the process environment, reading a `.env` file first if present.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup: profile defaults, then overrides.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let profile = DeploymentProfile::detect(&lookup);
        let mut cfg = Self::for_profile(profile);

        if let Some(v) = parse_override(&lookup, ENV_MAX_CONCURRENT)? {
            cfg.queue.max_concurrency = v;
        }
        if let Some(v) = parse_override(&lookup, ENV_MAX_QUEUE_DEPTH)? {
            cfg.queue.max_queue_depth = v;
        }
        if let Some(v) = parse_override(&lookup, ENV_MAX_SESSIONS)? {
            cfg.sessions.max_sessions = v;
        }

        cfg.validate()?;
        tracing::info!(
            ?profile,
            max_concurrency = cfg.queue.max_concurrency,
            max_queue_depth = cfg.queue.max_queue_depth,
            max_sessions = cfg.sessions.max_sessions,
            "service configuration loaded"
        );
        Ok(cfg)
    }
}

fn parse_override(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<usize>, String> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|e| format!("{name}={raw:?} is not a valid count: {e}")),
    }
}
