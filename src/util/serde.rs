//! Shared serializable identifiers and enums.

use serde::{Deserialize, Serialize};

/// Identity of the end user that owns a session and at most one job.
pub type UserId = i64;

/// Monotonic submission sequence number.
pub type Sequence = u64;

/// Priority class of a submitted job.
///
/// Ordering is dequeue order: `Premium` sorts before `Standard`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityClass {
    /// Paid or admin users; dequeued ahead of every waiting standard job.
    Premium,
    /// Everyone else.
    Standard,
}

impl PriorityClass {
    /// Map an entitlement flag to a class.
    #[must_use]
    pub const fn from_premium(is_premium: bool) -> Self {
        if is_premium {
            Self::Premium
        } else {
            Self::Standard
        }
    }

    /// Short label used in user-facing messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Premium => "PREMIUM",
            Self::Standard => "FREE",
        }
    }
}
