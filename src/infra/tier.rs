//! In-memory tier directory.

use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::core::TierLookup;
use crate::util::serde::UserId;

/// Simple in-memory premium directory for development/testing.
///
/// Production deployments answer [`TierLookup`] from their user store.
#[derive(Debug, Default)]
pub struct InMemoryTierDirectory {
    premium: RwLock<HashSet<UserId>>,
}

impl InMemoryTierDirectory {
    /// Create an empty directory; everyone is standard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a directory with the given premium users.
    pub fn with_premium(users: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            premium: RwLock::new(users.into_iter().collect()),
        }
    }

    /// Grant premium priority. Returns `false` if already granted.
    pub fn grant(&self, user: UserId) -> bool {
        self.premium.write().insert(user)
    }

    /// Revoke premium priority. Returns `false` if not granted.
    pub fn revoke(&self, user: UserId) -> bool {
        self.premium.write().remove(&user)
    }
}

#[async_trait]
impl TierLookup for InMemoryTierDirectory {
    async fn is_premium(&self, user: UserId) -> bool {
        self.premium.read().contains(&user)
    }
}
