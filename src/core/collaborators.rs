//! Interfaces to the collaborators that own protocol and persistence concerns.

use async_trait::async_trait;

use crate::core::FactoryError;
use crate::util::serde::UserId;

/// Builds, validates, and tears down the heavyweight per-user connection.
///
/// All protocol-level behavior lives behind this trait; the pool only decides
/// when a handle is created, reused, or disconnected.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use session_gate::core::{ConnectionFactory, FactoryError};
///
/// struct ClientFactory { api_id: i32, api_hash: String }
///
/// #[async_trait]
/// impl ConnectionFactory for ClientFactory {
///     type Connection = MessagingClient;
///     type Credentials = String; // session string
///
///     async fn connect(&self, user: i64, session: &String) -> Result<MessagingClient, FactoryError> {
///         MessagingClient::start(user, self.api_id, &self.api_hash, session)
///             .await
///             .map_err(|e| FactoryError::Unavailable(e.to_string()))
///     }
///
///     async fn disconnect(&self, _user: i64, client: &MessagingClient) -> Result<(), FactoryError> {
///         client.stop().await.map_err(|e| FactoryError::Teardown(e.to_string()))
///     }
/// }
/// ```
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// The opaque live connection held by the pool.
    type Connection: Send + Sync + 'static;
    /// Stored credentials needed to (re)build a connection.
    type Credentials: Send + Sync;

    /// Produce a started, validated connection for `user`.
    async fn connect(
        &self,
        user: UserId,
        credentials: &Self::Credentials,
    ) -> Result<Self::Connection, FactoryError>;

    /// Stop a connection that is leaving the pool.
    async fn disconnect(&self, user: UserId, connection: &Self::Connection)
        -> Result<(), FactoryError>;
}

/// Answers whether a user is entitled to premium priority.
#[async_trait]
pub trait TierLookup: Send + Sync {
    /// Return `true` when `user` should be queued in the premium band.
    async fn is_premium(&self, user: UserId) -> bool;
}
