use std::future::Future;

use super::types::Session;
use crate::types::SessionId;

/// Error type returned by session store implementations.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Server-side session persistence, addressed by session id.
///
/// The flow orchestrator awaits every `set` before it answers the browser,
/// so a completed `set` must be visible to the next `get` from any request.
/// Concurrent writes to the same id resolve last-writer-wins.
///
/// [`MemorySessionStore`](super::MemorySessionStore) covers single-process
/// deployments; implement this trait over an external store to share
/// sessions between instances.
///
/// # Example
///
/// ```rust,ignore
/// impl SessionStore for RedisSessions {
///     async fn get(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
///         let raw: Option<String> = self.conn().get(id.as_str()).await?;
///         Ok(raw.map(|s| serde_json::from_str(&s)).transpose()?)
///     }
///
///     async fn set(&self, session: Session) -> Result<(), StoreError> {
///         let raw = serde_json::to_string(&session)?;
///         self.conn().set_ex(session.id.as_str(), raw, self.ttl).await?;
///         Ok(())
///     }
///
///     async fn destroy(&self, id: &SessionId) -> Result<(), StoreError> {
///         self.conn().del(id.as_str()).await?;
///         Ok(())
///     }
/// }
/// ```
pub trait SessionStore: Send + Sync + 'static {
    /// Look up a live session. Expired or unknown ids yield `None`.
    fn get(
        &self,
        id: &SessionId,
    ) -> impl Future<Output = Result<Option<Session>, StoreError>> + Send;

    /// Insert or replace the session stored under `session.id`.
    fn set(&self, session: Session) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove a session. Destroying an unknown id is not an error.
    fn destroy(&self, id: &SessionId) -> impl Future<Output = Result<(), StoreError>> + Send;
}
