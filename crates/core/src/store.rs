//! Session store trait: where profile sessions live between turns.
//!
//! The orchestrator only needs create/get/put keyed by client id, so a
//! durable backend can replace the in-memory map without touching it.

use crate::error::StoreError;
use crate::session::{ClientId, ProfileSession};
use async_trait::async_trait;

/// The core SessionStore trait.
///
/// Implementations must be safe to share across tasks. They do not serialize
/// operations on a single session; that is the orchestrator's job.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Backend name (e.g., "in_memory", "file").
    fn name(&self) -> &str;

    /// Insert a new session. Fails with `AlreadyExists` on a duplicate id.
    async fn create(&self, session: ProfileSession) -> Result<(), StoreError>;

    /// Fetch a snapshot of a session.
    async fn get(&self, client_id: &ClientId) -> Result<Option<ProfileSession>, StoreError>;

    /// Replace a stored session with an updated snapshot. Fails with `NotFound`
    /// if the session was never created.
    async fn put(&self, session: ProfileSession) -> Result<(), StoreError>;

    /// Number of stored sessions.
    async fn count(&self) -> Result<usize, StoreError>;
}
