//! In-memory session store. The default backend; sessions last until process exit.

use async_trait::async_trait;
use riskprofiler_core::error::StoreError;
use riskprofiler_core::session::{ClientId, ProfileSession};
use riskprofiler_core::store::SessionStore;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Sessions in a `HashMap` behind a `RwLock`.
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<ClientId, ProfileSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn create(&self, session: ProfileSession) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(session.client_id()) {
            return Err(StoreError::AlreadyExists(session.client_id().clone()));
        }
        sessions.insert(session.client_id().clone(), session);
        Ok(())
    }

    async fn get(&self, client_id: &ClientId) -> Result<Option<ProfileSession>, StoreError> {
        Ok(self.sessions.read().await.get(client_id).cloned())
    }

    async fn put(&self, session: ProfileSession) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(session.client_id()) {
            Some(slot) => {
                *slot = session;
                Ok(())
            }
            None => Err(StoreError::NotFound(session.client_id().clone())),
        }
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.sessions.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riskprofiler_core::message::ChatTurn;

    #[tokio::test]
    async fn create_and_get() {
        let store = InMemorySessionStore::new();
        let session = ProfileSession::new(ClientId::new());
        let id = session.client_id().clone();

        store.create(session).await.unwrap();
        let fetched = store.get(&id).await.unwrap();
        assert!(fetched.is_some());
        assert_eq!(fetched.unwrap().client_id(), &id);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_create_rejected() {
        let store = InMemorySessionStore::new();
        let id = ClientId::from("dup");
        store.create(ProfileSession::new(id.clone())).await.unwrap();

        let err = store.create(ProfileSession::new(id)).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn put_replaces_snapshot() {
        let store = InMemorySessionStore::new();
        let mut session = ProfileSession::new(ClientId::new());
        store.create(session.clone()).await.unwrap();

        session.push(ChatTurn::assistant("Welcome!"));
        store.put(session.clone()).await.unwrap();

        let fetched = store.get(session.client_id()).await.unwrap().unwrap();
        assert_eq!(fetched.history().len(), 1);
    }

    #[tokio::test]
    async fn put_unknown_session_fails() {
        let store = InMemorySessionStore::new();
        let err = store
            .put(ProfileSession::new(ClientId::from("ghost")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn get_unknown_returns_none() {
        let store = InMemorySessionStore::new();
        assert!(store.get(&ClientId::from("nope")).await.unwrap().is_none());
    }
}
