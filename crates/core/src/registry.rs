//! Session Registry
//!
//! Process-wide store of created sessions. It is written only when a session is
//! created or deleted; the voice sessions themselves never look each other up.

use crate::{
    recipe::RecipeDocument,
    session::{ConnectionState, SessionHandle},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex, RwLock, watch};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Session {0} not found")]
    NotFound(Uuid),
    #[error("Session {0} already has a live voice connection")]
    AlreadyConnected(Uuid),
}

/// A created session: the selected recipe plus, while a client is connected,
/// the handle of its running voice session.
#[derive(Debug)]
pub struct SessionEntry {
    pub id: Uuid,
    pub recipe: Arc<RecipeDocument>,
    pub created_at: DateTime<Utc>,
    voice: Mutex<Option<SessionHandle>>,
    shutdown: watch::Sender<bool>,
}

impl SessionEntry {
    fn new(recipe: RecipeDocument) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            id: Uuid::new_v4(),
            recipe: Arc::new(recipe),
            created_at: Utc::now(),
            voice: Mutex::new(None),
            shutdown,
        }
    }

    /// Registers the running voice session. Only one may be attached at a time.
    pub async fn attach(&self, handle: SessionHandle) -> Result<(), RegistryError> {
        let mut voice = self.voice.lock().await;
        if let Some(current) = voice.as_ref() {
            if current.state() != ConnectionState::Closed {
                return Err(RegistryError::AlreadyConnected(self.id));
            }
        }
        *voice = Some(handle);
        Ok(())
    }

    pub async fn detach(&self) {
        self.voice.lock().await.take();
    }

    /// Lifecycle state of the attached voice session, if any.
    pub async fn connection_state(&self) -> Option<ConnectionState> {
        self.voice.lock().await.as_ref().map(SessionHandle::state)
    }

    /// Flips to `true` once the session has been deleted.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn is_deleted(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// Lifecycle store for sessions, injected wherever sessions are looked up.
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    async fn create(&self, recipe: RecipeDocument) -> Arc<SessionEntry>;
    async fn get(&self, id: Uuid) -> Result<Arc<SessionEntry>, RegistryError>;
    /// Removes a session and signals any live voice connection to end.
    async fn delete(&self, id: Uuid) -> Result<(), RegistryError>;
}

#[derive(Default)]
pub struct InMemorySessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<SessionEntry>>>,
}

impl InMemorySessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionRegistry for InMemorySessionRegistry {
    async fn create(&self, recipe: RecipeDocument) -> Arc<SessionEntry> {
        let entry = Arc::new(SessionEntry::new(recipe));
        info!(session_id = %entry.id, recipe = %entry.recipe.title, "Session created");
        self.sessions.write().await.insert(entry.id, entry.clone());
        entry
    }

    async fn get(&self, id: Uuid) -> Result<Arc<SessionEntry>, RegistryError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(RegistryError::NotFound(id))
    }

    async fn delete(&self, id: Uuid) -> Result<(), RegistryError> {
        let entry = self
            .sessions
            .write()
            .await
            .remove(&id)
            .ok_or(RegistryError::NotFound(id))?;
        entry.shutdown.send_replace(true);
        info!(session_id = %id, "Session deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        recipe::tests::sample_recipe,
        session::{SessionConfig, VoiceSession},
    };

    #[tokio::test]
    async fn test_create_get_delete() {
        let registry = InMemorySessionRegistry::new();
        let entry = registry.create(sample_recipe()).await;
        assert_eq!(registry.len().await, 1);

        let found = registry.get(entry.id).await.unwrap();
        assert_eq!(found.recipe.title, "Garlic Pasta");
        assert!(Arc::ptr_eq(&found.recipe, &entry.recipe));

        let mut signal = entry.shutdown_signal();
        registry.delete(entry.id).await.unwrap();
        assert!(signal.has_changed().unwrap());
        assert!(entry.is_deleted());
        assert_eq!(
            registry.get(entry.id).await.unwrap_err(),
            RegistryError::NotFound(entry.id)
        );
        assert_eq!(
            registry.delete(entry.id).await.unwrap_err(),
            RegistryError::NotFound(entry.id)
        );
    }

    #[tokio::test]
    async fn test_sessions_get_distinct_ids() {
        let registry = InMemorySessionRegistry::new();
        let a = registry.create(sample_recipe()).await;
        let b = registry.create(sample_recipe()).await;
        assert_ne!(a.id, b.id);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_only_one_live_voice_connection() {
        let registry = InMemorySessionRegistry::new();
        let entry = registry.create(sample_recipe()).await;
        assert_eq!(entry.connection_state().await, None);

        let (_session, handle, _outputs) =
            VoiceSession::new(entry.id, entry.recipe.clone(), SessionConfig::default());
        entry.attach(handle.clone()).await.unwrap();
        assert_eq!(
            entry.connection_state().await,
            Some(ConnectionState::Connecting)
        );
        assert_eq!(
            entry.attach(handle).await,
            Err(RegistryError::AlreadyConnected(entry.id))
        );

        entry.detach().await;
        assert_eq!(entry.connection_state().await, None);
    }
}
