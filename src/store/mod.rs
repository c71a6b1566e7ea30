//! Conversation state persistence
//!
//! The engine loads a [`ConversationDialogState`] at turn start and saves it at
//! turn end through a [`StateStore`]. Saves are versioned: a save carrying a
//! version other than the stored one is rejected, so a turn never overwrites a
//! newer stack.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::aggregate::ConversationDialogState;
use crate::error::{DialogError, DialogResult};

/// Storage backend for per-conversation dialog stacks
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Persisted state, `None` when the conversation has none yet
    async fn load(&self, conversation_id: &str) -> DialogResult<Option<ConversationDialogState>>;

    /// Persist `state`, bumping its version on success
    async fn save(&self, conversation_id: &str, state: &mut ConversationDialogState) -> DialogResult<()>;

    async fn delete(&self, conversation_id: &str) -> DialogResult<()>;
}

#[derive(Debug, Clone)]
struct StoredState {
    version: u64,
    json: String,
}

/// Process-local store keeping each state as serialized JSON
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    states: RwLock<HashMap<String, StoredState>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of conversations with persisted state
    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn load(&self, conversation_id: &str) -> DialogResult<Option<ConversationDialogState>> {
        let states = self.states.read().await;
        let Some(stored) = states.get(conversation_id) else {
            return Ok(None);
        };
        let state = serde_json::from_str(&stored.json)?;
        Ok(Some(state))
    }

    async fn save(&self, conversation_id: &str, state: &mut ConversationDialogState) -> DialogResult<()> {
        let mut states = self.states.write().await;
        if let Some(stored) = states.get(conversation_id) {
            if stored.version != state.version {
                return Err(DialogError::StateConflict {
                    conversation_id: conversation_id.to_string(),
                    expected: state.version,
                    found: stored.version,
                });
            }
        }

        state.version += 1;
        let json = serde_json::to_string(state)?;
        debug!(conversation_id, version = state.version, depth = state.depth(), "dialog state saved");
        states.insert(
            conversation_id.to_string(),
            StoredState {
                version: state.version,
                json,
            },
        );
        Ok(())
    }

    async fn delete(&self, conversation_id: &str) -> DialogResult<()> {
        if self.states.write().await.remove(conversation_id).is_some() {
            debug!(conversation_id, "dialog state deleted");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::DialogStackFrame;

    #[tokio::test]
    async fn test_save_and_load() {
        let store = InMemoryStateStore::new();
        assert!(store.load("c1").await.unwrap().is_none());

        let mut state = ConversationDialogState::empty("c1");
        state.push(DialogStackFrame::new("order", None));
        store.save("c1", &mut state).await.unwrap();
        assert_eq!(state.version, 1);

        let loaded = store.load("c1").await.unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn test_stale_save_is_rejected() {
        let store = InMemoryStateStore::new();
        let mut first = ConversationDialogState::empty("c1");
        store.save("c1", &mut first).await.unwrap();

        let mut stale = ConversationDialogState::empty("c1");
        let err = store.save("c1", &mut stale).await.unwrap_err();
        assert!(matches!(err, DialogError::StateConflict { expected: 0, found: 1, .. }));

        store.delete("c1").await.unwrap();
        assert!(store.is_empty().await);
        store.save("c1", &mut stale).await.unwrap();
    }
}
