//! Per-user conversation state storage.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::conversation::state::{ConversationKey, ConversationState};

/// Key-value store holding one conversation state per user.
///
/// Safe for concurrent use by dispatcher workers. A user's messages are
/// expected one at a time; concurrent updates for the same key resolve as
/// last writer wins.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// `None` on first contact.
    async fn get(&self, key: &ConversationKey) -> Option<ConversationState>;

    async fn put(&self, key: ConversationKey, state: ConversationState);
}

/// In-process state store. Contents are lost on restart.
#[derive(Default)]
pub struct InMemoryStateStore {
    states: RwLock<HashMap<ConversationKey, ConversationState>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of users with a stored state.
    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, key: &ConversationKey) -> Option<ConversationState> {
        self.states.read().await.get(key).cloned()
    }

    async fn put(&self, key: ConversationKey, state: ConversationState) {
        self.states.write().await.insert(key, state);
    }
}
