//! Conversation core: per-user state, the state store and the engine.

pub mod engine;
pub mod input;
pub mod messages;
pub mod state;
pub mod store;

pub use engine::ConversationEngine;
pub use state::{ConversationKey, ConversationState, FunnelSelection, FunnelStep, Phase};
pub use store::{InMemoryStateStore, StateStore};
