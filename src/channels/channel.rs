//! Channel trait and the message types that cross it.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use uuid::Uuid;

use crate::error::ChannelError;
use crate::models::ChannelIdentity;

/// Stream of inbound messages produced by a started channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A message received from a chat transport.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub id: Uuid,
    /// Transport type, e.g. `"telegram"`.
    pub channel: String,
    /// Sender's user id within the transport.
    pub sender_id: i64,
    /// Conversation the message arrived in.
    pub chat_id: i64,
    /// Transport message id, used to thread replies.
    pub message_id: Option<i64>,
    pub content: String,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(
        channel: impl Into<String>,
        sender_id: i64,
        chat_id: i64,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.into(),
            sender_id,
            chat_id,
            message_id: None,
            content: content.into(),
            received_at: Utc::now(),
        }
    }

    pub fn with_message_id(mut self, message_id: i64) -> Self {
        self.message_id = Some(message_id);
        self
    }

    /// The sender as a channel identity.
    pub fn identity(&self) -> ChannelIdentity {
        ChannelIdentity::new(self.channel.clone(), self.sender_id, self.chat_id)
    }
}

/// A reply to send back over a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingResponse {
    pub content: String,
    /// Options offered as reply buttons, one per row.
    pub keyboard: Option<Vec<String>>,
}

impl OutgoingResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            keyboard: None,
        }
    }

    pub fn with_keyboard<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keyboard = Some(options.into_iter().map(Into::into).collect());
        self
    }
}

/// A chat transport the bot talks through.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Start receiving messages.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Reply in the conversation `msg` came from.
    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError>;

    /// Send an unsolicited message to a chat (reminders).
    async fn send_to(&self, chat_id: i64, response: OutgoingResponse) -> Result<(), ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_uses_sender_and_chat() {
        let msg = IncomingMessage::new("telegram", 5, 9, "hi").with_message_id(77);
        assert_eq!(msg.identity(), ChannelIdentity::new("telegram", 5, 9));
        assert_eq!(msg.message_id, Some(77));
    }

    #[test]
    fn keyboard_builder_collects_options() {
        let resp = OutgoingResponse::text("Choose a city:").with_keyboard(["Moscow", "Kazan"]);
        assert_eq!(
            resp.keyboard,
            Some(vec!["Moscow".to_string(), "Kazan".to_string()])
        );
        assert_eq!(OutgoingResponse::text("x").keyboard, None);
    }
}
