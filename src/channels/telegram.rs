//! Telegram channel — long-polls the Bot API for updates.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse};
use crate::config::TelegramConfig;
use crate::error::ChannelError;
use crate::models::TELEGRAM;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Pause after a failed poll before retrying.
const POLL_BACKOFF: Duration = Duration::from_secs(5);

/// Telegram channel — connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    poll_timeout_secs: u64,
    api_base: String,
    client: reqwest::Client,
    shutdown: Arc<AtomicBool>,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            bot_token: config.bot_token.clone(),
            poll_timeout_secs: config.poll_timeout_secs,
            api_base: DEFAULT_API_BASE.to_string(),
            client: reqwest::Client::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Point the channel at a different Bot API server.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, method: &str) -> String {
        bot_api_url(&self.api_base, &self.bot_token, method)
    }

    /// Send a text message, splitting long texts at Telegram's limit.
    /// The keyboard, if any, rides on the last chunk.
    async fn send_message(
        &self,
        chat_id: i64,
        reply_to: Option<i64>,
        response: &OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let chunks = split_message(&response.content, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let keyboard = if i == last {
                response.keyboard.as_deref()
            } else {
                None
            };
            let body = message_body(chat_id, chunk, reply_to, keyboard);
            self.send_message_chunk(&body).await?;
        }
        Ok(())
    }

    async fn send_message_chunk(&self, body: &Value) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: TELEGRAM.into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: TELEGRAM.into(),
                reason: format!("sendMessage returned {status}: {err}"),
            });
        }

        Ok(())
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        TELEGRAM
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        let url = self.api_url("getUpdates");
        let client = self.client.clone();
        let poll_timeout = self.poll_timeout_secs;
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;
            tracing::info!("Telegram channel listening for messages...");

            while !shutdown.load(Ordering::Relaxed) {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": poll_timeout,
                    "allowed_updates": ["message"]
                });

                let resp = match client
                    .post(&url)
                    .timeout(Duration::from_secs(poll_timeout + 10))
                    .json(&body)
                    .send()
                    .await
                {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(POLL_BACKOFF).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(POLL_BACKOFF).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    tracing::warn!(response = %data, "Telegram getUpdates returned no result");
                    tokio::time::sleep(POLL_BACKOFF).await;
                    continue;
                };

                for update in results {
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = offset.max(uid + 1);
                    }

                    let Some(incoming) = parse_update(update) else {
                        continue;
                    };

                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        self.send_message(msg.chat_id, msg.message_id, &response).await
    }

    async fn send_to(&self, chat_id: i64, response: OutgoingResponse) -> Result<(), ChannelError> {
        self.send_message(chat_id, None, &response).await
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: TELEGRAM.into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: TELEGRAM.into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        self.shutdown.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn bot_api_url(api_base: &str, token: &SecretString, method: &str) -> String {
    format!("{api_base}/bot{}/{method}", token.expose_secret())
}

/// Turn one `getUpdates` entry into an inbound message. Non-text updates
/// and updates without a sender or chat are skipped.
fn parse_update(update: &Value) -> Option<IncomingMessage> {
    let message = update.get("message")?;
    let text = message.get("text").and_then(Value::as_str)?;
    let from = message.get("from")?;
    let sender_id = from.get("id").and_then(Value::as_i64)?;
    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)?;

    let mut incoming = IncomingMessage::new(TELEGRAM, sender_id, chat_id, text);
    if let Some(message_id) = message.get("message_id").and_then(Value::as_i64) {
        incoming = incoming.with_message_id(message_id);
    }
    Some(incoming)
}

/// `sendMessage` payload. Option lists become a one-button-per-row reply
/// keyboard; plain texts reply to the triggering message.
fn message_body(
    chat_id: i64,
    text: &str,
    reply_to: Option<i64>,
    keyboard: Option<&[String]>,
) -> Value {
    let mut body = serde_json::json!({
        "chat_id": chat_id,
        "text": text,
    });

    match keyboard {
        Some(options) => {
            let rows: Vec<Value> = options
                .iter()
                .map(|o| serde_json::json!([{ "text": o }]))
                .collect();
            body["reply_markup"] = serde_json::json!({
                "keyboard": rows,
                "resize_keyboard": true,
                "one_time_keyboard": true
            });
        }
        None => {
            if let Some(id) = reply_to {
                body["reply_to_message_id"] = Value::from(id);
            }
        }
    }
    body
}

/// Split a message into chunks of at most `max_len` bytes.
/// Tries to split on newlines, then spaces, then hard-cuts on a char boundary.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }
        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { limit } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────
