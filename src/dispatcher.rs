//! Inbound dispatcher — feeds channel messages to the conversation engine
//! through a bounded pool of worker tasks.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::channels::{Channel, IncomingMessage};
use crate::conversation::ConversationEngine;
use crate::error::ChannelError;

/// How long shutdown waits for in-flight workers before aborting them.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs one channel's receive loop, one task per inbound update.
pub struct Dispatcher {
    engine: Arc<ConversationEngine>,
    channel: Arc<dyn Channel>,
    workers: Arc<Semaphore>,
    drain_timeout: Duration,
}

impl Dispatcher {
    /// `max_workers` bounds how many updates are handled at once.
    pub fn new(
        engine: Arc<ConversationEngine>,
        channel: Arc<dyn Channel>,
        max_workers: usize,
    ) -> Self {
        Self {
            engine,
            channel,
            workers: Arc::new(Semaphore::new(max_workers.max(1))),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Run until Ctrl+C or until the channel's stream ends.
    pub async fn run(&self) -> Result<(), ChannelError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
            tracing::info!("Ctrl+C received, shutting down...");
        })
        .await
    }

    /// Run until `shutdown` resolves or the stream ends, then wait for
    /// in-flight workers (at most `drain_timeout`) and shut the channel down.
    pub async fn run_until(
        &self,
        shutdown: impl Future<Output = ()> + Send,
    ) -> Result<(), ChannelError> {
        let mut stream = self.channel.start().await?;
        let mut tasks = JoinSet::new();
        tokio::pin!(shutdown);

        tracing::info!(channel = self.channel.name(), "Dispatcher ready and listening");

        loop {
            let message = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                msg = stream.next() => match msg {
                    Some(m) => m,
                    None => {
                        tracing::info!("Channel stream ended, shutting down...");
                        break;
                    }
                }
            };

            // All workers may be stuck; shutdown must still win.
            let permit = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                permit = self.workers.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };
            let engine = self.engine.clone();
            let channel = self.channel.clone();
            tasks.spawn(async move {
                handle_message(&engine, channel.as_ref(), &message).await;
                drop(permit);
            });

            // Reap finished workers so the set does not grow unbounded.
            while let Some(done) = tasks.try_join_next() {
                if let Err(e) = done {
                    tracing::error!("Worker task failed: {e}");
                }
            }
        }

        let drained = tokio::time::timeout(self.drain_timeout, async {
            while let Some(done) = tasks.join_next().await {
                if let Err(e) = done {
                    tracing::error!("Worker task failed: {e}");
                }
            }
        })
        .await
        .is_ok();
        if !drained {
            tracing::warn!(
                remaining = tasks.len(),
                "Workers still busy after drain timeout, aborting"
            );
            tasks.abort_all();
        }

        self.channel.shutdown().await
    }
}

/// Handle one update: run the engine, then send its replies in order.
async fn handle_message(engine: &ConversationEngine, channel: &dyn Channel, message: &IncomingMessage) {
    tracing::debug!(
        id = %message.id,
        channel = %message.channel,
        user_id = message.sender_id,
        chat_id = message.chat_id,
        "Received message ({} chars)",
        message.content.len()
    );

    let replies = engine.handle(&message.identity(), &message.content).await;
    let count = replies.len();
    for reply in replies {
        if let Err(e) = channel.respond(message, reply).await {
            tracing::warn!(
                id = %message.id,
                chat_id = message.chat_id,
                error = %e,
                "Failed to deliver reply"
            );
        }
    }
    tracing::debug!(
        id = %message.id,
        replies = count,
        elapsed_ms = (Utc::now() - message.received_at).num_milliseconds(),
        "Message processed"
    );
}
