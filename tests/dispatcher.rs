//! Dispatcher wiring: channel stream in, engine replies out.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use birthday_bot::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse};
use birthday_bot::conversation::messages as msg;
use birthday_bot::dispatcher::Dispatcher;
use birthday_bot::error::ChannelError;

use common::{FakeDirectory, FakeSearch, harness};

/// Channel that replays a fixed batch of messages and records replies.
struct ScriptedChannel {
    inbox: Mutex<Vec<IncomingMessage>>,
    sent: Mutex<Vec<(i64, String)>>,
    shut_down: AtomicBool,
}

impl ScriptedChannel {
    fn new(messages: Vec<IncomingMessage>) -> Self {
        Self {
            inbox: Mutex::new(messages),
            sent: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Channel for ScriptedChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let messages = std::mem::take(&mut *self.inbox.lock().await);
        Ok(Box::pin(futures::stream::iter(messages)))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        self.sent.lock().await.push((msg.chat_id, response.content));
        Ok(())
    }

    async fn send_to(&self, chat_id: i64, response: OutgoingResponse) -> Result<(), ChannelError> {
        self.sent.lock().await.push((chat_id, response.content));
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        self.shut_down.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn replies_reach_each_sender_in_order() {
    let h = harness(FakeDirectory::default(), FakeSearch::seeded());
    let messages = (1..=5)
        .map(|id| IncomingMessage::new("telegram", id, id * 10, "/start"))
        .collect();
    let channel = Arc::new(ScriptedChannel::new(messages));

    let dispatcher = Dispatcher::new(h.engine.clone(), channel.clone(), 2);
    dispatcher
        .run_until(std::future::pending())
        .await
        .expect("dispatcher run");

    let sent = channel.sent.lock().await;
    assert_eq!(sent.len(), 10);
    for chat in (1..=5).map(|id| id * 10) {
        let replies: Vec<&str> = sent
            .iter()
            .filter(|(c, _)| *c == chat)
            .map(|(_, text)| text.as_str())
            .collect();
        assert_eq!(replies, vec![msg::WELCOME, msg::ASK_EMAIL]);
    }
    assert_eq!(h.states.len().await, 5);
    assert!(channel.shut_down.load(Ordering::SeqCst));
}

#[tokio::test]
async fn shutdown_signal_stops_before_stream_is_read() {
    let h = harness(FakeDirectory::default(), FakeSearch::seeded());
    let channel = Arc::new(ScriptedChannel::new(vec![IncomingMessage::new(
        "telegram", 1, 1, "/start",
    )]));

    let dispatcher = Dispatcher::new(h.engine.clone(), channel.clone(), 1);
    dispatcher
        .run_until(std::future::ready(()))
        .await
        .expect("dispatcher run");

    assert!(channel.sent.lock().await.is_empty());
    assert!(h.states.is_empty().await);
    assert!(channel.shut_down.load(Ordering::SeqCst));
}

#[tokio::test]
async fn shutdown_wins_while_every_worker_is_stuck() {
    let h = harness(FakeDirectory::default(), FakeSearch::seeded());
    h.accounts.set_stalled(true).await;
    let channel = Arc::new(ScriptedChannel::new(vec![
        IncomingMessage::new("telegram", 1, 1, "/start"),
        IncomingMessage::new("telegram", 2, 2, "/start"),
    ]));

    let dispatcher = Dispatcher::new(h.engine.clone(), channel.clone(), 1)
        .with_drain_timeout(Duration::from_millis(50));
    let finished = tokio::time::timeout(
        Duration::from_secs(5),
        dispatcher.run_until(tokio::time::sleep(Duration::from_millis(100))),
    )
    .await;

    assert!(matches!(finished, Ok(Ok(()))), "dispatcher did not stop");
    assert!(channel.sent.lock().await.is_empty());
    assert!(channel.shut_down.load(Ordering::SeqCst));
}
