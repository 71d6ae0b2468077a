//! CLI channel — stdin/stdout REPL for running the bot locally.

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse};
use crate::error::ChannelError;
use crate::models::CLI;

/// User and chat id of the single local CLI user.
pub const CLI_USER_ID: i64 = 1;

/// A CLI channel that reads from stdin and writes to stdout.
#[derive(Default)]
pub struct CliChannel;

impl CliChannel {
    pub fn new() -> Self {
        Self
    }
}

/// Render a response for the terminal, options as `  - option` lines.
pub fn render(response: &OutgoingResponse) -> String {
    let mut out = response.content.clone();
    if let Some(options) = &response.keyboard {
        for option in options {
            out.push_str("\n  - ");
            out.push_str(option);
        }
    }
    out
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        CLI
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            eprint!("> ");
                            continue;
                        }
                        let msg = IncomingMessage::new(CLI, CLI_USER_ID, CLI_USER_ID, &line);
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        _msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        println!("\n{}\n", render(&response));
        eprint!("> ");
        Ok(())
    }

    async fn send_to(&self, _chat_id: i64, response: OutgoingResponse) -> Result<(), ChannelError> {
        println!("\n🎂 {}\n", render(&response));
        eprint!("> ");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_channel_name() {
        assert_eq!(CliChannel::new().name(), "cli");
    }

    #[test]
    fn render_plain_text() {
        assert_eq!(render(&OutgoingResponse::text("Hello")), "Hello");
    }

    #[test]
    fn render_lists_options() {
        let resp = OutgoingResponse::text("Choose a city:").with_keyboard(["Moscow", "Kazan"]);
        assert_eq!(render(&resp), "Choose a city:\n  - Moscow\n  - Kazan");
    }
}
