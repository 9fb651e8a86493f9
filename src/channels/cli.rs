//! CLI channel: paste a list into stdin to try the bot locally.
//!
//! Lines are collected until a line containing only `---`, then sent as one
//! message from the `cli` group. Responses are printed to stdout.

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse};
use crate::error::ChannelError;

/// Line that terminates a pasted message.
const MESSAGE_TERMINATOR: &str = "---";

pub const CLI_GROUP_ID: &str = "cli";
const CLI_GROUP_NAME: &str = "CLI group";

/// A stdin/stdout channel for local testing.
pub struct CliChannel;

impl CliChannel {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Append `line` to `buffer`; returns the finished message on a terminator.
fn push_line(buffer: &mut Vec<String>, line: String) -> Option<String> {
    if line.trim() == MESSAGE_TERMINATOR {
        let text = buffer.join("\n");
        buffer.clear();
        return (!text.trim().is_empty()).then_some(text);
    }
    buffer.push(line);
    None
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let reader = BufReader::new(tokio::io::stdin());
            let mut lines = reader.lines();
            let mut buffer = Vec::new();

            eprintln!("Paste a list, then a line with {MESSAGE_TERMINATOR} to send it.");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let Some(text) = push_line(&mut buffer, line) else {
                            continue;
                        };
                        let msg = IncomingMessage::new("cli", "local-user", text)
                            .with_group(CLI_GROUP_ID, CLI_GROUP_NAME)
                            .with_sender_name("You");
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
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
        println!("\n{}\n", response.content);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminator_flushes_multiline_message() {
        let mut buffer = Vec::new();
        assert_eq!(push_line(&mut buffer, "1. Dana".into()), None);
        assert_eq!(push_line(&mut buffer, "".into()), None);
        assert_eq!(push_line(&mut buffer, "2.".into()), None);
        assert_eq!(
            push_line(&mut buffer, " --- ".into()),
            Some("1. Dana\n\n2.".to_string())
        );
        assert!(buffer.is_empty());
    }

    #[test]
    fn blank_message_is_dropped() {
        let mut buffer = vec!["  ".to_string()];
        assert_eq!(push_line(&mut buffer, "---".into()), None);
        assert!(buffer.is_empty());
    }
}
