//! Channel trait and the message types that cross it.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChannelError;

/// Stream of incoming messages produced by a started channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A chat message as seen by the bot, independent of the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Transport-native message id (used for quoted replies).
    pub id: String,
    /// Name of the channel that produced this message.
    pub channel: String,
    /// Group chat id; `None` for direct messages.
    pub group_id: Option<String>,
    pub group_name: Option<String>,
    /// Sender identifier on the transport.
    pub sender: String,
    /// Human-readable sender name, if known.
    pub sender_name: Option<String>,
    pub content: String,
    /// Sent by the account the bot runs as.
    pub from_self: bool,
    /// Transport-specific data needed to reply (chat ids etc).
    pub metadata: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(
        channel: impl Into<String>,
        sender: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            channel: channel.into(),
            group_id: None,
            group_name: None,
            sender: sender.into(),
            sender_name: None,
            content: content.into(),
            from_self: false,
            metadata: serde_json::Value::Null,
            received_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_group(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.group_id = Some(id.into());
        self.group_name = Some(name.into());
        self
    }

    pub fn with_sender_name(mut self, name: impl Into<String>) -> Self {
        self.sender_name = Some(name.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn from_self(mut self, from_self: bool) -> Self {
        self.from_self = from_self;
        self
    }

    pub fn is_group(&self) -> bool {
        self.group_id.is_some()
    }

    /// Display name for logs and the dashboard.
    pub fn display_sender(&self) -> &str {
        self.sender_name.as_deref().unwrap_or(&self.sender)
    }
}

/// Text the bot sends back to a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingResponse {
    pub content: String,
    /// Quote this message id when the transport supports replies.
    pub reply_to: Option<String>,
}

impl OutgoingResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            reply_to: None,
        }
    }

    pub fn reply(content: impl Into<String>, reply_to: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            reply_to: Some(reply_to.into()),
        }
    }
}

/// A chat transport.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable name used to route responses back.
    fn name(&self) -> &str;

    /// Begin receiving messages.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Send a response into the chat the message came from.
    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
