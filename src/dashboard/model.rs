//! Dashboard data model: bot status and push event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::BotConfig;

/// Snapshot of the bot's runtime state shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotStatus {
    /// Channels are started and messages are being handled.
    pub is_ready: bool,
    /// Open dashboard WebSocket connections.
    pub connected_clients: usize,
    pub active_channels: Vec<String>,
    pub started_at: DateTime<Utc>,
}

impl Default for BotStatus {
    fn default() -> Self {
        Self {
            is_ready: false,
            connected_clients: 0,
            active_channels: Vec::new(),
            started_at: Utc::now(),
        }
    }
}

/// Events pushed to every connected dashboard client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardEvent {
    StatusUpdate {
        status: BotStatus,
    },
    ConfigUpdated {
        config: BotConfig,
    },
    /// Global roster replaced.
    MembersUpdated {
        members: Vec<String>,
    },
    /// Group roster set, or cleared (`None`) to fall back to the global one.
    GroupMembersUpdated {
        group_id: String,
        members: Option<Vec<String>>,
    },
    /// Any message seen in a selected group, for live viewing.
    GroupMessage {
        group_id: String,
        group_name: String,
        from: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    /// A message was classified as a sign-up list.
    MessageReceived {
        group_id: String,
        group_name: String,
        from: String,
        preview: String,
        full_message: String,
    },
    ConfirmationRequired {
        id: Uuid,
        group_name: String,
        added_to_main: usize,
        added_to_waitlist: usize,
        moved_from_waitlist: usize,
        preview_text: String,
    },
    ConfirmationRejected {
        id: Uuid,
        group_name: String,
    },
    MessageSent {
        group_name: String,
        success: bool,
        added_to_main: usize,
        added_to_waitlist: usize,
        moved_from_waitlist: usize,
    },
    Error {
        message: String,
    },
    Log {
        message: String,
    },
}

/// Actions a dashboard client may send over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientAction {
    /// Approve (send) or reject a pending confirmation.
    Confirm { id: Uuid, approved: bool },
}

/// First `max_chars` characters of `text`, with `...` appended.
pub fn preview(text: &str, max_chars: usize) -> String {
    let head: String = text.chars().take(max_chars).collect();
    format!("{head}...")
}
