//! Confirmation data model: filled lists waiting for dashboard approval.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channels::IncomingMessage;
use crate::dashboard::model::preview;
use crate::engine::FillResult;

/// Characters of the updated list shown in confirmation summaries.
pub const PREVIEW_CHARS: usize = 200;

/// A filled list that will only be sent once someone approves it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingConfirmation {
    pub id: Uuid,
    pub group_id: String,
    pub group_name: String,
    /// The rewritten list text to send on approval.
    pub updated_text: String,
    pub added_to_main: usize,
    pub added_to_waitlist: usize,
    pub moved_from_waitlist: usize,
    pub created_at: DateTime<Utc>,
    /// The message being answered; approval replies to it.
    pub source: IncomingMessage,
}

impl PendingConfirmation {
    pub fn new(source: IncomingMessage, result: &FillResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            group_id: source.group_id.clone().unwrap_or_default(),
            group_name: source.group_name.clone().unwrap_or_default(),
            updated_text: result.updated_text.clone(),
            added_to_main: result.added_to_main,
            added_to_waitlist: result.added_to_waitlist,
            moved_from_waitlist: result.moved_from_waitlist,
            created_at: Utc::now(),
            source,
        }
    }

    pub fn summary(&self) -> ConfirmationSummary {
        ConfirmationSummary {
            id: self.id,
            group_name: self.group_name.clone(),
            added_to_main: self.added_to_main,
            added_to_waitlist: self.added_to_waitlist,
            moved_from_waitlist: self.moved_from_waitlist,
            preview_text: preview(&self.updated_text, PREVIEW_CHARS),
            created_at: self.created_at,
        }
    }
}

/// What `GET /api/confirmations` returns for each pending item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationSummary {
    pub id: Uuid,
    pub group_name: String,
    pub added_to_main: usize,
    pub added_to_waitlist: usize,
    pub moved_from_waitlist: usize,
    pub preview_text: String,
    pub created_at: DateTime<Utc>,
}
