//! Confirmation queue: in-memory list of filled lists awaiting approval.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use super::model::{ConfirmationSummary, PendingConfirmation};
use crate::dashboard::hub::EventHub;
use crate::dashboard::model::DashboardEvent;

pub struct ConfirmationQueue {
    pending: RwLock<VecDeque<PendingConfirmation>>,
    hub: Arc<EventHub>,
}

impl ConfirmationQueue {
    pub fn new(hub: Arc<EventHub>) -> Arc<Self> {
        Arc::new(Self {
            pending: RwLock::new(VecDeque::new()),
            hub,
        })
    }

    /// Queue a confirmation and tell the dashboard about it.
    pub async fn push(&self, confirmation: PendingConfirmation) {
        info!(
            id = %confirmation.id,
            group = %confirmation.group_name,
            added_to_main = confirmation.added_to_main,
            added_to_waitlist = confirmation.added_to_waitlist,
            "Confirmation queued"
        );

        let event = DashboardEvent::ConfirmationRequired {
            id: confirmation.id,
            group_name: confirmation.group_name.clone(),
            added_to_main: confirmation.added_to_main,
            added_to_waitlist: confirmation.added_to_waitlist,
            moved_from_waitlist: confirmation.moved_from_waitlist,
            preview_text: confirmation.updated_text.clone(),
        };
        self.pending.write().await.push_back(confirmation);
        self.hub.emit(event);
    }

    /// Remove and return a confirmation. `None` if the id is unknown.
    pub async fn take(&self, id: Uuid) -> Option<PendingConfirmation> {
        let mut pending = self.pending.write().await;
        let Some(position) = pending.iter().position(|c| c.id == id) else {
            warn!(id = %id, "Confirmation not found");
            return None;
        };
        pending.remove(position)
    }

    pub async fn list(&self) -> Vec<ConfirmationSummary> {
        self.pending
            .read()
            .await
            .iter()
            .map(PendingConfirmation::summary)
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.pending.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.read().await.is_empty()
    }
}
