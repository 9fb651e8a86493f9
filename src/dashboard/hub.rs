//! Event hub: bot status plus broadcast fan-out to dashboard clients.

use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tracing::debug;

use super::model::{BotStatus, DashboardEvent};

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

pub struct EventHub {
    status: RwLock<BotStatus>,
    tx: broadcast::Sender<DashboardEvent>,
}

impl EventHub {
    pub fn new() -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Arc::new(Self {
            status: RwLock::new(BotStatus::default()),
            tx,
        })
    }

    /// Subscribe to events. Each WS client calls this.
    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.tx.subscribe()
    }

    /// Broadcast an event; fine if nobody is listening.
    pub fn emit(&self, event: DashboardEvent) {
        if self.tx.send(event).is_err() {
            debug!("No dashboard clients listening");
        }
    }

    /// Emit a free-form log line to the dashboard.
    pub fn log(&self, message: impl Into<String>) {
        self.emit(DashboardEvent::Log {
            message: message.into(),
        });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(DashboardEvent::Error {
            message: message.into(),
        });
    }

    pub async fn status(&self) -> BotStatus {
        self.status.read().await.clone()
    }

    pub async fn is_ready(&self) -> bool {
        self.status.read().await.is_ready
    }

    /// Mark the bot ready (or not) and broadcast the new status.
    pub async fn set_ready(&self, ready: bool, active_channels: Vec<String>) {
        let status = {
            let mut status = self.status.write().await;
            status.is_ready = ready;
            status.active_channels = active_channels;
            status.clone()
        };
        self.emit(DashboardEvent::StatusUpdate { status });
    }

    pub async fn client_connected(&self) -> BotStatus {
        let mut status = self.status.write().await;
        status.connected_clients += 1;
        status.clone()
    }

    pub async fn client_disconnected(&self) {
        let mut status = self.status.write().await;
        status.connected_clients = status.connected_clients.saturating_sub(1);
    }
}
