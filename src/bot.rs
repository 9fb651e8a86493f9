//! Message pipeline: decides which chat messages get a filled list back.
//!
//! Flow per message:
//! 1. Group bookkeeping (known-groups cache, live view for selected groups)
//! 2. Gatekeeping: selected group, own messages, list classification
//! 3. Fill with the group's roster
//! 4. Send after the configured delay, or queue for dashboard approval

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::channels::{ChannelManager, IncomingMessage, MessageStream, OutgoingResponse};
use crate::config::ConfigStore;
use crate::confirmations::{ConfirmationQueue, PendingConfirmation};
use crate::dashboard::hub::EventHub;
use crate::dashboard::model::{DashboardEvent, preview};
use crate::engine::{self, FillResult};
use crate::groups::GroupCache;

/// Characters of an incoming list shown in `message_received` events.
const RECEIVED_PREVIEW_CHARS: usize = 100;

/// Why a message was not processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotGroup,
    GroupNotSelected,
    OwnMessage,
    NotAList,
}

/// What the pipeline did with one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Skipped(SkipReason),
    /// A list, but nothing to add or move.
    NoChanges,
    Sent,
    SendFailed,
    AwaitingConfirmation(Uuid),
}

/// Result of resolving a queued confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Sent,
    SendFailed,
    Rejected,
}

/// Change counts carried alongside a text being sent.
#[derive(Debug, Clone, Copy, Default)]
struct ChangeCounts {
    added_to_main: usize,
    added_to_waitlist: usize,
    moved_from_waitlist: usize,
}

impl From<&FillResult> for ChangeCounts {
    fn from(result: &FillResult) -> Self {
        Self {
            added_to_main: result.added_to_main,
            added_to_waitlist: result.added_to_waitlist,
            moved_from_waitlist: result.moved_from_waitlist,
        }
    }
}

impl From<&PendingConfirmation> for ChangeCounts {
    fn from(c: &PendingConfirmation) -> Self {
        Self {
            added_to_main: c.added_to_main,
            added_to_waitlist: c.added_to_waitlist,
            moved_from_waitlist: c.moved_from_waitlist,
        }
    }
}

pub struct ListBot {
    config: Arc<ConfigStore>,
    groups: Arc<GroupCache>,
    hub: Arc<EventHub>,
    confirmations: Arc<ConfirmationQueue>,
    channels: Arc<ChannelManager>,
}

impl ListBot {
    pub fn new(
        config: Arc<ConfigStore>,
        groups: Arc<GroupCache>,
        hub: Arc<EventHub>,
        confirmations: Arc<ConfirmationQueue>,
        channels: Arc<ChannelManager>,
    ) -> Self {
        Self {
            config,
            groups,
            hub,
            confirmations,
            channels,
        }
    }

    /// Start every channel, mark the bot ready and handle messages until
    /// the channel streams end.
    pub async fn start(self: &Arc<Self>) -> crate::error::Result<()> {
        let stream = self.channels.start_all().await?;
        self.hub.set_ready(true, self.channels.names()).await;
        self.hub.log("Bot is ready");
        self.run(stream).await;
        Ok(())
    }

    /// Handle messages until every channel stream ends. Each message runs
    /// in its own task so a send delay never holds up the next message.
    pub async fn run(self: &Arc<Self>, mut messages: MessageStream) {
        while let Some(msg) = messages.next().await {
            let bot = Arc::clone(self);
            tokio::spawn(async move {
                let outcome = bot.handle_message(msg).await;
                debug!(?outcome, "Message handled");
            });
        }
        info!("All channel streams closed");
    }

    /// Health of every registered channel, by name.
    pub async fn channel_health(&self) -> BTreeMap<String, bool> {
        self.channels.health().await
    }

    /// Run one message through the pipeline.
    pub async fn handle_message(&self, msg: IncomingMessage) -> Outcome {
        info!(
            channel = %msg.channel,
            sender = %msg.display_sender(),
            preview = %msg.content.chars().take(50).collect::<String>(),
            "Incoming message"
        );

        let (Some(group_id), Some(group_name)) = (msg.group_id.clone(), msg.group_name.clone())
        else {
            debug!("Not a group message, skipping");
            return Outcome::Skipped(SkipReason::NotGroup);
        };

        if let Err(e) = self.groups.record(&group_id, &group_name).await {
            warn!(group_id = %group_id, error = %e, "Failed to persist group cache");
        }

        let config = self.config.snapshot().await;
        if !config.is_selected(&group_id) {
            debug!(group = %group_name, "Group not selected, skipping");
            return Outcome::Skipped(SkipReason::GroupNotSelected);
        }

        self.hub.emit(DashboardEvent::GroupMessage {
            group_id: group_id.clone(),
            group_name: group_name.clone(),
            from: msg.display_sender().to_string(),
            message: msg.content.clone(),
            timestamp: Utc::now(),
        });

        if msg.from_self && !config.self_test_mode {
            debug!("Own message and self-test mode is off, skipping");
            return Outcome::Skipped(SkipReason::OwnMessage);
        }

        if !engine::is_signup_list(&msg.content, &config.keywords) {
            debug!(group = %group_name, "Not a sign-up list");
            return Outcome::Skipped(SkipReason::NotAList);
        }

        info!(group = %group_name, from = %msg.display_sender(), "Sign-up list detected");
        self.hub.emit(DashboardEvent::MessageReceived {
            group_id: group_id.clone(),
            group_name: group_name.clone(),
            from: msg.display_sender().to_string(),
            preview: preview(&msg.content, RECEIVED_PREVIEW_CHARS),
            full_message: msg.content.clone(),
        });

        let roster = config.roster_for(Some(group_id.as_str()));
        let Some(result) = engine::fill(&msg.content, roster, config.fill_options()) else {
            info!(group = %group_name, "Nothing to add or move");
            return Outcome::NoChanges;
        };

        info!(
            group = %group_name,
            added_to_main = result.added_to_main,
            added_to_waitlist = result.added_to_waitlist,
            moved_from_waitlist = result.moved_from_waitlist,
            completed = result.completed,
            "List filled"
        );

        if config.require_confirmation {
            let confirmation = PendingConfirmation::new(msg, &result);
            let id = confirmation.id;
            self.confirmations.push(confirmation).await;
            return Outcome::AwaitingConfirmation(id);
        }

        if self
            .send_response(&msg, &group_name, result.updated_text.clone(), (&result).into())
            .await
        {
            Outcome::Sent
        } else {
            Outcome::SendFailed
        }
    }

    /// Approve (send) or reject a queued confirmation. `None` if the id is
    /// not pending.
    pub async fn resolve_confirmation(
        &self,
        id: Uuid,
        approved: bool,
    ) -> Option<ConfirmationOutcome> {
        let confirmation = self.confirmations.take(id).await?;

        if !approved {
            info!(id = %id, group = %confirmation.group_name, "Confirmation rejected");
            self.hub.emit(DashboardEvent::ConfirmationRejected {
                id,
                group_name: confirmation.group_name,
            });
            return Some(ConfirmationOutcome::Rejected);
        }

        info!(id = %id, group = %confirmation.group_name, "Confirmation approved");
        let counts = ChangeCounts::from(&confirmation);
        let sent = self
            .send_response(
                &confirmation.source,
                &confirmation.group_name,
                confirmation.updated_text.clone(),
                counts,
            )
            .await;

        Some(if sent {
            ConfirmationOutcome::Sent
        } else {
            ConfirmationOutcome::SendFailed
        })
    }

    /// Wait the configured delay, then post the updated list.
    async fn send_response(
        &self,
        msg: &IncomingMessage,
        group_name: &str,
        text: String,
        counts: ChangeCounts,
    ) -> bool {
        let config = self.config.snapshot().await;
        if config.delay_ms > 0 {
            debug!(delay_ms = config.delay_ms, "Waiting before send");
            tokio::time::sleep(Duration::from_millis(config.delay_ms)).await;
        }

        let response = if config.reply_mode {
            OutgoingResponse::reply(text, msg.id.clone())
        } else {
            OutgoingResponse::text(text)
        };

        match self.channels.respond(msg, response).await {
            Ok(()) => {
                info!(group = %group_name, reply_mode = config.reply_mode, "Updated list sent");
                self.hub.emit(DashboardEvent::MessageSent {
                    group_name: group_name.to_string(),
                    success: true,
                    added_to_main: counts.added_to_main,
                    added_to_waitlist: counts.added_to_waitlist,
                    moved_from_waitlist: counts.moved_from_waitlist,
                });
                true
            }
            Err(e) => {
                error!(group = %group_name, error = %e, "Failed to send updated list");
                self.hub.error(format!("Failed to send updated list: {e}"));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::Channel;
    use crate::error::ChannelError;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    /// Records every response instead of sending it.
    struct RecordingChannel {
        sent: Mutex<Vec<OutgoingResponse>>,
        fail: bool,
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        fn name(&self) -> &str {
            "test"
        }

        async fn start(&self) -> Result<MessageStream, ChannelError> {
            Ok(Box::pin(futures::stream::empty()))
        }

        async fn respond(
            &self,
            _msg: &IncomingMessage,
            response: OutgoingResponse,
        ) -> Result<(), ChannelError> {
            if self.fail {
                return Err(ChannelError::SendFailed {
                    name: "test".into(),
                    reason: "offline".into(),
                });
            }
            self.sent.lock().await.push(response);
            Ok(())
        }

        async fn health_check(&self) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        bot: ListBot,
        channel: Arc<RecordingChannel>,
        config: Arc<ConfigStore>,
        hub: Arc<EventHub>,
        confirmations: Arc<ConfirmationQueue>,
    }

    async fn harness(patch: serde_json::Value, fail: bool) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigStore::load(dir.path().join("config.json")).await.unwrap();
        config
            .apply_patch(serde_json::json!({
                "selectedGroups": ["g1"],
                "membersToAdd": ["Dana", "Avi"],
                "delayMs": 0,
            }))
            .await
            .unwrap();
        config.apply_patch(patch).await.unwrap();

        let groups = GroupCache::load(dir.path().join("groups.json")).await;
        let hub = EventHub::new();
        let confirmations = ConfirmationQueue::new(Arc::clone(&hub));
        let channel = Arc::new(RecordingChannel {
            sent: Mutex::new(Vec::new()),
            fail,
        });
        let mut manager = ChannelManager::new();
        manager.add(channel.clone());

        let bot = ListBot::new(
            Arc::clone(&config),
            groups,
            Arc::clone(&hub),
            Arc::clone(&confirmations),
            Arc::new(manager),
        );

        Harness {
            _dir: dir,
            bot,
            channel,
            config,
            hub,
            confirmations,
        }
    }

    fn group_msg(group_id: &str, text: &str) -> IncomingMessage {
        IncomingMessage::new("test", "u1", text)
            .with_id("m1")
            .with_group(group_id, "Wednesday")
    }

    const OPEN_LIST: &str = "Football\n1. Noa\n2.\n3.";

    #[tokio::test]
    async fn fills_and_replies_in_selected_group() {
        let h = harness(serde_json::json!({}), false).await;
        let outcome = h.bot.handle_message(group_msg("g1", OPEN_LIST)).await;
        assert_eq!(outcome, Outcome::Sent);

        let sent = h.channel.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].reply_to.as_deref(), Some("m1"));
        assert!(sent[0].content.starts_with("Football\n1. Noa\n2. Dana\n3. Avi\n4."));
    }

    #[tokio::test]
    async fn plain_message_when_reply_mode_off() {
        let h = harness(serde_json::json!({"replyMode": false}), false).await;
        h.bot.handle_message(group_msg("g1", OPEN_LIST)).await;
        assert_eq!(h.channel.sent.lock().await[0].reply_to, None);
    }

    #[tokio::test]
    async fn unselected_and_direct_messages_are_skipped() {
        let h = harness(serde_json::json!({}), false).await;
        assert_eq!(
            h.bot.handle_message(group_msg("g2", OPEN_LIST)).await,
            Outcome::Skipped(SkipReason::GroupNotSelected)
        );
        assert_eq!(
            h.bot
                .handle_message(IncomingMessage::new("test", "u1", OPEN_LIST))
                .await,
            Outcome::Skipped(SkipReason::NotGroup)
        );
        assert!(h.channel.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn own_messages_need_self_test_mode() {
        let h = harness(serde_json::json!({}), false).await;
        let own = group_msg("g1", OPEN_LIST).from_self(true);
        assert_eq!(
            h.bot.handle_message(own.clone()).await,
            Outcome::Skipped(SkipReason::OwnMessage)
        );

        h.config
            .apply_patch(serde_json::json!({"selfTestMode": true}))
            .await
            .unwrap();
        assert_eq!(h.bot.handle_message(own).await, Outcome::Sent);
    }

    #[tokio::test]
    async fn chatter_is_not_a_list() {
        let h = harness(serde_json::json!({"keywords": []}), false).await;
        assert_eq!(
            h.bot.handle_message(group_msg("g1", "who is bringing the ball?")).await,
            Outcome::Skipped(SkipReason::NotAList)
        );
    }

    #[tokio::test]
    async fn complete_list_yields_no_changes() {
        let h = harness(serde_json::json!({}), false).await;
        let full: String = (1..=15)
            .map(|n| format!("{n}. P{n}"))
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(
            h.bot.handle_message(group_msg("g1", &full)).await,
            Outcome::NoChanges
        );
    }

    #[tokio::test]
    async fn group_roster_overrides_global() {
        let h = harness(serde_json::json!({"groupMembers": {"g1": ["Local"]}}), false).await;
        h.bot.handle_message(group_msg("g1", OPEN_LIST)).await;
        let sent = h.channel.sent.lock().await;
        assert!(sent[0].content.contains("2. Local"));
        assert!(!sent[0].content.contains("Dana"));
    }

    #[tokio::test]
    async fn confirmation_flow_approve_and_reject() {
        let h = harness(serde_json::json!({"requireConfirmation": true}), false).await;
        let mut rx = h.hub.subscribe();

        let Outcome::AwaitingConfirmation(id) = h.bot.handle_message(group_msg("g1", OPEN_LIST)).await
        else {
            panic!("expected a queued confirmation");
        };
        assert!(h.channel.sent.lock().await.is_empty());
        assert_eq!(h.confirmations.len().await, 1);

        assert_eq!(
            h.bot.resolve_confirmation(id, true).await,
            Some(ConfirmationOutcome::Sent)
        );
        assert_eq!(h.channel.sent.lock().await.len(), 1);
        assert_eq!(h.bot.resolve_confirmation(id, true).await, None);

        let Outcome::AwaitingConfirmation(second) =
            h.bot.handle_message(group_msg("g1", OPEN_LIST)).await
        else {
            panic!("expected a queued confirmation");
        };
        assert_eq!(
            h.bot.resolve_confirmation(second, false).await,
            Some(ConfirmationOutcome::Rejected)
        );
        assert_eq!(h.channel.sent.lock().await.len(), 1);

        let mut saw_rejected = false;
        while let Ok(event) = rx.try_recv() {
            if let DashboardEvent::ConfirmationRejected { id, .. } = event {
                assert_eq!(id, second);
                saw_rejected = true;
            }
        }
        assert!(saw_rejected);
    }

    #[tokio::test]
    async fn start_without_channels_fails() {
        let h = harness(serde_json::json!({}), false).await;
        let bot = Arc::new(ListBot::new(
            Arc::clone(&h.config),
            GroupCache::load(h._dir.path().join("other-groups.json")).await,
            Arc::clone(&h.hub),
            Arc::clone(&h.confirmations),
            Arc::new(ChannelManager::new()),
        ));

        let err = bot.start().await.unwrap_err();
        assert!(matches!(err, crate::error::Error::Channel(ChannelError::StartupFailed { .. })));
        assert!(!h.hub.is_ready().await);
    }

    #[tokio::test]
    async fn send_delay_does_not_hold_up_other_messages() {
        let h = harness(
            serde_json::json!({"delayMs": 60_000, "selectedGroups": ["g1", "g2"]}),
            false,
        )
        .await;
        let mut rx = h.hub.subscribe();
        let bot = Arc::new(h.bot);

        let messages: MessageStream = Box::pin(futures::stream::iter(vec![
            group_msg("g1", OPEN_LIST),
            group_msg("g2", OPEN_LIST),
        ]));

        tokio::time::timeout(Duration::from_secs(5), async {
            bot.run(messages).await;
            let mut received = 0;
            while received < 2 {
                if let DashboardEvent::MessageReceived { .. } = rx.recv().await.unwrap() {
                    received += 1;
                }
            }
        })
        .await
        .expect("second message waited for the first send");

        assert!(h.channel.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn send_failure_is_reported() {
        let h = harness(serde_json::json!({}), true).await;
        let mut rx = h.hub.subscribe();
        assert_eq!(
            h.bot.handle_message(group_msg("g1", OPEN_LIST)).await,
            Outcome::SendFailed
        );

        let mut saw_error = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, DashboardEvent::Error { .. }) {
                saw_error = true;
            }
        }
        assert!(saw_error);
    }
}
