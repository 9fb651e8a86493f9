//! Integration tests for the dashboard WebSocket + REST surface.
//!
//! Each test spins up an Axum server on a random port, connects via
//! tokio-tungstenite, and exercises the real WS / REST contract.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use lineup_bot::bot::{ListBot, Outcome};
use lineup_bot::channels::{
    Channel, ChannelManager, IncomingMessage, MessageStream, OutgoingResponse,
};
use lineup_bot::config::ConfigStore;
use lineup_bot::confirmations::ConfirmationQueue;
use lineup_bot::dashboard::{AppState, EventHub, dashboard_routes};
use lineup_bot::error::ChannelError;
use lineup_bot::groups::GroupCache;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const OPEN_LIST: &str = "Football Wednesday\n1. Noa\n2.\n3.";

/// Channel that records responses instead of sending them.
#[derive(Default)]
struct RecordingChannel {
    sent: Mutex<Vec<OutgoingResponse>>,
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
        self.sent.lock().await.push(response);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

struct TestServer {
    port: u16,
    bot: Arc<ListBot>,
    hub: Arc<EventHub>,
    channel: Arc<RecordingChannel>,
    _dir: tempfile::TempDir,
}

/// Start an Axum server on a random port with a fresh config in a temp dir.
async fn start_server() -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let config = ConfigStore::load(dir.path().join("config.json")).await.unwrap();
    config
        .apply_patch(json!({
            "selectedGroups": ["g1"],
            "membersToAdd": ["Dana", "Avi"],
            "delayMs": 0,
            "requireConfirmation": true,
        }))
        .await
        .unwrap();
    let groups = GroupCache::load(dir.path().join("groups.json")).await;
    let hub = EventHub::new();
    let confirmations = ConfirmationQueue::new(Arc::clone(&hub));

    let channel = Arc::new(RecordingChannel::default());
    let mut manager = ChannelManager::new();
    manager.add(channel.clone());

    let bot = Arc::new(ListBot::new(
        Arc::clone(&config),
        Arc::clone(&groups),
        Arc::clone(&hub),
        Arc::clone(&confirmations),
        Arc::new(manager),
    ));

    let app = dashboard_routes(AppState {
        config,
        groups,
        hub: Arc::clone(&hub),
        confirmations,
        bot: Arc::clone(&bot),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        port,
        bot,
        hub,
        channel,
        _dir: dir,
    }
}

fn list_message() -> IncomingMessage {
    IncomingMessage::new("test", "u1", OPEN_LIST)
        .with_id("m1")
        .with_group("g1", "Wednesday")
        .with_sender_name("Noa")
}

/// Parse a WS text frame into a serde_json::Value.
fn parse_ws_json(msg: &Message) -> Value {
    match msg {
        Message::Text(txt) => serde_json::from_str(txt).expect("invalid JSON from server"),
        other => panic!("expected Text frame, got {:?}", other),
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Connect and consume the initial `status_update` + `config_updated` pair.
async fn connect(port: u16) -> (WsStream, Value, Value) {
    let (mut ws, _resp) = connect_async(format!("ws://127.0.0.1:{port}/ws"))
        .await
        .expect("WS connect failed");
    let status = parse_ws_json(&ws.next().await.unwrap().unwrap());
    let config = parse_ws_json(&ws.next().await.unwrap().unwrap());
    (ws, status, config)
}

/// Read frames until one with the given `type` arrives.
async fn next_of_type(ws: &mut WsStream, event_type: &str) -> Value {
    loop {
        let json = parse_ws_json(&ws.next().await.unwrap().unwrap());
        if json["type"] == event_type {
            return json;
        }
    }
}

// ── WebSocket Tests ──────────────────────────────────────────────────

#[tokio::test]
async fn ws_connect_receives_status_then_config() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let (_ws, status, config) = connect(server.port).await;

        assert_eq!(status["type"], "status_update");
        assert_eq!(status["status"]["connected_clients"], 1);
        assert_eq!(status["status"]["is_ready"], false);

        assert_eq!(config["type"], "config_updated");
        assert_eq!(config["config"]["selectedGroups"], json!(["g1"]));
        assert_eq!(config["config"]["requireConfirmation"], true);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ws_receives_ready_status() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let (mut ws, _, _) = connect(server.port).await;

        server.hub.set_ready(true, vec!["test".into()]).await;

        let json = next_of_type(&mut ws, "status_update").await;
        assert_eq!(json["status"]["is_ready"], true);
        assert_eq!(json["status"]["active_channels"], json!(["test"]));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn config_update_is_broadcast() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let (mut ws, _, _) = connect(server.port).await;

        let client = reqwest::Client::new();
        let resp = client
            .post(format!("http://127.0.0.1:{}/api/config", server.port))
            .json(&json!({ "replyMode": false }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let json = next_of_type(&mut ws, "config_updated").await;
        assert_eq!(json["config"]["replyMode"], false);
        assert_eq!(json["config"]["membersToAdd"], json!(["Dana", "Avi"]));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn group_roster_update_is_broadcast() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let (mut ws, _, _) = connect(server.port).await;

        let client = reqwest::Client::new();
        let resp = client
            .post(format!("http://127.0.0.1:{}/api/groups/g1/members", server.port))
            .json(&json!({ "members": ["Local"] }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let json = next_of_type(&mut ws, "group_members_updated").await;
        assert_eq!(json["group_id"], "g1");
        assert_eq!(json["members"], json!(["Local"]));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn list_flows_to_confirmation_and_ws_approve_sends() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let (mut ws, _, _) = connect(server.port).await;

        let outcome = server.bot.handle_message(list_message()).await;
        let Outcome::AwaitingConfirmation(id) = outcome else {
            panic!("expected a queued confirmation, got {outcome:?}");
        };

        let live = next_of_type(&mut ws, "group_message").await;
        assert_eq!(live["from"], "Noa");
        assert_eq!(live["message"], OPEN_LIST);

        let received = next_of_type(&mut ws, "message_received").await;
        assert_eq!(received["group_name"], "Wednesday");

        let required = next_of_type(&mut ws, "confirmation_required").await;
        assert_eq!(required["id"], id.to_string());
        assert_eq!(required["added_to_main"], 2);

        let resp = reqwest::get(format!("http://127.0.0.1:{}/api/confirmations", server.port))
            .await
            .unwrap();
        let pending: Vec<Value> = resp.json().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending[0]["preview_text"].as_str().unwrap().ends_with("..."));

        let action = json!({ "action": "confirm", "id": id, "approved": true });
        ws.send(Message::Text(action.to_string().into())).await.unwrap();

        let sent = next_of_type(&mut ws, "message_sent").await;
        assert_eq!(sent["success"], true);
        assert_eq!(sent["added_to_main"], 2);

        let responses = server.channel.sent.lock().await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].reply_to.as_deref(), Some("m1"));
        assert!(responses[0].content.contains("2. Dana\n3. Avi"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ws_keeps_streaming_while_approved_send_waits() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let (mut ws, _, _) = connect(server.port).await;
        let client = reqwest::Client::new();
        let config_url = format!("http://127.0.0.1:{}/api/config", server.port);

        client
            .post(&config_url)
            .json(&json!({ "delayMs": 60_000 }))
            .send()
            .await
            .unwrap();
        next_of_type(&mut ws, "config_updated").await;

        let Outcome::AwaitingConfirmation(id) = server.bot.handle_message(list_message()).await
        else {
            panic!("expected a queued confirmation");
        };
        next_of_type(&mut ws, "confirmation_required").await;

        let action = json!({ "action": "confirm", "id": id, "approved": true });
        ws.send(Message::Text(action.to_string().into())).await.unwrap();

        // The approved send is still sleeping; the socket must keep forwarding.
        client
            .post(&config_url)
            .json(&json!({ "replyMode": false }))
            .send()
            .await
            .unwrap();
        let json = next_of_type(&mut ws, "config_updated").await;
        assert_eq!(json["config"]["replyMode"], false);
        assert!(server.channel.sent.lock().await.is_empty());
    })
    .await
    .expect("test timed out");
}

// ── REST Tests ───────────────────────────────────────────────────────

#[tokio::test]
async fn health_endpoint() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;

        let resp = reqwest::get(format!("http://127.0.0.1:{}/health", server.port))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["channels"]["test"], true);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn rest_reject_broadcasts_and_sends_nothing() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let (mut ws, _, _) = connect(server.port).await;

        let Outcome::AwaitingConfirmation(id) = server.bot.handle_message(list_message()).await
        else {
            panic!("expected a queued confirmation");
        };

        let client = reqwest::Client::new();
        let resp = client
            .post(format!("http://127.0.0.1:{}/api/confirm/{id}", server.port))
            .json(&json!({ "approved": false }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let rejected = next_of_type(&mut ws, "confirmation_rejected").await;
        assert_eq!(rejected["id"], id.to_string());
        assert!(server.channel.sent.lock().await.is_empty());

        // A second resolution finds nothing.
        let resp = client
            .post(format!("http://127.0.0.1:{}/api/confirm/{id}", server.port))
            .json(&json!({ "approved": true }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn groups_listed_once_ready() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;

        let resp = reqwest::get(format!("http://127.0.0.1:{}/api/groups", server.port))
            .await
            .unwrap();
        assert_eq!(resp.status(), 503);

        server.bot.handle_message(list_message()).await;
        server.hub.set_ready(true, vec!["test".into()]).await;

        let resp = reqwest::get(format!("http://127.0.0.1:{}/api/groups", server.port))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let groups: Vec<Value> = resp.json().await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0]["id"], "g1");
        assert_eq!(groups[0]["isSelected"], true);
    })
    .await
    .expect("test timed out");
}
