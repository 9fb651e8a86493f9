//! WebSocket server + REST endpoints for the dashboard.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::hub::EventHub;
use super::model::{ClientAction, DashboardEvent};
use crate::bot::{ConfirmationOutcome, ListBot};
use crate::config::ConfigStore;
use crate::confirmations::ConfirmationQueue;
use crate::error::{ConfigError, DashboardError};
use crate::groups::GroupCache;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConfigStore>,
    pub groups: Arc<GroupCache>,
    pub hub: Arc<EventHub>,
    pub confirmations: Arc<ConfirmationQueue>,
    pub bot: Arc<ListBot>,
}

/// Build the Axum router with dashboard WebSocket and REST routes.
pub fn dashboard_routes(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/api/status", get(get_status))
        .route("/api/groups", get(list_groups))
        .route("/api/groups/selected", post(set_selected_groups))
        .route("/api/config", get(get_config).post(update_config))
        .route("/api/members", get(get_members).post(set_members))
        .route(
            "/api/groups/{group_id}/members",
            get(get_group_members).post(set_group_members),
        )
        .route("/api/confirm/{id}", post(confirm))
        .route("/api/confirmations", get(list_confirmations))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind the dashboard listener.
pub async fn bind(addr: &str) -> Result<tokio::net::TcpListener, DashboardError> {
    tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| DashboardError::Bind {
            addr: addr.to_string(),
            source,
        })
}

/// Serve the router until the listener fails.
pub async fn serve(listener: tokio::net::TcpListener, app: Router) -> crate::error::Result<()> {
    axum::serve(listener, app)
        .await
        .map_err(DashboardError::Serve)?;
    Ok(())
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn config_error_response(e: ConfigError) -> Response {
    let status = match e {
        ConfigError::InvalidValue { .. } | ConfigError::Json(_) => StatusCode::BAD_REQUEST,
        ConfigError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(error = %e, "Failed to persist configuration");
    }
    error_response(status, e.to_string())
}

/// Pull a `[string]` field out of a request body.
fn string_list(body: &Value, key: &str) -> Option<Vec<String>> {
    serde_json::from_value(body.get(key)?.clone()).ok()
}

// ── Health & status ─────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let channels = state.bot.channel_health().await;
    let status = if channels.values().all(|healthy| *healthy) {
        "ok"
    } else {
        "degraded"
    };
    Json(json!({
        "status": status,
        "service": "lineup-bot",
        "channels": channels,
    }))
}

async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.hub.status().await)
}

// ── Groups ──────────────────────────────────────────────────────────────

async fn list_groups(State(state): State<AppState>) -> Response {
    if !state.hub.is_ready().await {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "Bot is not ready yet");
    }
    let config = state.config.snapshot().await;
    Json(state.groups.list(&config.selected_groups).await).into_response()
}

async fn set_selected_groups(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let Some(selected) = string_list(&body, "selectedGroups") else {
        return error_response(StatusCode::BAD_REQUEST, "selectedGroups must be an array");
    };

    match state.config.set_selected_groups(selected).await {
        Ok(config) => {
            info!(count = config.selected_groups.len(), "Selected groups updated");
            let selected = config.selected_groups.clone();
            state.hub.emit(DashboardEvent::ConfigUpdated { config });
            Json(json!({ "success": true, "selectedGroups": selected })).into_response()
        }
        Err(e) => config_error_response(e),
    }
}

// ── Config ──────────────────────────────────────────────────────────────

async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.config.snapshot().await)
}

async fn update_config(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    match state.config.apply_patch(body).await {
        Ok(config) => {
            info!("Configuration updated from dashboard");
            state.hub.emit(DashboardEvent::ConfigUpdated {
                config: config.clone(),
            });
            Json(json!({ "success": true, "config": config })).into_response()
        }
        Err(e) => config_error_response(e),
    }
}

// ── Rosters ─────────────────────────────────────────────────────────────

async fn get_members(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.config.snapshot().await;
    Json(json!({ "members": config.members_to_add }))
}

async fn set_members(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    let Some(members) = string_list(&body, "members") else {
        return error_response(StatusCode::BAD_REQUEST, "members must be an array");
    };

    match state.config.set_members(members).await {
        Ok(config) => {
            let members = config.members_to_add;
            info!(count = members.len(), "Global roster updated");
            state.hub.emit(DashboardEvent::MembersUpdated {
                members: members.clone(),
            });
            Json(json!({ "success": true, "members": members })).into_response()
        }
        Err(e) => config_error_response(e),
    }
}

async fn get_group_members(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
) -> impl IntoResponse {
    let config = state.config.snapshot().await;
    let members = config.group_members.get(&group_id).cloned();
    Json(json!({
        "groupId": group_id,
        "useGlobal": members.is_none(),
        "members": members,
    }))
}

async fn set_group_members(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let members = match body.get("members") {
        Some(Value::Null) => None,
        Some(value) => match serde_json::from_value::<Vec<String>>(value.clone()) {
            Ok(members) => Some(members),
            Err(_) => {
                return error_response(StatusCode::BAD_REQUEST, "members must be an array or null");
            }
        },
        None => return error_response(StatusCode::BAD_REQUEST, "members must be an array or null"),
    };

    match state.config.set_group_members(&group_id, members.clone()).await {
        Ok(_) => {
            info!(group_id = %group_id, use_global = members.is_none(), "Group roster updated");
            state.hub.emit(DashboardEvent::GroupMembersUpdated {
                group_id: group_id.clone(),
                members: members.clone(),
            });
            Json(json!({ "success": true, "groupId": group_id, "members": members }))
                .into_response()
        }
        Err(e) => config_error_response(e),
    }
}

// ── Confirmations ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ConfirmRequest {
    approved: bool,
}

async fn confirm(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ConfirmRequest>,
) -> Response {
    let Ok(id) = Uuid::parse_str(&id) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid confirmation ID");
    };

    match state.bot.resolve_confirmation(id, body.approved).await {
        Some(outcome) => Json(json!({
            "success": true,
            "sent": outcome == ConfirmationOutcome::Sent,
        }))
        .into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Confirmation not found"),
    }
}

async fn list_confirmations(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.confirmations.list().await)
}

// ── WebSocket ───────────────────────────────────────────────────────────

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("Dashboard client connecting");
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn send_event(socket: &mut WebSocket, event: &DashboardEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize dashboard event");
            true
        }
    }
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut rx = state.hub.subscribe();
    let status = state.hub.client_connected().await;
    info!(clients = status.connected_clients, "Dashboard client connected");

    let config = state.config.snapshot().await;
    let greeting = [
        DashboardEvent::StatusUpdate { status },
        DashboardEvent::ConfigUpdated { config },
    ];
    for event in &greeting {
        if !send_event(&mut socket, event).await {
            warn!("Failed to send initial state, client disconnected");
            state.hub.client_disconnected().await;
            return;
        }
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if !send_event(&mut socket, &event).await {
                            debug!("Client disconnected during send");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(missed = n, "Dashboard client lagged behind broadcast");
                        let status = state.hub.status().await;
                        if !send_event(&mut socket, &DashboardEvent::StatusUpdate { status }).await {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!("Broadcast channel closed");
                        break;
                    }
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&text, &state);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Dashboard client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    state.hub.client_disconnected().await;
    info!("WebSocket connection closed");
}

/// Resolving a confirmation waits out the send delay, so it runs off the
/// socket loop.
fn handle_client_message(text: &str, state: &AppState) {
    match serde_json::from_str::<ClientAction>(text) {
        Ok(ClientAction::Confirm { id, approved }) => {
            let bot = Arc::clone(&state.bot);
            tokio::spawn(async move {
                match bot.resolve_confirmation(id, approved).await {
                    Some(outcome) => info!(id = %id, ?outcome, "Confirmation resolved via WS"),
                    None => warn!(id = %id, "Confirmation not found"),
                }
            });
        }
        Err(e) => {
            debug!(error = %e, text = text, "Unrecognized WS message from client");
        }
    }
}
