//! Dashboard surface: REST API, WebSocket push and the event hub behind it.

pub mod hub;
pub mod model;
pub mod ws;

pub use hub::EventHub;
pub use model::{BotStatus, DashboardEvent};
pub use ws::{AppState, bind, dashboard_routes, serve};
