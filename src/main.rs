use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use lineup_bot::bot::ListBot;
use lineup_bot::channels::{ChannelManager, CliChannel, TelegramChannel};
use lineup_bot::config::{ConfigStore, ServerConfig};
use lineup_bot::confirmations::ConfirmationQueue;
use lineup_bot::dashboard::{self, AppState, EventHub, dashboard_routes};
use lineup_bot::groups::GroupCache;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let server = ServerConfig::from_env();

    // Keep the guard alive so buffered log lines are flushed on exit.
    let _log_guard = init_tracing(&server);

    eprintln!("⚽ Lineup Bot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Dashboard: http://{}/", server.bind_addr());
    eprintln!("   Events WS: ws://{}/ws", server.bind_addr());

    // ── State ───────────────────────────────────────────────────────────
    let config = ConfigStore::load(&server.config_path)
        .await
        .context("failed to load bot configuration")?;
    eprintln!("   Config: {}", config.path().display());
    let groups = GroupCache::load(&server.groups_path).await;
    let hub = EventHub::new();
    let confirmations = ConfirmationQueue::new(Arc::clone(&hub));

    // ── Channels ────────────────────────────────────────────────────────
    let mut channels = ChannelManager::new();
    if server.cli_enabled {
        channels.add(Arc::new(CliChannel::new()));
    }
    if let Some(token) = server.telegram_token.clone() {
        channels.add(Arc::new(TelegramChannel::new(token)));
    }
    let active_channels = channels.names();
    if active_channels.is_empty() {
        anyhow::bail!("no channels configured: set TELEGRAM_BOT_TOKEN or enable LINEUP_CLI");
    }
    eprintln!("   Channels: {}\n", active_channels.join(", "));
    let channels = Arc::new(channels);

    let bot = Arc::new(ListBot::new(
        Arc::clone(&config),
        Arc::clone(&groups),
        Arc::clone(&hub),
        Arc::clone(&confirmations),
        Arc::clone(&channels),
    ));

    // ── Dashboard server ────────────────────────────────────────────────
    let app = dashboard_routes(AppState {
        config,
        groups,
        hub: Arc::clone(&hub),
        confirmations,
        bot: Arc::clone(&bot),
    });
    let listener = dashboard::bind(&server.bind_addr()).await?;
    tracing::info!(addr = %server.bind_addr(), "Dashboard server started");
    tokio::spawn(async move {
        if let Err(e) = dashboard::serve(listener, app).await {
            tracing::error!(error = %e, "Dashboard server stopped");
        }
    });

    // ── Message loop ────────────────────────────────────────────────────
    tokio::select! {
        result = bot.start() => result.context("bot stopped")?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
        }
    }

    hub.set_ready(false, Vec::new()).await;
    channels.shutdown_all().await;
    Ok(())
}

fn init_tracing(server: &ServerConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    match &server.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "lineup-bot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            None
        }
    }
}
