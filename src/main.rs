use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use parkbot::config::AppConfig;
use parkbot::db;
use parkbot::handlers;
use parkbot::services::conversation::{ConversationEngine, Settings};
use parkbot::services::dispatcher::UserLocks;
use parkbot::services::sweeper;
use parkbot::services::transport::telegram::TelegramTransport;
use parkbot::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    anyhow::ensure!(!config.bot_token.is_empty(), "TELEGRAM_BOT_TOKEN must be set");
    if config.payment_provider_token.is_empty() {
        tracing::warn!("PAYMENT_PROVIDER_TOKEN is not set, invoices will be rejected by Telegram");
    }

    let conn = db::init_db(&config.database_url)?;
    let db = Arc::new(Mutex::new(conn));

    let transport = TelegramTransport::new(
        config.telegram_api_url.clone(),
        config.bot_token.clone(),
        config.payment_provider_token.clone(),
    );
    let link_transport = TelegramTransport::new(
        config.telegram_api_url.clone(),
        config.link_bot_token.clone(),
        config.payment_provider_token.clone(),
    );
    let engine = ConversationEngine::new(Settings::from(&config))?;

    let state = Arc::new(AppState {
        db: db.clone(),
        config: config.clone(),
        engine,
        transport: Box::new(transport),
        link_transport: Box::new(link_transport),
        user_locks: UserLocks::default(),
    });

    sweeper::spawn(db, Duration::from_secs(config.sweep_interval_secs.max(1)));
    tracing::info!(
        every_secs = config.sweep_interval_secs,
        hold_minutes = config.hold_minutes,
        "sweeper started"
    );

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/webhook/telegram", post(handlers::webhook::telegram_webhook))
        .route("/webhook/link", post(handlers::webhook::link_webhook))
        .route("/api/admin/status", get(handlers::admin::get_status))
        .route(
            "/api/accounts/:username/link-token",
            post(handlers::admin::issue_link_token),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
