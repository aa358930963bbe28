//! Gateway server: builds the relay (allowlist, provider, transport, dispatcher) and serves HTTP.

use crate::allowlist::{AllowlistStore, SqliteAllowlist};
use crate::channels::{TelegramChannel, TelegramUpdate};
use crate::commands::Command;
use crate::config::{self, Config};
use crate::dispatch::Dispatcher;
use crate::handler::{HandlerSettings, RelayHandler};
use crate::llm::openai::{DEFAULT_IMAGE_MODEL, DEFAULT_IMAGE_SIZE};
use crate::llm::OpenAiClient;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const WEBHOOK_SECRET_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub dispatcher: Arc<Dispatcher>,
    /// When Some, webhook POSTs must carry this value in the secret-token header.
    pub webhook_secret: Option<String>,
}

/// Routes: `GET /` health, `POST /telegram/webhook` inbound updates.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/telegram/webhook", post(telegram_webhook))
        .with_state(state)
}

/// Run the relay; binds to config.gateway.bind:config.gateway.port.
/// When bind is not loopback, a webhook secret must be configured or startup fails.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let bind = config.gateway.bind.trim().to_string();
    let webhook_secret = config
        .channels
        .telegram
        .webhook_secret
        .clone()
        .filter(|s| !s.trim().is_empty());
    if !config::is_loopback_bind(&bind) && webhook_secret.is_none() {
        anyhow::bail!(
            "refusing to bind gateway to {} without channels.telegram.webhookSecret",
            bind
        );
    }

    let sqlite_path = config::resolve_sqlite_path(&config);
    let allowlist = Arc::new(SqliteAllowlist::open(&sqlite_path)?);
    log::info!("allowlist database: {}", sqlite_path.display());
    let admin_id = config::resolve_admin_id(&config)?;
    match admin_id {
        Some(id) => {
            allowlist
                .ensure(id)
                .await
                .context("adding admin user to allowlist")?;
        }
        None => log::warn!("no admin id configured; /add_user is disabled"),
    }

    let provider_key = config::resolve_provider_key(&config);
    if provider_key.is_none() {
        log::warn!("no provider api key configured (OPENAI_KEY); provider calls will likely fail");
    }
    let provider = OpenAiClient::new(
        config.provider.base_url.clone(),
        provider_key,
        config.provider.request_timeout(),
    )
    .context("building provider client")?
    .with_image_settings(
        config
            .provider
            .image_model
            .clone()
            .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
        config
            .provider
            .image_size
            .clone()
            .unwrap_or_else(|| DEFAULT_IMAGE_SIZE.to_string()),
    );

    let telegram_token = config::resolve_telegram_token(&config);
    let telegram = Arc::new(TelegramChannel::new(
        telegram_token.clone(),
        config::resolve_telegram_api_base(&config),
    ));

    let settings = HandlerSettings {
        admin_id,
        default_model: config::resolve_default_model(&config),
        progress_interval: config.dispatch.progress_interval(),
    };
    log::info!("default model: {}", settings.default_model);
    let handler = RelayHandler::new(telegram.clone(), Arc::new(provider), allowlist, settings);
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(handler)));

    let webhook_url = config.channels.telegram.webhook_url.clone();
    let mut poll_task: Option<JoinHandle<()>> = None;
    if telegram_token.is_some() {
        if let Err(e) = telegram.set_my_commands(Command::menu()).await {
            log::warn!("telegram: setMyCommands failed: {}", e);
        }
        let username = config::resolve_telegram_username(&config).unwrap_or_else(|| "?".to_string());
        if let Some(ref url) = webhook_url {
            telegram
                .set_webhook(url, webhook_secret.as_deref())
                .await
                .context("registering telegram webhook")?;
            log::info!("telegram channel @{} registered (webhook mode): {}", username, url);
        } else {
            // A leftover webhook makes getUpdates fail.
            if let Err(e) = telegram.delete_webhook().await {
                log::debug!("telegram: deleteWebhook before polling failed: {}", e);
            }
            poll_task = Some(telegram.clone().start_inbound(dispatcher.clone()));
            log::info!("telegram channel @{} registered and getUpdates loop started", username);
        }
    } else {
        log::warn!("telegram bot token not configured (TELEGRAM_BOT_TOKEN); no channel started");
    }

    let state = GatewayState {
        config: Arc::new(config.clone()),
        dispatcher,
        webhook_secret,
    };
    let app = build_router(state);

    let bind_addr = format!("{}:{}", bind, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    let webhook_mode = telegram_token.is_some() && webhook_url.is_some();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(telegram, poll_task, webhook_mode))
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// Stops the poll loop (waiting briefly for the in-flight poll), and removes the webhook if used.
async fn shutdown_signal(
    telegram: Arc<TelegramChannel>,
    poll_task: Option<JoinHandle<()>>,
    webhook_mode: bool,
) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, stopping channel");

    telegram.stop();
    if webhook_mode {
        if let Err(e) = telegram.delete_webhook().await {
            log::debug!("telegram delete_webhook on shutdown: {}", e);
        }
    }
    if let Some(mut handle) = poll_task {
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await.is_err() {
            handle.abort();
            log::debug!("telegram poll task aborted after grace period");
        }
    }
    log::info!("channel stopped");
}

/// POST /telegram/webhook: receives Telegram update JSON; verifies optional secret, routes the event.
async fn telegram_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(ref expected) = state.webhook_secret {
        let provided = headers
            .get(WEBHOOK_SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if provided != expected.as_str() {
            return StatusCode::FORBIDDEN;
        }
    }
    let update: TelegramUpdate = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(_) => return StatusCode::BAD_REQUEST,
    };
    if let Some(event) = update.into_event() {
        state.dispatcher.route(event);
    }
    StatusCode::OK
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
        "conversations": state.dispatcher.conversation_count(),
    }))
}
