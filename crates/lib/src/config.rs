//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.relay/config.json`) and environment.
//! Secrets and per-deployment values can come from env vars, which override the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::channels::UserId;

pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server settings (health probe and Telegram webhook).
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Channel settings (Telegram).
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Completion provider (OpenAI-compatible API).
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Allowlist database location.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Per-conversation dispatch settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 15152).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    15152
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Per-channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub telegram: TelegramChannelConfig,
}

/// Telegram channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramChannelConfig {
    /// Bot token from BotFather. Overridden by TELEGRAM_BOT_TOKEN env when set.
    pub bot_token: Option<String>,
    /// Bot username (without @). Overridden by TELEGRAM_BOT_USERNAME.
    pub bot_username: Option<String>,
    /// Telegram user id of the administrator (may run /add_user). Overridden by TELEGRAM_BOT_ADMIN_ID.
    pub admin_id: Option<UserId>,
    /// When set, use webhook mode: Telegram POSTs updates to this URL. If unset, long-poll getUpdates is used.
    pub webhook_url: Option<String>,
    /// Secret for webhook verification (X-Telegram-Bot-Api-Secret-Token).
    pub webhook_secret: Option<String>,
    /// Bot API base URL (default https://api.telegram.org). Overridden by TELEGRAM_API_BASE.
    pub api_base: Option<String>,
}

/// Completion provider config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// API key. Overridden by OPENAI_KEY env.
    pub api_key: Option<String>,
    /// API base URL including the version segment (default https://api.openai.com/v1).
    pub base_url: Option<String>,
    /// Chat model for users without their own choice. Overridden by OPENAI_MODEL env.
    pub default_model: Option<String>,
    /// Image generation model (default dall-e-3).
    pub image_model: Option<String>,
    /// Image size (default 1024x1024).
    pub image_size: Option<String>,
    /// Per-request timeout in seconds (default 120).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            default_model: None,
            image_model: None,
            image_size: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Storage config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// SQLite database for the allowlist (default ~/.relay/relay.db). Overridden by SQLITE_PATH.
    pub sqlite_path: Option<PathBuf>,
}

/// Dispatch config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchConfig {
    /// Seconds between progress signals (typing indicator) while a request runs (default 5).
    #[serde(default = "default_progress_interval_secs")]
    pub progress_interval_secs: u64,
}

fn default_progress_interval_secs() -> u64 {
    5
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            progress_interval_secs: default_progress_interval_secs(),
        }
    }
}

impl DispatchConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs.max(1))
    }
}

/// Trimmed, non-empty env var.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Env var first, then the config value; both trimmed and ignored when empty.
fn resolve(env: &str, configured: Option<&String>) -> Option<String> {
    env_value(env).or_else(|| {
        configured
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Resolve the Telegram bot token: env TELEGRAM_BOT_TOKEN overrides config.
pub fn resolve_telegram_token(config: &Config) -> Option<String> {
    resolve("TELEGRAM_BOT_TOKEN", config.channels.telegram.bot_token.as_ref())
}

/// Resolve the bot username: env TELEGRAM_BOT_USERNAME overrides config.
pub fn resolve_telegram_username(config: &Config) -> Option<String> {
    resolve("TELEGRAM_BOT_USERNAME", config.channels.telegram.bot_username.as_ref())
        .map(|u| u.trim_start_matches('@').to_string())
}

/// Resolve the Telegram API base: env TELEGRAM_API_BASE overrides config.
pub fn resolve_telegram_api_base(config: &Config) -> Option<String> {
    resolve("TELEGRAM_API_BASE", config.channels.telegram.api_base.as_ref())
}

/// Resolve the administrator id: env TELEGRAM_BOT_ADMIN_ID overrides config.
/// An env value that is not an integer is an error rather than silently ignored.
pub fn resolve_admin_id(config: &Config) -> Result<Option<UserId>> {
    match env_value("TELEGRAM_BOT_ADMIN_ID") {
        Some(raw) => raw
            .parse::<UserId>()
            .map(Some)
            .with_context(|| format!("TELEGRAM_BOT_ADMIN_ID is not a valid user id: {}", raw)),
        None => Ok(config.channels.telegram.admin_id),
    }
}

/// Resolve the provider API key: env OPENAI_KEY overrides config.
pub fn resolve_provider_key(config: &Config) -> Option<String> {
    resolve("OPENAI_KEY", config.provider.api_key.as_ref())
}

/// Resolve the default chat model: env OPENAI_MODEL, then config, then DEFAULT_MODEL.
pub fn resolve_default_model(config: &Config) -> String {
    resolve("OPENAI_MODEL", config.provider.default_model.as_ref())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string())
}

/// Resolve the allowlist database path: env SQLITE_PATH, then config, then ~/.relay/relay.db.
pub fn resolve_sqlite_path(config: &Config) -> PathBuf {
    env_value("SQLITE_PATH")
        .map(PathBuf::from)
        .or_else(|| config.storage.sqlite_path.clone())
        .unwrap_or_else(|| relay_home().join("relay.db"))
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

fn relay_home() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".relay"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("RELAY_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| relay_home().join("config.json"))
}

/// Load config from the given path, or the default path (or RELAY_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
