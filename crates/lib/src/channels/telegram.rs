//! Telegram channel: long-poll getUpdates and the Bot API calls the relay needs
//! (sendMessage, sendPhoto, sendChatAction, getFile, setMyCommands, webhooks).

use crate::channels::inbound::{ConversationId, InboundEvent};
use crate::channels::transport::{ProgressSignal, SendOptions, Transport, TransportError};
use crate::dispatch::Dispatcher;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const LONG_POLL_TIMEOUT: u64 = 30;
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(2);

/// Envelope of every Bot API response.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram update payload (getUpdates result item or webhook POST body).
#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    pub chat: TelegramChat,
    #[serde(default)]
    pub from: Option<TelegramUser>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    /// Available sizes of an attached photo, smallest first.
    #[serde(default)]
    pub photo: Option<Vec<TelegramPhotoSize>>,
    #[serde(default)]
    pub entities: Option<Vec<TelegramEntity>>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct TelegramPhotoSize {
    pub file_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TelegramEntity {
    #[serde(rename = "type")]
    pub typ: String,
    pub offset: i64,
}

#[derive(Debug, Deserialize)]
struct TelegramFile {
    #[serde(default)]
    file_path: Option<String>,
}

impl TelegramUpdate {
    /// Map the update to an inbound event. Updates without a message (edits, callbacks, ...) yield None.
    pub fn into_event(self) -> Option<InboundEvent> {
        let msg = self.message?;
        let is_command = msg
            .entities
            .iter()
            .flatten()
            .any(|e| e.typ == "bot_command" && e.offset == 0);
        let image = msg
            .photo
            .as_ref()
            .and_then(|sizes| sizes.last())
            .map(|p| p.file_id.clone());
        Some(InboundEvent {
            conversation_id: msg.chat.id,
            sender_id: msg.from.map(|u| u.id).unwrap_or(msg.chat.id),
            text: msg.text.or(msg.caption),
            image,
            is_command,
        })
    }
}

/// Telegram channel connector: long-polls for updates and implements the outbound `Transport`.
pub struct TelegramChannel {
    token: Option<String>,
    api_base: String,
    running: AtomicBool,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(token: Option<String>, api_base: Option<String>) -> Self {
        let api_base = api_base
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE.to_string());
        Self {
            token,
            api_base,
            running: AtomicBool::new(false),
            client: reqwest::Client::new(),
        }
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the getUpdates loop after the current poll returns.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Start the getUpdates long-poll loop and route every update through the dispatcher.
    /// Returns a handle to await on shutdown.
    pub fn start_inbound(self: Arc<Self>, dispatcher: Arc<Dispatcher>) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        log::info!("telegram: starting getUpdates long-poll loop");
        tokio::spawn(async move {
            run_get_updates_loop(self, dispatcher).await;
        })
    }

    fn method_url(&self, method: &str) -> Result<String, TransportError> {
        let token = self.token.as_ref().ok_or(TransportError::NotConfigured)?;
        Ok(format!("{}/bot{}/{}", self.api_base, token, method))
    }

    /// POST a Bot API method with a JSON body and unwrap the `result` field.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<Option<T>, TransportError> {
        let url = self.method_url(method)?;
        let res = self.client.post(&url).json(body).send().await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(TransportError::Api(format!("{} failed: {} {}", method, status, body)));
        }
        let data: ApiResponse<T> = res.json().await?;
        if !data.ok {
            return Err(TransportError::Api(format!(
                "{} returned ok: false ({})",
                method,
                data.description.unwrap_or_default()
            )));
        }
        Ok(data.result)
    }

    /// Call Telegram getUpdates (long poll). Returns (updates, next_offset).
    async fn get_updates(
        &self,
        offset: Option<i64>,
    ) -> Result<(Vec<TelegramUpdate>, Option<i64>), TransportError> {
        let mut body = serde_json::json!({
            "timeout": LONG_POLL_TIMEOUT,
            "allowed_updates": ["message"],
        });
        if let Some(off) = offset {
            body["offset"] = off.into();
        }
        let updates: Vec<TelegramUpdate> = self.call("getUpdates", &body).await?.unwrap_or_default();
        let next_offset = updates.iter().map(|u| u.update_id).max().map(|id| id + 1);
        Ok((updates, next_offset))
    }

    /// Set webhook URL (and optional secret). When set, Telegram POSTs updates to the URL instead of getUpdates.
    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> Result<(), TransportError> {
        let mut body = serde_json::json!({ "url": url, "allowed_updates": ["message"] });
        if let Some(s) = secret {
            body["secret_token"] = serde_json::Value::String(s.to_string());
        }
        self.call::<serde_json::Value>("setWebhook", &body).await?;
        Ok(())
    }

    /// Remove webhook so the bot can use getUpdates again.
    pub async fn delete_webhook(&self) -> Result<(), TransportError> {
        self.call::<serde_json::Value>("deleteWebhook", &serde_json::json!({}))
            .await?;
        Ok(())
    }

    /// Register the command menu shown by Telegram clients.
    pub async fn set_my_commands(&self, commands: &[(&str, &str)]) -> Result<(), TransportError> {
        let commands: Vec<serde_json::Value> = commands
            .iter()
            .map(|(command, description)| {
                serde_json::json!({ "command": command, "description": description })
            })
            .collect();
        self.call::<serde_json::Value>("setMyCommands", &serde_json::json!({ "commands": commands }))
            .await?;
        Ok(())
    }

    async fn send_message(
        &self,
        chat_id: ConversationId,
        text: &str,
        opts: SendOptions,
    ) -> Result<(), TransportError> {
        let mut body = serde_json::json!({ "chat_id": chat_id, "text": text });
        if let Some(mode) = opts.parse_mode {
            body["parse_mode"] = serde_json::Value::String(mode.as_str().to_string());
        }
        self.call::<serde_json::Value>("sendMessage", &body).await?;
        Ok(())
    }
}

async fn run_get_updates_loop(channel: Arc<TelegramChannel>, dispatcher: Arc<Dispatcher>) {
    let mut offset: Option<i64> = None;
    while channel.running() {
        match channel.get_updates(offset).await {
            Ok((updates, next)) => {
                if next.is_some() {
                    offset = next;
                }
                for update in updates {
                    if let Some(event) = update.into_event() {
                        dispatcher.route(event);
                    }
                }
            }
            Err(e) => {
                log::warn!("telegram: getUpdates error: {}", e);
                tokio::time::sleep(POLL_ERROR_BACKOFF).await;
            }
        }
    }
    log::info!("telegram: getUpdates loop stopped");
}

#[async_trait]
impl Transport for TelegramChannel {
    /// Formatted sends that Telegram rejects (usually unbalanced Markdown from the model) are retried once as plain text.
    async fn send_text(
        &self,
        conversation_id: ConversationId,
        text: &str,
        opts: SendOptions,
    ) -> Result<(), TransportError> {
        match self.send_message(conversation_id, text, opts).await {
            Err(e) if opts.parse_mode.is_some() => {
                log::warn!(
                    "telegram: formatted sendMessage to {} failed, retrying as plain text: {}",
                    conversation_id,
                    e
                );
                self.send_message(conversation_id, text, SendOptions::default())
                    .await
            }
            other => other,
        }
    }

    async fn send_photo(&self, conversation_id: ConversationId, url: &str) -> Result<(), TransportError> {
        let body = serde_json::json!({ "chat_id": conversation_id, "photo": url });
        self.call::<serde_json::Value>("sendPhoto", &body).await?;
        Ok(())
    }

    async fn send_progress_signal(
        &self,
        conversation_id: ConversationId,
        signal: ProgressSignal,
    ) -> Result<(), TransportError> {
        let body = serde_json::json!({ "chat_id": conversation_id, "action": signal.as_str() });
        self.call::<serde_json::Value>("sendChatAction", &body).await?;
        Ok(())
    }

    async fn resolve_image_url(&self, file_ref: &str) -> Result<String, TransportError> {
        let token = self.token.as_ref().ok_or(TransportError::NotConfigured)?;
        let file: TelegramFile = self
            .call("getFile", &serde_json::json!({ "file_id": file_ref }))
            .await?
            .ok_or_else(|| TransportError::Api("getFile returned no result".to_string()))?;
        let path = file
            .file_path
            .ok_or_else(|| TransportError::Api("getFile returned no file_path".to_string()))?;
        Ok(format!("{}/file/bot{}/{}", self.api_base, token, path))
    }
}
