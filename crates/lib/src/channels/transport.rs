//! Outbound side of a channel: what the request handler needs to talk back to a conversation.

use crate::channels::inbound::ConversationId;
use async_trait::async_trait;

/// Delivery failure on the outbound side. Logged by callers, never retried by the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request URL is stripped: Bot API URLs carry the bot token.
    #[error("transport request failed: {0}")]
    Request(reqwest::Error),
    #[error("transport api error: {0}")]
    Api(String),
    #[error("telegram bot token not configured")]
    NotConfigured,
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Request(e.without_url())
    }
}

/// Text formatting requested for an outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Markdown,
}

impl ParseMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ParseMode::Markdown => "Markdown",
        }
    }
}

/// Options for `send_text`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub parse_mode: Option<ParseMode>,
}

impl SendOptions {
    pub fn markdown() -> Self {
        Self {
            parse_mode: Some(ParseMode::Markdown),
        }
    }
}

/// Interactive "busy" indicator shown in the conversation while a request is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressSignal {
    Typing,
    UploadPhoto,
}

impl ProgressSignal {
    /// Telegram chat action name.
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressSignal::Typing => "typing",
            ProgressSignal::UploadPhoto => "upload_photo",
        }
    }
}

/// Outbound sink for one channel. Implementations must be safe to call from many workers at once.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(
        &self,
        conversation_id: ConversationId,
        text: &str,
        opts: SendOptions,
    ) -> Result<(), TransportError>;

    /// Send a photo by URL.
    async fn send_photo(&self, conversation_id: ConversationId, url: &str) -> Result<(), TransportError>;

    async fn send_progress_signal(
        &self,
        conversation_id: ConversationId,
        signal: ProgressSignal,
    ) -> Result<(), TransportError>;

    /// Turn a transport file reference (from `InboundEvent::image`) into a URL the provider can fetch.
    async fn resolve_image_url(&self, file_ref: &str) -> Result<String, TransportError>;
}
