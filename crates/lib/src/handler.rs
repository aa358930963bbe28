//! Request handler: turns one classified inbound event into provider calls and replies.
//!
//! Runs inside a conversation's worker. Slow provider calls are wrapped in
//! `waiting::run_with_progress` so the chat keeps showing a busy indicator.

use crate::allowlist::{AllowlistStore, AuthorizedUser};
use crate::channels::{
    ConversationId, InboundEvent, ProgressSignal, SendOptions, Transport, TransportError, UserId,
};
use crate::commands::{self, Command};
use crate::context::{ContextMessage, ContextStore};
use crate::dispatch::EventHandler;
use crate::llm::{CompletionProvider, ProviderError};
use crate::waiting::run_with_progress;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::sync::Arc;
use std::time::Duration;

pub const UNSUPPORTED_INPUT_REPLY: &str = "Unsupported message type.";
pub const ACCESS_DENIED_REPLY: &str = "You don't have access.";
pub const ADMIN_ONLY_REPLY: &str = "Access is denied";
pub const UNKNOWN_COMMAND_REPLY: &str = "Can't parse command";
pub const IMAGE_ERROR_REPLY: &str = "An image generation error has occurred.";
pub const IMAGE_USAGE_REPLY: &str = "Please describe the image: /image <prompt>";
pub const IMAGE_FETCH_REPLY: &str = "Can't read the attached image.";

/// Why a request could not be answered.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("could not fetch the attached image: {0}")]
    Transport(#[from] TransportError),
    #[error("Unsupported message type.")]
    UnsupportedInput,
}

impl RequestError {
    /// Text shown in the conversation. Transport details stay in the log.
    pub fn user_message(&self) -> String {
        match self {
            RequestError::Provider(e) => e.to_string(),
            RequestError::Transport(_) => IMAGE_FETCH_REPLY.to_string(),
            RequestError::UnsupportedInput => UNSUPPORTED_INPUT_REPLY.to_string(),
        }
    }
}

/// Settings the handler needs from config.
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    /// User allowed to run /add_user.
    pub admin_id: Option<UserId>,
    /// Model used when the user has not chosen one.
    pub default_model: String,
    /// How often the progress signal is refreshed while the provider works.
    pub progress_interval: Duration,
}

/// Event handler wiring transport, provider, and allowlist together.
pub struct RelayHandler {
    transport: Arc<dyn Transport>,
    provider: Arc<dyn CompletionProvider>,
    allowlist: Arc<dyn AllowlistStore>,
    settings: HandlerSettings,
}

impl RelayHandler {
    pub fn new(
        transport: Arc<dyn Transport>,
        provider: Arc<dyn CompletionProvider>,
        allowlist: Arc<dyn AllowlistStore>,
        settings: HandlerSettings,
    ) -> Self {
        Self {
            transport,
            provider,
            allowlist,
            settings,
        }
    }

    /// Send a plain reply; delivery failures are logged and dropped.
    async fn reply(&self, conversation_id: ConversationId, text: &str) {
        self.reply_with(conversation_id, text, SendOptions::default())
            .await;
    }

    async fn reply_with(&self, conversation_id: ConversationId, text: &str, opts: SendOptions) {
        if let Err(e) = self.transport.send_text(conversation_id, text, opts).await {
            log::warn!("handler: send to {} failed: {}", conversation_id, e);
        }
    }

    /// Look up the sender; replies with the access-denied message when unknown.
    async fn authorize(&self, event: &InboundEvent) -> anyhow::Result<Option<AuthorizedUser>> {
        let user = self.allowlist.get(event.sender_id).await?;
        if user.is_none() {
            log::info!(
                "handler: rejected user {} in conversation {}",
                event.sender_id,
                event.conversation_id
            );
            self.reply(event.conversation_id, ACCESS_DENIED_REPLY).await;
        }
        Ok(user)
    }

    fn model_for(&self, user: &AuthorizedUser) -> String {
        user.model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.settings.default_model.clone())
    }

    /// Progress tick closure for `run_with_progress`.
    fn progress_tick(
        &self,
        conversation_id: ConversationId,
        signal: ProgressSignal,
    ) -> impl FnMut() -> BoxFuture<'static, Result<(), TransportError>> + Send + 'static {
        let transport = self.transport.clone();
        move || {
            let transport = transport.clone();
            async move { transport.send_progress_signal(conversation_id, signal).await }.boxed()
        }
    }

    async fn handle_start(&self, event: &InboundEvent) {
        let text = format!(
            "Your telegram User ID is: {}. Send it to bot administrator.",
            event.sender_id
        );
        self.reply(event.conversation_id, &text).await;
    }

    async fn handle_add_user(&self, event: &InboundEvent) -> anyhow::Result<()> {
        if self.settings.admin_id != Some(event.sender_id) {
            self.reply(event.conversation_id, ADMIN_ONLY_REPLY).await;
            return Ok(());
        }
        let user_id = event
            .text
            .as_deref()
            .and_then(commands::command_argument)
            .and_then(|arg| arg.split_whitespace().next())
            .and_then(|id| id.parse::<UserId>().ok());
        let Some(user_id) = user_id else {
            self.reply(event.conversation_id, "Can't parse user ID.").await;
            return Ok(());
        };
        self.allowlist.ensure(user_id).await?;
        log::info!("handler: user {} added by admin {}", user_id, event.sender_id);
        self.reply(event.conversation_id, "User added.").await;
        Ok(())
    }

    async fn handle_set_model(&self, event: &InboundEvent) -> anyhow::Result<()> {
        let Some(user) = self.authorize(event).await? else {
            return Ok(());
        };
        let model = event
            .text
            .as_deref()
            .and_then(commands::command_argument)
            .and_then(|arg| arg.split_whitespace().next());
        let Some(model) = model else {
            self.reply(event.conversation_id, "Can't parse model ID.").await;
            return Ok(());
        };
        self.allowlist
            .upsert(AuthorizedUser {
                model: Some(model.to_string()),
                ..user
            })
            .await?;
        self.reply(event.conversation_id, "Model set.").await;
        Ok(())
    }

    async fn handle_cancel(&self, context: &mut ContextStore, event: &InboundEvent) {
        context.clear(event.conversation_id);
        self.reply(event.conversation_id, "Context cleared.").await;
    }

    async fn handle_image(&self, event: &InboundEvent) -> anyhow::Result<()> {
        if self.authorize(event).await?.is_none() {
            return Ok(());
        }
        let conversation_id = event.conversation_id;
        let Some(prompt) = event.text.as_deref().and_then(commands::command_argument) else {
            self.reply(conversation_id, IMAGE_USAGE_REPLY).await;
            return Ok(());
        };
        let result = run_with_progress(
            self.provider.generate_image(prompt),
            self.progress_tick(conversation_id, ProgressSignal::UploadPhoto),
            self.settings.progress_interval,
        )
        .await;
        match result {
            Ok(url) => {
                if let Err(e) = self.transport.send_photo(conversation_id, &url).await {
                    log::warn!("handler: send photo to {} failed: {}", conversation_id, e);
                }
            }
            Err(e) => {
                log::error!("handler: image generation for {} failed: {}", conversation_id, e);
                self.reply(conversation_id, IMAGE_ERROR_REPLY).await;
            }
        }
        Ok(())
    }

    /// Chat turn: the user message goes into the context before the provider is called and
    /// stays there if the call fails.
    async fn handle_chat(&self, context: &mut ContextStore, event: &InboundEvent) -> anyhow::Result<()> {
        let Some(user) = self.authorize(event).await? else {
            return Ok(());
        };
        let conversation_id = event.conversation_id;
        let model = self.model_for(&user);
        let text = event.text.clone().unwrap_or_default();

        let primary = async {
            let message = match event.image.as_deref() {
                Some(file_ref) => {
                    let url = self.transport.resolve_image_url(file_ref).await?;
                    ContextMessage::user_with_image(text, url)
                }
                None => ContextMessage::user(text),
            };
            context.append(conversation_id, message);
            let history = context.snapshot(conversation_id);
            let reply = self.provider.complete(&model, &history).await?;
            Ok::<_, RequestError>(reply)
        };
        let result = run_with_progress(
            primary,
            self.progress_tick(conversation_id, ProgressSignal::Typing),
            self.settings.progress_interval,
        )
        .await;

        match result {
            Ok(reply) => {
                context.append(conversation_id, ContextMessage::assistant(reply.clone()));
                self.reply_with(conversation_id, &reply, SendOptions::markdown())
                    .await;
            }
            Err(e) => {
                log::error!("handler: completion for {} failed: {}", conversation_id, e);
                self.reply(conversation_id, &e.user_message()).await;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for RelayHandler {
    async fn handle(&self, context: &mut ContextStore, event: InboundEvent) -> anyhow::Result<()> {
        if event.is_empty() {
            log::debug!(
                "handler: {} (conversation {})",
                RequestError::UnsupportedInput,
                event.conversation_id
            );
            self.reply(event.conversation_id, UNSUPPORTED_INPUT_REPLY).await;
            return Ok(());
        }
        match commands::classify(&event) {
            Some(Command::Start) => self.handle_start(&event).await,
            Some(Command::AddUser) => self.handle_add_user(&event).await?,
            Some(Command::Cancel) => self.handle_cancel(context, &event).await,
            Some(Command::Image) => self.handle_image(&event).await?,
            Some(Command::SetModel) => self.handle_set_model(&event).await?,
            Some(Command::Unknown) => self.reply(event.conversation_id, UNKNOWN_COMMAND_REPLY).await,
            None => self.handle_chat(context, &event).await?,
        }
        Ok(())
    }
}
