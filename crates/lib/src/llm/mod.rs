//! Completion provider abstraction and the OpenAI-compatible HTTP client.

pub mod openai;

pub use openai::OpenAiClient;

use crate::context::ContextMessage;
use async_trait::async_trait;

/// Failure of a provider call. Shown to the user of the conversation that made the request.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("provider api error: {0}")]
    Api(String),
    #[error("provider returned an empty response")]
    EmptyResponse,
}

/// Generative backend used by the request handler. Calls may take minutes.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Chat completion over the full conversation history; returns the assistant's text.
    async fn complete(&self, model: &str, history: &[ContextMessage]) -> Result<String, ProviderError>;

    /// Generate an image from a prompt; returns a URL to the image.
    async fn generate_image(&self, prompt: &str) -> Result<String, ProviderError>;
}
