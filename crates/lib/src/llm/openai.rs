//! OpenAI-compatible client: /chat/completions and /images/generations.
//!
//! User turns that carry an image are sent as content parts (text + image_url) so vision
//! models can see the picture.

use crate::context::{ContextMessage, Role};
use crate::llm::{CompletionProvider, ProviderError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";
pub const DEFAULT_IMAGE_SIZE: &str = "1024x1024";

/// Client for an OpenAI-compatible HTTP API.
#[derive(Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: Option<String>,
    image_model: String,
    image_size: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(
        base_url: Option<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url,
            api_key,
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            image_size: DEFAULT_IMAGE_SIZE.to_string(),
            client,
        })
    }

    /// Override the image model and size used by `generate_image`.
    pub fn with_image_settings(mut self, model: impl Into<String>, size: impl Into<String>) -> Self {
        self.image_model = model.into();
        self.image_size = size.into();
        self
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.post(&url).json(body);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        let res = req.send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ProviderError::Api(api_error_message(status, &body)));
        }
        Ok(res.json().await?)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiClient {
    /// POST /chat/completions: non-streaming.
    async fn complete(&self, model: &str, history: &[ContextMessage]) -> Result<String, ProviderError> {
        let body = OpenAiChatRequest {
            model: model.to_string(),
            messages: messages_to_openai(history),
        };
        let data: OpenAiChatResponse = self.post("/chat/completions", &body).await?;
        data.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(ProviderError::EmptyResponse)
    }

    /// POST /images/generations: one image, returned by URL.
    async fn generate_image(&self, prompt: &str) -> Result<String, ProviderError> {
        let body = OpenAiImageRequest {
            model: self.image_model.clone(),
            prompt: prompt.to_string(),
            n: 1,
            size: self.image_size.clone(),
        };
        let data: OpenAiImageResponse = self.post("/images/generations", &body).await?;
        data.data
            .into_iter()
            .find_map(|img| img.url)
            .ok_or(ProviderError::EmptyResponse)
    }
}

/// Prefer the API's own `error.message`; fall back to status + raw body.
fn api_error_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<OpenAiErrorResponse>(body)
        .ok()
        .map(|e| format!("{} {}", status, e.error.message))
        .unwrap_or_else(|| format!("{} {}", status, body))
}

fn messages_to_openai(history: &[ContextMessage]) -> Vec<OpenAiMessage> {
    history
        .iter()
        .map(|m| {
            let content = match (&m.role, &m.image_url) {
                (Role::User, Some(url)) => {
                    let mut parts = Vec::with_capacity(2);
                    if !m.content.is_empty() {
                        parts.push(OpenAiContentPart::Text {
                            text: m.content.clone(),
                        });
                    }
                    parts.push(OpenAiContentPart::ImageUrl {
                        image_url: OpenAiImageUrl { url: url.clone() },
                    });
                    OpenAiContent::Parts(parts)
                }
                _ => OpenAiContent::Text(m.content.clone()),
            };
            OpenAiMessage {
                role: m.role.as_str(),
                content,
            }
        })
        .collect()
}

// --- wire types ---

#[derive(Debug, Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: &'static str,
    content: OpenAiContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum OpenAiContent {
    Text(String),
    Parts(Vec<OpenAiContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OpenAiContentPart {
    Text { text: String },
    ImageUrl { image_url: OpenAiImageUrl },
}

#[derive(Debug, Serialize)]
struct OpenAiImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAiImageRequest {
    model: String,
    prompt: String,
    n: u32,
    size: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiImageResponse {
    #[serde(default)]
    data: Vec<OpenAiImageData>,
}

#[derive(Debug, Deserialize)]
struct OpenAiImageData {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiErrorBody,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_turns_serialize_as_plain_content() {
        let history = vec![ContextMessage::user("hi"), ContextMessage::assistant("hello")];
        let value = serde_json::to_value(messages_to_openai(&history)).expect("serialize");
        assert_eq!(
            value,
            json!([
                { "role": "user", "content": "hi" },
                { "role": "assistant", "content": "hello" }
            ])
        );
    }

    #[test]
    fn image_turn_serializes_as_parts() {
        let history = vec![ContextMessage::user_with_image("what is it?", "https://t.test/f.jpg")];
        let value = serde_json::to_value(messages_to_openai(&history)).expect("serialize");
        assert_eq!(
            value,
            json!([{
                "role": "user",
                "content": [
                    { "type": "text", "text": "what is it?" },
                    { "type": "image_url", "image_url": { "url": "https://t.test/f.jpg" } }
                ]
            }])
        );
    }

    #[test]
    fn image_without_caption_has_only_image_part() {
        let history = vec![ContextMessage::user_with_image("", "https://t.test/f.jpg")];
        let value = serde_json::to_value(messages_to_openai(&history)).expect("serialize");
        assert_eq!(value[0]["content"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn api_error_prefers_error_message() {
        let body = r#"{"error": {"message": "model not found", "type": "invalid_request_error"}}"#;
        assert_eq!(
            api_error_message(reqwest::StatusCode::NOT_FOUND, body),
            "404 Not Found model not found"
        );
        assert_eq!(
            api_error_message(reqwest::StatusCode::BAD_GATEWAY, "upstream"),
            "502 Bad Gateway upstream"
        );
    }
}
