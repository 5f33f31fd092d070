//! Content analysis adapter (image -> text)
//!
//! Sends a time-limited image URL plus an instruction template to a
//! chat-completions style vision endpoint and returns the raw model text.
//! The endpoint fetches the image itself, so invocation payloads stay small
//! regardless of artifact size.

use async_trait::async_trait;
use closet_common::{Result, StageError};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Multimodal image-description capability.
#[async_trait]
pub trait VisionAdapter: Send + Sync {
    /// Describe the image behind `image_url` according to `instructions`.
    /// Returns the raw model text; parsing is the caller's concern.
    async fn describe_image(&self, image_url: &str, instructions: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Debug, Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Vision adapter backed by an OpenAI-compatible chat-completions API.
#[derive(Clone)]
pub struct OpenAiVision {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl OpenAiVision {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl VisionAdapter for OpenAiVision {
    #[instrument(skip(self, instructions))]
    async fn describe_image(&self, image_url: &str, instructions: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text { text: instructions },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: image_url },
                    },
                ],
            }],
            max_tokens: 800,
        };

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| StageError::adapter(format!("Vision API request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StageError::adapter(format!("Vision API error: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| StageError::adapter(format!("Vision API returned malformed JSON: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| StageError::adapter("Vision API returned no choices"))?;

        debug!(chars = content.len(), "Vision response received");

        Ok(content.trim().to_string())
    }
}
