//! Vision-model choice of the dish photo among sampled frames.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::openai::api_error_message;
use crate::collaborator::{CollaboratorError, ImageSelector};
use crate::config::{Config, GeminiConfig, ImageSelectorKind, LlmConfig};

/// Prompt sent after the labelled frames.
pub fn selection_prompt(count: usize) -> String {
    format!(
        "You are analyzing {count} frames from a cooking video to find the BEST image of the finished dish.\n\n\
         Look for a frame that shows:\n\
         1. The COMPLETED/FINISHED dish (not preparation steps)\n\
         2. Appetizing presentation with good lighting\n\
         3. Clear, well-focused image\n\
         4. The food as the main subject (not the cook's face or hands)\n\
         5. Attractive plating or serving presentation\n\n\
         Respond with ONLY the number (0-{last}) of the best frame.\n\
         If none show a finished dish, pick the most appetizing food image.\n\
         Just respond with the single number, nothing else.",
        count = count,
        last = count.saturating_sub(1),
    )
}

/// First integer in the reply, if it indexes one of `count` frames.
pub fn parse_selection(reply: &str, count: usize) -> Option<usize> {
    let digits: String = reply
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse::<usize>().ok().filter(|i| *i < count)
}

fn frame_label(index: usize) -> String {
    format!("[Image {}]", index)
}

async fn encode_frame(path: &Path) -> Result<String, CollaboratorError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        CollaboratorError::ImageExtraction(format!("cannot read frame {}: {}", path.display(), e))
    })?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .expect("Failed to create HTTP client")
}

async fn read_error(response: reqwest::Response) -> CollaboratorError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    CollaboratorError::ImageExtraction(format!(
        "API error: {} - {}",
        status.as_u16(),
        api_error_message(body)
    ))
}

/// Build the selector named by `images.selector`.
pub fn build_image_selector(config: &Config) -> Option<Arc<dyn ImageSelector>> {
    match config.images.selector {
        ImageSelectorKind::None => None,
        ImageSelectorKind::OpenAi => Some(Arc::new(OpenAiImageSelector::new(config.llm.clone()))),
        ImageSelectorKind::Gemini => {
            Some(Arc::new(GeminiImageSelector::new(config.gemini.clone())))
        }
    }
}

// ============================================================================
// OpenAI
// ============================================================================

/// Frame selection through an OpenAI-compatible chat completions endpoint
/// with image input.
pub struct OpenAiImageSelector {
    client: reqwest::Client,
    config: LlmConfig,
}

impl OpenAiImageSelector {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: http_client(config.timeout_secs),
            config,
        }
    }
}

#[derive(Debug, Serialize)]
struct VisionRequest<'a> {
    model: &'a str,
    messages: Vec<VisionMessage>,
}

#[derive(Debug, Serialize)]
struct VisionMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
    detail: &'static str,
}

#[derive(Debug, Deserialize)]
struct VisionResponse {
    choices: Vec<VisionChoice>,
}

#[derive(Debug, Deserialize)]
struct VisionChoice {
    message: VisionReply,
}

#[derive(Debug, Deserialize)]
struct VisionReply {
    content: Option<String>,
}

/// Frames as low-detail data URLs, each followed by its label, then the prompt.
fn openai_content(encoded: Vec<String>) -> Vec<ContentPart> {
    let count = encoded.len();
    let mut parts = Vec::with_capacity(count * 2 + 1);
    for (i, data) in encoded.into_iter().enumerate() {
        parts.push(ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:image/jpeg;base64,{}", data),
                detail: "low",
            },
        });
        parts.push(ContentPart::Text {
            text: frame_label(i),
        });
    }
    parts.push(ContentPart::Text {
        text: selection_prompt(count),
    });
    parts
}

#[async_trait]
impl ImageSelector for OpenAiImageSelector {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn select(&self, frames: &[PathBuf]) -> Result<Option<usize>, CollaboratorError> {
        let mut encoded = Vec::with_capacity(frames.len());
        for frame in frames {
            encoded.push(encode_frame(frame).await?);
        }

        let request = VisionRequest {
            model: &self.config.model,
            messages: vec![VisionMessage {
                role: "user",
                content: openai_content(encoded),
            }],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url.trim_end_matches('/')))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| CollaboratorError::ImageExtraction(format!("HTTP error: {}", e)))?;

        if !response.status().is_success() {
            return Err(read_error(response).await);
        }

        let reply: VisionResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::ImageExtraction(format!("invalid API response: {}", e)))?;
        let text = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        debug!(reply = %text.trim(), "Frame selection reply");
        Ok(parse_selection(&text, frames.len()))
    }
}

// ============================================================================
// Gemini
// ============================================================================

/// Frame selection through the Gemini `generateContent` API.
pub struct GeminiImageSelector {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiImageSelector {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            client: http_client(config.timeout_secs),
            config,
        }
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Inline { inline_data: InlineData },
    Text { text: String },
}

#[derive(Debug, Serialize, Deserialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

fn gemini_parts(encoded: Vec<String>) -> Vec<GeminiPart> {
    let count = encoded.len();
    let mut parts = Vec::with_capacity(count * 2 + 1);
    for (i, data) in encoded.into_iter().enumerate() {
        parts.push(GeminiPart::Inline {
            inline_data: InlineData {
                mime_type: "image/jpeg".to_string(),
                data,
            },
        });
        parts.push(GeminiPart::Text {
            text: frame_label(i),
        });
    }
    parts.push(GeminiPart::Text {
        text: selection_prompt(count),
    });
    parts
}

/// Text parts of the first candidate, joined.
fn gemini_text(response: GeminiResponse) -> String {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| match part {
                    GeminiPart::Text { text } => Some(text),
                    GeminiPart::Inline { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

#[async_trait]
impl ImageSelector for GeminiImageSelector {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn select(&self, frames: &[PathBuf]) -> Result<Option<usize>, CollaboratorError> {
        let mut encoded = Vec::with_capacity(frames.len());
        for frame in frames {
            encoded.push(encode_frame(frame).await?);
        }

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: gemini_parts(encoded),
            }],
        };

        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| CollaboratorError::ImageExtraction(format!("HTTP error: {}", e)))?;

        if !response.status().is_success() {
            return Err(read_error(response).await);
        }

        let reply: GeminiResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::ImageExtraction(format!("invalid API response: {}", e)))?;
        let text = gemini_text(reply);

        debug!(reply = %text.trim(), "Frame selection reply");
        Ok(parse_selection(&text, frames.len()))
    }
}
