//! OpenAI provider: sends the PDF as a file input to a multimodal model via
//! the Responses API and asks for a clean markdown transcription.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{OcrInput, OcrProvider, OcrResult, ProviderKind};
use crate::config::ProviderConfig;

/// Rough characters-per-page used when the backend reports no page count.
pub const CHARS_PER_PAGE: usize = 3000;

const EXTRACTION_PROMPT: &str = "Extract all text content from this PDF document and convert it \
to clean, well-structured markdown. Preserve headings, lists, tables and paragraph structure. \
Do not describe images. Output only the markdown content, with no commentary, preamble or \
code fences.";

#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiProvider {
    /// Returns `None` when no API key is configured.
    pub fn from_config(config: &ProviderConfig, client: Client) -> Option<Self> {
        let api_key = config.api_key.clone()?;
        Some(Self {
            client,
            api_key,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
        })
    }

    async fn send_request(&self, request: ResponsesRequest) -> Result<ResponsesResponse> {
        debug!("Sending request to OpenAI: model={}", request.model);

        let response = self
            .client
            .post(format!("{}/v1/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to OpenAI")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error ({}): {}", status, error_text);
        }

        let response: ResponsesResponse = response
            .json()
            .await
            .context("Failed to parse OpenAI response")?;

        if let Some(usage) = &response.usage {
            info!(
                "OpenAI response: {} tokens (input: {}, output: {})",
                usage.total_tokens, usage.input_tokens, usage.output_tokens
            );
        }

        Ok(response)
    }
}

#[async_trait::async_trait]
impl OcrProvider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn process(&self, input: &OcrInput) -> Result<OcrResult> {
        info!(
            "OpenAiProvider: extracting {} ({} bytes)",
            input.filename,
            input.data.len()
        );

        let request = ResponsesRequest {
            model: self.model.clone(),
            input: vec![InputMessage {
                role: "user",
                content: vec![
                    InputContent::InputFile {
                        filename: input.filename.clone(),
                        file_data: input.data_url(),
                    },
                    InputContent::InputText {
                        text: EXTRACTION_PROMPT.to_string(),
                    },
                ],
            }],
        };

        let response = self.send_request(request).await?;
        let text = response.output_text();
        let page_count = estimate_page_count(&text);

        Ok(OcrResult { text, page_count })
    }
}

/// `max(1, ceil(chars / 3000))`.
pub fn estimate_page_count(text: &str) -> u32 {
    let chars = text.chars().count();
    chars.div_ceil(CHARS_PER_PAGE).max(1) as u32
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
struct ResponsesRequest {
    model: String,
    input: Vec<InputMessage>,
}

#[derive(Debug, Serialize)]
struct InputMessage {
    role: &'static str,
    content: Vec<InputContent>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InputContent {
    InputFile { filename: String, file_data: String },
    InputText { text: String },
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    usage: Option<Usage>,
}

impl ResponsesResponse {
    /// Concatenate every `output_text` part of every `message` item, in order.
    fn output_text(&self) -> String {
        self.output
            .iter()
            .filter(|item| item.kind == "message")
            .flat_map(|item| item.content.iter())
            .filter(|part| part.kind == "output_text")
            .filter_map(|part| part.text.as_deref())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Debug, Deserialize)]
struct OutputContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
    total_tokens: u32,
}
