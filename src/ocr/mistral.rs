//! Mistral OCR provider (uses Mistral's OCR API).

use super::{OcrInput, OcrProvider, OcrResult, ProviderKind};
use crate::config::ProviderConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub struct MistralOcrProvider {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl MistralOcrProvider {
    /// Returns `None` when no API key is configured.
    pub fn from_config(config: &ProviderConfig, client: reqwest::Client) -> Option<Self> {
        let api_key = config.api_key.clone()?;
        Some(Self {
            api_key,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            client,
        })
    }
}

// ── Mistral API request/response types ──────────────────────────────────────

#[derive(Serialize)]
struct OcrRequest {
    model: String,
    document: DocumentSource,
    include_image_base64: bool,
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum DocumentSource {
    #[serde(rename = "document_url")]
    Url { document_url: String },
}

#[derive(Deserialize)]
struct OcrResponse {
    pages: Vec<MistralPage>,
}

#[derive(Deserialize)]
struct MistralPage {
    #[serde(default)]
    index: u32,
    markdown: String,
}

// ── Provider implementation ─────────────────────────────────────────────────

#[async_trait::async_trait]
impl OcrProvider for MistralOcrProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Mistral
    }

    async fn process(&self, input: &OcrInput) -> anyhow::Result<OcrResult> {
        let body = OcrRequest {
            model: self.model.clone(),
            document: DocumentSource::Url {
                document_url: input.data_url(),
            },
            include_image_base64: false,
        };

        info!(
            "MistralOcrProvider: calling OCR API for {} ({} bytes)",
            input.filename,
            input.data.len()
        );

        let resp = self
            .client
            .post(format!("{}/v1/ocr", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to send request to Mistral OCR API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Mistral OCR API error ({}): {}", status, text);
        }

        let raw_text = resp.text().await?;
        debug!(
            "MistralOcrProvider: raw response ({} bytes)",
            raw_text.len()
        );
        parse_response(&raw_text)
    }
}

fn parse_response(raw: &str) -> anyhow::Result<OcrResult> {
    let mut ocr: OcrResponse =
        serde_json::from_str(raw).context("Failed to parse Mistral OCR response")?;
    ocr.pages.sort_by_key(|p| p.index);

    let pages: Vec<String> = ocr.pages.into_iter().map(|p| p.markdown).collect();
    Ok(OcrResult {
        text: join_pages(&pages),
        page_count: pages.len() as u32,
    })
}

/// Concatenate per-page markdown; every page after the first is introduced
/// by a rule and a `## Page N` heading (1-indexed).
pub fn join_pages<S: AsRef<str>>(pages: &[S]) -> String {
    let mut out = String::new();
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            out.push_str(&format!("\n\n---\n\n## Page {}\n\n", i + 1));
        }
        out.push_str(page.as_ref());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::spawn_stub;
    use axum::{
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use serde_json::{json, Value};

    fn provider_at(base_url: &str) -> MistralOcrProvider {
        let config = ProviderConfig {
            api_key: Some("test-key".to_string()),
            base_url: base_url.to_string(),
            model: "mistral-ocr-latest".to_string(),
        };
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        MistralOcrProvider::from_config(&config, client).unwrap()
    }

    fn sample_input() -> OcrInput {
        OcrInput {
            filename: "doc.pdf".to_string(),
            data: b"%PDF".to_vec(),
        }
    }

    /// Answers with the posted document URL as the first page and the model
    /// name as the second, listed out of order.
    async fn echo_ocr(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        let auth = headers.get("authorization").and_then(|v| v.to_str().ok());
        if auth != Some("Bearer test-key") {
            return (StatusCode::UNAUTHORIZED, Json(json!({"detail": "Unauthorized"})));
        }
        let document_url = body["document"]["document_url"].as_str().unwrap_or_default();
        let model = body["model"].as_str().unwrap_or_default();
        (
            StatusCode::OK,
            Json(json!({
                "pages": [
                    {"index": 1, "markdown": format!("model={}", model)},
                    {"index": 0, "markdown": document_url}
                ]
            })),
        )
    }

    #[tokio::test]
    async fn test_process_posts_data_url() {
        let base = spawn_stub(Router::new().route("/v1/ocr", post(echo_ocr))).await;
        let result = provider_at(&base).process(&sample_input()).await.unwrap();

        assert_eq!(result.page_count, 2);
        assert_eq!(
            result.text,
            "data:application/pdf;base64,JVBERg==\n\n---\n\n## Page 2\n\nmodel=mistral-ocr-latest"
        );
    }

    #[tokio::test]
    async fn test_process_error_status() {
        let router = Router::new().route(
            "/v1/ocr",
            post(|| async { (StatusCode::UNAUTHORIZED, "bad key") }),
        );
        let base = spawn_stub(router).await;
        let err = provider_at(&base).process(&sample_input()).await.unwrap_err();

        assert_eq!(err.to_string(), "Mistral OCR API error (401 Unauthorized): bad key");
    }

    #[tokio::test]
    async fn test_process_malformed_body() {
        let base = spawn_stub(Router::new().route("/v1/ocr", post(|| async { "not json" }))).await;
        let err = provider_at(&base).process(&sample_input()).await.unwrap_err();

        assert_eq!(err.to_string(), "Failed to parse Mistral OCR response");
    }

    #[tokio::test]
    async fn test_process_connection_failure() {
        let err = provider_at("http://127.0.0.1:1")
            .process(&sample_input())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Failed to send request to Mistral OCR API");
    }

    #[test]
    fn test_join_three_pages() {
        let text = join_pages(&["A", "B", "C"]);
        assert_eq!(text.matches("## Page").count(), 2);
        assert!(!text.contains("## Page 1"));
        assert!(text.contains("## Page 2"));
        assert!(text.contains("## Page 3"));
        assert_eq!(text, "A\n\n---\n\n## Page 2\n\nB\n\n---\n\n## Page 3\n\nC");
    }

    #[test]
    fn test_join_single_page_has_no_heading() {
        assert_eq!(join_pages(&["only"]), "only");
        assert_eq!(join_pages::<&str>(&[]), "");
    }

    #[test]
    fn test_parse_response_orders_pages() {
        let raw = r#"{
            "pages": [
                {"index": 1, "markdown": "second", "images": []},
                {"index": 0, "markdown": "first", "images": []}
            ],
            "model": "mistral-ocr-latest"
        }"#;
        let result = parse_response(raw).unwrap();
        assert_eq!(result.page_count, 2);
        assert_eq!(result.text, "first\n\n---\n\n## Page 2\n\nsecond");
    }

    #[test]
    fn test_parse_response_malformed() {
        assert!(parse_response(r#"{"detail": "Unauthorized"}"#).is_err());
        assert!(parse_response("not json").is_err());
    }

    #[test]
    fn test_request_shape() {
        let body = OcrRequest {
            model: "mistral-ocr-latest".to_string(),
            document: DocumentSource::Url {
                document_url: "data:application/pdf;base64,AA==".to_string(),
            },
            include_image_base64: false,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["document"]["type"], "document_url");
        assert_eq!(json["document"]["document_url"], "data:application/pdf;base64,AA==");
        assert_eq!(json["include_image_base64"], false);
    }

    #[test]
    fn test_from_config_requires_key() {
        let mut config = ProviderConfig {
            api_key: None,
            base_url: "https://api.mistral.ai".to_string(),
            model: "mistral-ocr-latest".to_string(),
        };
        assert!(MistralOcrProvider::from_config(&config, reqwest::Client::new()).is_none());
        config.api_key = Some("key".to_string());
        assert!(MistralOcrProvider::from_config(&config, reqwest::Client::new()).is_some());
    }
}
