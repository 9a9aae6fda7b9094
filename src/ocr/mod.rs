//! OCR provider abstraction.
//!
//! Defines the [`OcrProvider`] trait and the unified result type so the
//! Mistral and OpenAI backends can be selected per request by the `provider`
//! form field.

pub mod mistral;
pub mod openai;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Serialize;

/// Unified OCR result returned by every provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrResult {
    /// Markdown text, before normalization.
    pub text: String,
    /// Reported by the provider, or estimated when it has no page notion.
    pub page_count: u32,
}

/// An uploaded PDF handed to a provider.
#[derive(Debug, Clone)]
pub struct OcrInput {
    pub filename: String,
    pub data: Vec<u8>,
}

impl OcrInput {
    /// `data:application/pdf;base64,...` form of the document.
    pub fn data_url(&self) -> String {
        format!("data:application/pdf;base64,{}", BASE64.encode(&self.data))
    }
}

/// Async trait implemented by each OCR backend.
#[async_trait::async_trait]
pub trait OcrProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;
    async fn process(&self, input: &OcrInput) -> anyhow::Result<OcrResult>;
}

/// Known provider identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Mistral,
    OpenAi,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Mistral, ProviderKind::OpenAi];

    /// Parse a form value into a provider kind.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mistral" => Some(Self::Mistral),
            "openai" => Some(Self::OpenAi),
            _ => None,
        }
    }

    /// Parse a form value, falling back to the default provider when the
    /// value is missing or unknown.
    pub fn parse_or_default(s: Option<&str>) -> Self {
        s.and_then(Self::parse).unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mistral => "mistral",
            Self::OpenAi => "openai",
        }
    }

    /// Environment variable holding this provider's API key.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Self::Mistral => "MISTRAL_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry of configured providers, keyed by kind.
#[derive(Clone, Default)]
pub struct OcrProviders {
    providers: HashMap<ProviderKind, Arc<dyn OcrProvider>>,
}

impl OcrProviders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: Arc<dyn OcrProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn OcrProvider>> {
        self.providers.get(&kind).cloned()
    }

    pub fn is_configured(&self, kind: ProviderKind) -> bool {
        self.providers.contains_key(&kind)
    }
}

/// Serves `router` on an ephemeral localhost port and returns its base URL.
#[cfg(test)]
pub(crate) async fn spawn_stub(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provider() {
        assert_eq!(ProviderKind::parse("mistral"), Some(ProviderKind::Mistral));
        assert_eq!(ProviderKind::parse("openai"), Some(ProviderKind::OpenAi));
        assert_eq!(ProviderKind::parse("OpenAI"), None);
    }

    #[test]
    fn test_unknown_provider_falls_back_to_mistral() {
        assert_eq!(ProviderKind::parse_or_default(None), ProviderKind::Mistral);
        assert_eq!(ProviderKind::parse_or_default(Some("tesseract")), ProviderKind::Mistral);
        assert_eq!(ProviderKind::parse_or_default(Some("openai")), ProviderKind::OpenAi);
    }

    #[test]
    fn test_data_url() {
        let input = OcrInput {
            filename: "a.pdf".to_string(),
            data: b"%PDF".to_vec(),
        };
        assert_eq!(input.data_url(), "data:application/pdf;base64,JVBERg==");
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ProviderKind::OpenAi).unwrap(), "\"openai\"");
    }
}
