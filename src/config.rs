//! Server configuration.
//!
//! Read from environment variables (a `.env` file is loaded at startup).
//! API keys are optional: a provider without a key is not registered.

use std::net::SocketAddr;

use anyhow::{Context, Result};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub const DEFAULT_MISTRAL_BASE_URL: &str = "https://api.mistral.ai";
pub const DEFAULT_MISTRAL_MODEL: &str = "mistral-ocr-latest";

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4.1";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub max_upload_bytes: usize,
    pub mistral: ProviderConfig,
    pub openai: ProviderConfig,
}

/// Connection settings for one OCR backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = get("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .context("BIND_ADDR is not a valid socket address")?;

        let max_upload_bytes = match get("MAX_UPLOAD_BYTES") {
            Some(v) => v
                .parse::<usize>()
                .with_context(|| format!("MAX_UPLOAD_BYTES is not a valid byte count: {}", v))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let provider = |prefix: &str, base_url: &str, model_var: &str, model: &str| ProviderConfig {
            api_key: get(format!("{}_API_KEY", prefix).as_str()),
            base_url: get(format!("{}_BASE_URL", prefix).as_str())
                .unwrap_or_else(|| base_url.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: get(model_var).unwrap_or_else(|| model.to_string()),
        };

        Ok(Self {
            bind_addr,
            max_upload_bytes,
            mistral: provider(
                "MISTRAL",
                DEFAULT_MISTRAL_BASE_URL,
                "MISTRAL_OCR_MODEL",
                DEFAULT_MISTRAL_MODEL,
            ),
            openai: provider(
                "OPENAI",
                DEFAULT_OPENAI_BASE_URL,
                "OPENAI_MODEL",
                DEFAULT_OPENAI_MODEL,
            ),
        })
    }
}
