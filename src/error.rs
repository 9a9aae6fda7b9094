//! Error type for the OCR endpoint.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::ocr::ProviderKind;

const FALLBACK_MESSAGE: &str = "Failed to process PDF";

const MB: usize = 1024 * 1024;

/// Whole megabytes as `50MB`, anything else as a byte count.
fn format_limit(limit: &usize) -> String {
    if *limit >= MB && limit % MB == 0 {
        format!("{}MB", limit / MB)
    } else {
        format!("{}-byte", limit)
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("No file provided")]
    NoFile,

    #[error("Only PDF files are supported")]
    NotPdf,

    #[error("Invalid form data: {0}")]
    Multipart(String),

    #[error("File exceeds the {} limit", format_limit(.limit))]
    FileTooLarge { limit: usize },

    #[error("{} is not set", .0.api_key_var())]
    ProviderNotConfigured(ProviderKind),

    #[error("{0:#}")]
    Processing(anyhow::Error),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NoFile | Self::NotPdf | Self::Multipart(_) => StatusCode::BAD_REQUEST,
            Self::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::ProviderNotConfigured(_) | Self::Processing(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn message(&self) -> String {
        let message = self.to_string();
        if message.trim().is_empty() {
            FALLBACK_MESSAGE.to_string()
        } else {
            message
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("OCR request failed: {:#}", self);
        }
        (status, Json(ErrorResponse { error: self.message() })).into_response()
    }
}
