//! PDF to llms.txt - uploads a PDF to an OCR provider and returns
//! LLM-ready markdown.

mod config;
mod error;
mod normalize;
mod ocr;

use std::sync::Arc;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use config::ServerConfig;
use error::AppError;
use ocr::{
    mistral::MistralOcrProvider, openai::OpenAiProvider, OcrInput, OcrProvider, OcrProviders,
    ProviderKind,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, warn, Instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Headroom for multipart boundaries and the other form fields.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    providers: OcrProviders,
    max_upload_bytes: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "pdf_llms_txt=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    let providers = build_providers(&config);

    let state = AppState {
        providers,
        max_upload_bytes: config.max_upload_bytes,
    };

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("Server listening on http://{}", config.bind_addr);
    axum::serve(listener, app(state)).await?;

    Ok(())
}

fn build_providers(config: &ServerConfig) -> OcrProviders {
    let client = reqwest::Client::new();
    let mut providers = OcrProviders::new();

    match MistralOcrProvider::from_config(&config.mistral, client.clone()) {
        Some(p) => {
            info!("Mistral OCR provider initialized (model: {})", config.mistral.model);
            providers = providers.with(Arc::new(p));
        }
        None => warn!("MISTRAL_API_KEY not set; mistral provider disabled"),
    }

    match OpenAiProvider::from_config(&config.openai, client) {
        Some(p) => {
            info!("OpenAI provider initialized (model: {})", config.openai.model);
            providers = providers.with(Arc::new(p));
        }
        None => warn!("OPENAI_API_KEY not set; openai provider disabled"),
    }

    providers
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/providers", get(list_providers))
        .route("/api/ocr", post(ocr_document))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes + MULTIPART_OVERHEAD))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

#[derive(Serialize)]
struct ProviderInfo {
    id: ProviderKind,
    configured: bool,
}

#[derive(Serialize)]
struct ProvidersResponse {
    default: ProviderKind,
    providers: Vec<ProviderInfo>,
}

/// List the selectable providers and whether each has credentials.
async fn list_providers(State(state): State<AppState>) -> Json<ProvidersResponse> {
    Json(ProvidersResponse {
        default: ProviderKind::default(),
        providers: ProviderKind::ALL
            .iter()
            .map(|&id| ProviderInfo {
                id,
                configured: state.providers.is_configured(id),
            })
            .collect(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OcrResponse {
    text: String,
    page_count: u32,
    filename: String,
    provider: ProviderKind,
}

/// Upload a PDF and return its normalized markdown.
async fn ocr_document(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<OcrResponse>, AppError> {
    let multipart = multipart.map_err(|e| AppError::Multipart(e.body_text()))?;
    let span = info_span!("ocr", request_id = %Uuid::new_v4());
    process_upload(&state, multipart).instrument(span).await.map(Json)
}

/// The uploaded `file` part.
struct UploadedFile {
    filename: String,
    content_type: Option<String>,
    data: Vec<u8>,
}

async fn process_upload(state: &AppState, mut multipart: Multipart) -> Result<OcrResponse, AppError> {
    let limit = state.max_upload_bytes;
    let mut file: Option<UploadedFile> = None;
    let mut provider_field: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") if file.is_none() => {
                let filename = field.file_name().unwrap_or("document.pdf").to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
                file = Some(UploadedFile {
                    filename,
                    content_type,
                    data: data.to_vec(),
                });
            }
            Some("provider") => {
                provider_field = Some(field.text().await.map_err(|e| multipart_error(e, limit))?);
            }
            _ => {}
        }
    }

    let file = file.ok_or(AppError::NoFile)?;
    if !is_pdf(file.content_type.as_deref()) {
        return Err(AppError::NotPdf);
    }
    if file.data.len() > limit {
        return Err(AppError::FileTooLarge { limit });
    }

    let requested = provider_field.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let kind = ProviderKind::parse_or_default(requested);
    if let Some(value) = requested {
        if ProviderKind::parse(value).is_none() {
            warn!("Unknown provider '{}', using {}", value, kind);
        }
    }

    info!(
        "Received file: {} ({} bytes) with provider: {}",
        file.filename,
        file.data.len(),
        kind
    );

    let provider = state
        .providers
        .get(kind)
        .ok_or(AppError::ProviderNotConfigured(kind))?;

    let input = OcrInput {
        filename: file.filename,
        data: file.data,
    };
    let result = run_provider(provider.as_ref(), &input).await?;
    let text = normalize::normalize_markdown(&result.text);

    info!(
        "OCR complete: {} ({} pages, {} chars)",
        input.filename,
        result.page_count,
        text.chars().count()
    );

    Ok(OcrResponse {
        text,
        page_count: result.page_count,
        filename: input.filename,
        provider: kind,
    })
}

async fn run_provider(provider: &dyn OcrProvider, input: &OcrInput) -> Result<ocr::OcrResult, AppError> {
    provider.process(input).await.map_err(AppError::Processing)
}

fn multipart_error(err: MultipartError, limit: usize) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::FileTooLarge { limit }
    } else {
        AppError::Multipart(err.body_text())
    }
}

/// Declared part type must be `application/pdf`; parameters are ignored.
fn is_pdf(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.split(';').next())
        .map(|essence| essence.trim() == "application/pdf")
        .unwrap_or(false)
}
