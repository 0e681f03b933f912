//! HTTP front end for the extraction pipeline.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/parse-doc` | Extract text from a base64-encoded upload |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Any other method on `/api/parse-doc` gets `405`.
//!
//! # Wire contract
//!
//! Request:
//!
//! ```json
//! { "filename": "cv.pdf", "mime": "application/pdf", "dataBase64": "JVBERi0..." }
//! ```
//!
//! Success (`200`):
//!
//! ```json
//! { "text": "...", "meta": { "filename": "cv.pdf", "mime": "application/pdf", "length": 1234, "ocr": false } }
//! ```
//!
//! Failure: `{ "error": "...", "hint": "..." }`. `400` for a malformed
//! request, `422` when no text could be extracted (always with a hint),
//! `413` when the body exceeds `server.max_body_bytes`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser clients can
//! upload directly.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{Config, ServerConfig};
use crate::extract::Extractor;
use crate::models::{ExtractionResult, SourceDocument};

/// Standard alphabet, padding optional, as browser and Node decoders accept.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Clone)]
struct AppState {
    extractor: Arc<Extractor>,
}

/// Starts the HTTP server on `[server].bind` and runs until the process
/// is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let extractor = Arc::new(Extractor::from_config(config));
    let app = router(extractor, &config.server);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    println!("parsedoc listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the application router around an extractor.
pub fn router(extractor: Arc<Extractor>, server: &ServerConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/api/parse-doc",
            post(handle_parse_doc).fallback(handle_method_not_allowed),
        )
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(server.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { extractor })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

struct AppError {
    status: StatusCode,
    error: String,
    hint: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.error,
            hint: self.hint,
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        error: message.into(),
        hint: None,
    }
}

/// Oversized bodies keep their 413; every other malformed body is a 400.
fn rejected(rejection: JsonRejection) -> AppError {
    let status = match rejection.status() {
        StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::BAD_REQUEST,
    };
    AppError {
        status,
        error: rejection.body_text(),
        hint: None,
    }
}

/// 422 for an upload that yielded no text.
fn parse_failed(result: ExtractionResult) -> AppError {
    AppError {
        status: StatusCode::UNPROCESSABLE_ENTITY,
        error: "Failed to parse document".to_string(),
        hint: result.hint,
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/parse-doc ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParseDocRequest {
    filename: String,
    #[serde(default)]
    mime: Option<String>,
    #[serde(default)]
    data_base64: Option<String>,
}

#[derive(Serialize)]
struct ParseDocResponse {
    text: String,
    meta: ParseDocMeta,
}

#[derive(Serialize)]
struct ParseDocMeta {
    filename: String,
    mime: String,
    length: usize,
    ocr: bool,
}

async fn handle_parse_doc(
    State(state): State<AppState>,
    payload: Result<Json<ParseDocRequest>, JsonRejection>,
) -> Result<Json<ParseDocResponse>, AppError> {
    let Json(req) = payload.map_err(rejected)?;

    let data = req.data_base64.unwrap_or_default();
    if data.trim().is_empty() {
        return Err(bad_request("dataBase64 must not be empty"));
    }
    let bytes =
        decode_base64(&data).map_err(|e| bad_request(format!("dataBase64 is not valid base64: {e}")))?;

    let doc = SourceDocument::new(req.filename, req.mime.unwrap_or_default(), bytes);
    let result = state.extractor.extract(&doc).await;
    if !result.is_success() {
        return Err(parse_failed(result));
    }

    Ok(Json(ParseDocResponse {
        meta: ParseDocMeta {
            filename: result.meta.filename,
            mime: result.meta.mime_type,
            length: result.meta.length,
            ocr: result.meta.used_ocr,
        },
        text: result.text,
    }))
}

async fn handle_method_not_allowed() -> AppError {
    AppError {
        status: StatusCode::METHOD_NOT_ALLOWED,
        error: "Method Not Allowed".to_string(),
        hint: None,
    }
}

/// Decodes base64, tolerating a `data:<mime>;base64,` prefix, embedded
/// whitespace, and missing padding.
fn decode_base64(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let payload = match input.split_once(";base64,") {
        Some((prefix, rest)) if prefix.trim_start().starts_with("data:") => rest,
        _ => input,
    };
    let cleaned: String = payload
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    LENIENT_BASE64.decode(cleaned)
}
