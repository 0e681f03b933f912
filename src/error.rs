//! Error types for the extraction pipeline.
//!
//! Every extractor returns [`ExtractError`] on failure. The orchestrator in
//! [`crate::extract`] downgrades any of them to "this tier produced no text"
//! and moves on, so these never reach the HTTP caller directly.

use thiserror::Error;

/// Failure of a single extraction tier.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),

    #[error("image decoding failed: {0}")]
    Image(String),

    #[error("OCR failed: {0}")]
    Ocr(#[from] OcrError),

    /// A blocking library call panicked or was cancelled.
    #[error("extraction task failed: {0}")]
    TaskFailed(String),
}

impl From<tokio::task::JoinError> for ExtractError {
    fn from(err: tokio::task::JoinError) -> Self {
        ExtractError::TaskFailed(err.to_string())
    }
}

impl From<lopdf::Error> for ExtractError {
    fn from(err: lopdf::Error) -> Self {
        ExtractError::Pdf(err.to_string())
    }
}

/// Failure of one OCR engine invocation.
#[derive(Error, Debug)]
pub enum OcrError {
    #[error("failed to start OCR engine '{cmd}': {source}")]
    Spawn {
        cmd: String,
        #[source]
        source: std::io::Error,
    },

    #[error("OCR engine exited with status {status}: {stderr}")]
    Failed { status: i32, stderr: String },

    #[error("no OCR languages configured")]
    NoLanguages,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
