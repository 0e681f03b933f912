//! Request-scoped data types that flow through the extraction pipeline.
//!
//! Nothing here is persisted: a [`SourceDocument`] is built once per upload,
//! the orchestrator turns it into an [`ExtractionResult`], and both are
//! dropped when the request completes.

use serde::Serialize;
use std::sync::Arc;

use crate::classify::DocumentKind;

/// Hint for legacy Word 97-2003 binaries, which no tier can read.
pub const HINT_LEGACY_DOC: &str =
    "Legacy .doc (Word 97-2003) files cannot be read; please convert the file to .docx and upload again.";

/// Hint attached to any failure that has no more specific guidance.
pub const HINT_NO_TEXT: &str = "No text could be extracted. Please upload DOCX/TXT or a text-based PDF; scanned documents go through OCR and need to be sufficiently clear.";

/// An uploaded file.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub filename: String,
    pub declared_mime_type: String,
    /// Shared so blocking extractor tasks can hold it without copying.
    pub bytes: Arc<[u8]>,
}

impl SourceDocument {
    pub fn new(
        filename: impl Into<String>,
        declared_mime_type: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            declared_mime_type: declared_mime_type.into(),
            bytes: bytes.into(),
        }
    }
}

/// Named extraction strategies, in the order the orchestrator may try them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    PlainText,
    Rtf,
    Docx,
    PdfWhole,
    PdfPages,
    PdfOcr,
    ImageOcr,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::PlainText => "plain_text",
            Strategy::Rtf => "rtf",
            Strategy::Docx => "docx",
            Strategy::PdfWhole => "pdf_whole",
            Strategy::PdfPages => "pdf_pages",
            Strategy::PdfOcr => "pdf_ocr",
            Strategy::ImageOcr => "image_ocr",
        }
    }

    pub fn uses_ocr(&self) -> bool {
        matches!(self, Strategy::PdfOcr | Strategy::ImageOcr)
    }
}

/// One extractor invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionAttempt {
    pub strategy: Strategy,
    pub result_text: String,
    pub used_ocr: bool,
}

impl ExtractionAttempt {
    pub fn new(strategy: Strategy, result_text: String) -> Self {
        Self {
            strategy,
            used_ocr: strategy.uses_ocr(),
            result_text,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.result_text.trim().is_empty()
    }
}

/// Diagnostic metadata returned with a successful extraction.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionMeta {
    pub filename: String,
    pub mime_type: String,
    pub kind: DocumentKind,
    /// Length of `text` in Unicode scalar values.
    pub length: usize,
    pub used_ocr: bool,
}

/// Final orchestrator output.
///
/// On success `text` is non-empty and `hint` is `None`. On failure `text`
/// is empty and `hint` always carries user guidance.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub text: String,
    pub meta: ExtractionMeta,
    pub hint: Option<String>,
    /// Every tier that ran, in order.
    pub attempts: Vec<ExtractionAttempt>,
}

impl ExtractionResult {
    pub fn is_success(&self) -> bool {
        !self.text.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ocr_strategies_mark_attempts() {
        assert!(ExtractionAttempt::new(Strategy::PdfOcr, "x".into()).used_ocr);
        assert!(ExtractionAttempt::new(Strategy::ImageOcr, "x".into()).used_ocr);
        assert!(!ExtractionAttempt::new(Strategy::PdfWhole, "x".into()).used_ocr);
    }

    #[test]
    fn whitespace_only_attempt_is_empty() {
        assert!(ExtractionAttempt::new(Strategy::PlainText, " \n\t".into()).is_empty());
        assert!(!ExtractionAttempt::new(Strategy::PlainText, " a ".into()).is_empty());
    }
}
