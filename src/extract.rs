//! Extraction orchestrator.
//!
//! Classifies an upload, then runs the strategies planned for its kind in
//! order, stopping at the first one that yields non-blank text:
//!
//! | Kind | Strategies |
//! |------|------------|
//! | Txt | plain text |
//! | Rtf | RTF stripper |
//! | Docx | DOCX raw text |
//! | Pdf | whole document → page walk → image OCR |
//! | Image | image OCR |
//! | LegacyDoc, Unknown | none |
//!
//! A failing strategy counts as an empty one. When nothing yields text the
//! result carries a hint instead.

use std::sync::{Arc, OnceLock};

use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::classify::{classify, DocumentKind};
use crate::config::Config;
use crate::docx::extract_docx;
use crate::error::ExtractError;
use crate::models::{
    ExtractionAttempt, ExtractionMeta, ExtractionResult, SourceDocument, Strategy,
    HINT_LEGACY_DOC, HINT_NO_TEXT,
};
use crate::ocr::{extract_image, OcrEngine, TesseractCli};
use crate::pdf::{
    extract_pdf_by_page, extract_pdf_whole, open_document, run_blocking, LopdfBackend, PdfBackend,
    PdfDocument,
};
use crate::pdf_ocr::{extract_pdf_ocr, OcrLimits};
use crate::rtf::strip_rtf;
use crate::text::decode_txt;

/// Tunables for the PDF and OCR tiers.
#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    pub text_page_cap: usize,
    pub ocr_limits: OcrLimits,
    pub languages: Vec<String>,
}

impl ExtractorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            text_page_cap: config.limits.text_page_cap,
            ocr_limits: config.limits.ocr_limits(),
            languages: config.ocr.languages.clone(),
        }
    }
}

/// Runs the extraction pipeline. Holds no per-request state, so one
/// instance serves concurrent requests.
pub struct Extractor {
    pdf: Arc<dyn PdfBackend>,
    ocr: Arc<dyn OcrEngine>,
    settings: ExtractorSettings,
}

/// One upload's PDF, parsed at most once and shared by the page walk and
/// the OCR tier.
struct PdfSession {
    backend: Arc<dyn PdfBackend>,
    bytes: Arc<[u8]>,
    opened: OnceLock<Result<Arc<dyn PdfDocument>, String>>,
}

impl PdfSession {
    fn new(backend: Arc<dyn PdfBackend>, bytes: Arc<[u8]>) -> Self {
        Self {
            backend,
            bytes,
            opened: OnceLock::new(),
        }
    }

    /// The parsed document. A failed parse is remembered and not retried.
    async fn document(&self) -> Result<Arc<dyn PdfDocument>, ExtractError> {
        if let Some(opened) = self.opened.get() {
            return opened.clone().map_err(ExtractError::Pdf);
        }
        let opened = open_document(self.backend.clone(), self.bytes.clone())
            .await
            .map_err(|e| match e {
                ExtractError::Pdf(msg) => msg,
                other => other.to_string(),
            });
        let opened = self.opened.get_or_init(|| opened);
        opened.clone().map_err(ExtractError::Pdf)
    }
}

/// Strategies tried for a document kind, cheapest first.
pub fn plan(kind: DocumentKind) -> &'static [Strategy] {
    match kind {
        DocumentKind::Txt => &[Strategy::PlainText],
        DocumentKind::Pdf => &[Strategy::PdfWhole, Strategy::PdfPages, Strategy::PdfOcr],
        DocumentKind::Docx => &[Strategy::Docx],
        DocumentKind::Rtf => &[Strategy::Rtf],
        DocumentKind::Image => &[Strategy::ImageOcr],
        DocumentKind::LegacyDoc | DocumentKind::Unknown => &[],
    }
}

impl Extractor {
    pub fn new(
        pdf: Arc<dyn PdfBackend>,
        ocr: Arc<dyn OcrEngine>,
        settings: ExtractorSettings,
    ) -> Self {
        Self { pdf, ocr, settings }
    }

    /// lopdf/pdf-extract for PDFs and the configured Tesseract binary.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(LopdfBackend),
            Arc::new(TesseractCli::from_config(&config.ocr)),
            ExtractorSettings::from_config(config),
        )
    }

    pub async fn extract(&self, doc: &SourceDocument) -> ExtractionResult {
        let kind = classify(&doc.filename, &doc.declared_mime_type);
        let span = info_span!(
            "extract",
            request_id = %Uuid::new_v4(),
            filename = %doc.filename,
            kind = %kind,
        );
        self.extract_kind(doc, kind).instrument(span).await
    }

    async fn extract_kind(&self, doc: &SourceDocument, kind: DocumentKind) -> ExtractionResult {
        let mut attempts: Vec<ExtractionAttempt> = Vec::new();
        let pdf = PdfSession::new(self.pdf.clone(), doc.bytes.clone());
        for &strategy in plan(kind) {
            debug!(strategy = strategy.as_str(), "trying");
            let text = match self.run(strategy, &doc.bytes, &pdf).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(strategy = strategy.as_str(), error = %e, "extraction tier failed");
                    String::new()
                }
            };
            let attempt = ExtractionAttempt::new(strategy, text);
            let done = !attempt.is_empty();
            attempts.push(attempt);
            if done {
                break;
            }
        }

        let winner = attempts.last().filter(|a| !a.is_empty());
        let text = winner
            .map(|a| a.result_text.trim().to_string())
            .unwrap_or_default();
        let used_ocr = winner.is_some_and(|a| a.used_ocr);

        let hint = if !text.is_empty() {
            None
        } else if kind == DocumentKind::LegacyDoc {
            Some(HINT_LEGACY_DOC.to_string())
        } else {
            Some(HINT_NO_TEXT.to_string())
        };

        let length = text.chars().count();
        match &hint {
            None => info!(length, used_ocr, attempts = attempts.len(), "extracted"),
            Some(_) => info!(attempts = attempts.len(), "no text extracted"),
        }

        ExtractionResult {
            meta: ExtractionMeta {
                filename: doc.filename.clone(),
                mime_type: doc.declared_mime_type.clone(),
                kind,
                length,
                used_ocr,
            },
            text,
            hint,
            attempts,
        }
    }

    async fn run(
        &self,
        strategy: Strategy,
        bytes: &Arc<[u8]>,
        pdf: &PdfSession,
    ) -> Result<String, ExtractError> {
        let languages = &self.settings.languages;
        match strategy {
            Strategy::PlainText => Ok(decode_txt(bytes)),
            Strategy::Rtf => Ok(strip_rtf(bytes)),
            Strategy::Docx => {
                let bytes = Arc::clone(bytes);
                run_blocking(move || extract_docx(&bytes)).await
            }
            Strategy::PdfWhole => extract_pdf_whole(self.pdf.clone(), bytes.clone()).await,
            Strategy::PdfPages => {
                extract_pdf_by_page(pdf.document().await?, self.settings.text_page_cap).await
            }
            Strategy::PdfOcr => {
                extract_pdf_ocr(
                    pdf.document().await?,
                    self.ocr.as_ref(),
                    languages,
                    &self.settings.ocr_limits,
                )
                .await
            }
            Strategy::ImageOcr => extract_image(self.ocr.as_ref(), bytes, languages).await,
        }
    }
}
