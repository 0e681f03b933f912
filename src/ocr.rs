//! OCR engine contract and the language-fallback protocol.
//!
//! Recognition is behind the [`OcrEngine`] trait so the pipeline can be
//! driven by the system Tesseract binary in production ([`TesseractCli`])
//! and by scripted fakes in tests.
//!
//! # Language fallback
//!
//! [`recognize_with_fallback`] walks an ordered list of language specs
//! (default `["chi_sim+eng", "eng"]`). The next spec is tried only when the
//! previous call failed outright; a successful call with poor or empty
//! output ends the walk. Each spec is tried at most once.

use async_trait::async_trait;
use tracing::debug;

use crate::config::OcrConfig;
use crate::error::{ExtractError, OcrError};

/// A text recognizer over encoded image bytes (PNG, JPEG).
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognizes text using the given language spec (`"eng"`,
    /// `"chi_sim+eng"`, ...).
    async fn recognize(&self, image: &[u8], languages: &str) -> Result<String, OcrError>;
}

/// Runs `tesseract <image> stdout -l <languages>`.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    cmd: String,
}

impl TesseractCli {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }

    pub fn from_config(config: &OcrConfig) -> Self {
        Self::new(config.tesseract_cmd.clone())
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

#[async_trait]
impl OcrEngine for TesseractCli {
    async fn recognize(&self, image: &[u8], languages: &str) -> Result<String, OcrError> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("input");
        tokio::fs::write(&input, image).await?;

        let output = tokio::process::Command::new(&self.cmd)
            .arg(&input)
            .arg("stdout")
            .arg("-l")
            .arg(languages)
            .output()
            .await
            .map_err(|source| OcrError::Spawn {
                cmd: self.cmd.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(OcrError::Failed {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Tries each language spec in order until one call succeeds, returning its
/// trimmed output. When every call fails, the last error is returned.
pub async fn recognize_with_fallback(
    engine: &dyn OcrEngine,
    image: &[u8],
    languages: &[String],
) -> Result<String, OcrError> {
    let mut last_err = OcrError::NoLanguages;
    for spec in languages {
        match engine.recognize(image, spec).await {
            Ok(text) => return Ok(text.trim().to_string()),
            Err(e) => {
                debug!(languages = %spec, error = %e, "OCR attempt failed");
                last_err = e;
            }
        }
    }
    Err(last_err)
}

/// OCR over an uploaded image file. The bytes go to the engine as-is.
pub async fn extract_image(
    engine: &dyn OcrEngine,
    bytes: &[u8],
    languages: &[String],
) -> Result<String, ExtractError> {
    Ok(recognize_with_fallback(engine, bytes, languages).await?)
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedOcr;
    use super::*;

    fn default_languages() -> Vec<String> {
        vec!["chi_sim+eng".to_string(), "eng".to_string()]
    }

    #[tokio::test]
    async fn first_language_success_makes_one_call() {
        let engine = ScriptedOcr::replying("  Jane Doe \n");
        let text = recognize_with_fallback(&engine, b"png", &default_languages())
            .await
            .unwrap();
        assert_eq!(text, "Jane Doe");
        assert_eq!(engine.calls(), vec!["chi_sim+eng"]);
    }

    #[tokio::test]
    async fn failure_retries_once_with_english() {
        let engine = ScriptedOcr::replying("Jane Doe").failing_on("chi_sim+eng");
        let text = recognize_with_fallback(&engine, b"png", &default_languages())
            .await
            .unwrap();
        assert_eq!(text, "Jane Doe");
        assert_eq!(engine.calls(), vec!["chi_sim+eng", "eng"]);
    }

    #[tokio::test]
    async fn both_failures_stop_after_two_calls() {
        let engine = ScriptedOcr::replying("unused")
            .failing_on("chi_sim+eng")
            .failing_on("eng");
        let err = recognize_with_fallback(&engine, b"png", &default_languages())
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::Failed { .. }));
        assert_eq!(engine.calls().len(), 2);
    }

    #[tokio::test]
    async fn empty_output_does_not_trigger_fallback() {
        let engine = ScriptedOcr::replying("   ");
        let text = recognize_with_fallback(&engine, b"png", &default_languages())
            .await
            .unwrap();
        assert_eq!(text, "");
        assert_eq!(engine.calls().len(), 1);
    }

    #[tokio::test]
    async fn no_languages_is_an_error() {
        let engine = ScriptedOcr::replying("x");
        let err = recognize_with_fallback(&engine, b"png", &[]).await.unwrap_err();
        assert!(matches!(err, OcrError::NoLanguages));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn extract_image_wraps_ocr_errors() {
        let engine = ScriptedOcr::replying("x").failing_on("eng");
        let err = extract_image(&engine, b"jpg", &["eng".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Ocr(_)));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let engine = TesseractCli::new("/nonexistent/parsedoc-tesseract");
        let err = engine.recognize(b"png", "eng").await.unwrap_err();
        assert!(matches!(err, OcrError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cli_passes_image_and_languages() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-tesseract");
        std::fs::write(
            &script,
            "#!/bin/sh\nif [ \"$4\" = \"bad\" ]; then echo 'no model' >&2; exit 1; fi\necho \"$2 $3 $4 $(cat \"$1\")\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let engine = TesseractCli::new(script.to_string_lossy());
        let out = engine.recognize(b"pixels", "chi_sim+eng").await.unwrap();
        assert_eq!(out.trim(), "stdout -l chi_sim+eng pixels");

        let err = engine.recognize(b"pixels", "bad").await.unwrap_err();
        match err {
            OcrError::Failed { status, stderr } => {
                assert_eq!(status, 1);
                assert_eq!(stderr, "no model");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
