use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::pdf_ocr::OcrLimits;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}
fn default_max_body_bytes() -> usize {
    25 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    #[serde(default = "default_text_page_cap")]
    pub text_page_cap: usize,
    #[serde(default = "default_ocr_page_cap")]
    pub ocr_page_cap: usize,
    /// Soft deadline for the OCR page loop; 0 disables it.
    #[serde(default = "default_ocr_deadline_secs")]
    pub ocr_deadline_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            text_page_cap: default_text_page_cap(),
            ocr_page_cap: default_ocr_page_cap(),
            ocr_deadline_secs: default_ocr_deadline_secs(),
        }
    }
}

impl LimitsConfig {
    pub fn ocr_limits(&self) -> OcrLimits {
        OcrLimits {
            page_cap: self.ocr_page_cap,
            deadline: (self.ocr_deadline_secs > 0)
                .then(|| Duration::from_secs(self.ocr_deadline_secs)),
        }
    }
}

fn default_text_page_cap() -> usize {
    30
}
fn default_ocr_page_cap() -> usize {
    10
}
fn default_ocr_deadline_secs() -> u64 {
    25
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    #[serde(default = "default_tesseract_cmd")]
    pub tesseract_cmd: String,
    /// Language specs in the order they are attempted.
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_cmd: default_tesseract_cmd(),
            languages: default_languages(),
        }
    }
}

fn default_tesseract_cmd() -> String {
    "tesseract".to_string()
}
fn default_languages() -> Vec<String> {
    vec!["chi_sim+eng".to_string(), "eng".to_string()]
}

impl Config {
    /// All defaults; used when no config file exists.
    pub fn minimal() -> Self {
        Self {
            server: ServerConfig::default(),
            limits: LimitsConfig::default(),
            ocr: OcrConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }
    if config.server.max_body_bytes == 0 {
        anyhow::bail!("server.max_body_bytes must be > 0");
    }

    if config.limits.text_page_cap == 0 {
        anyhow::bail!("limits.text_page_cap must be > 0");
    }
    if config.limits.ocr_page_cap == 0 {
        anyhow::bail!("limits.ocr_page_cap must be > 0");
    }

    if config.ocr.languages.is_empty() {
        anyhow::bail!("ocr.languages must list at least one language spec");
    }
    if let Some(i) = config.ocr.languages.iter().position(|l| l.trim().is_empty()) {
        anyhow::bail!("ocr.languages[{}] must not be blank", i);
    }
    if config.ocr.tesseract_cmd.trim().is_empty() {
        anyhow::bail!("ocr.tesseract_cmd must not be empty");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(content: &str) -> (TempDir, std::path::PathBuf) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("parsedoc.toml");
        fs::write(&path, content).unwrap();
        (tmp, path)
    }

    #[test]
    fn empty_file_uses_defaults() {
        let (_tmp, path) = write_config("");
        let config = load_config(&path).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8787");
        assert_eq!(config.limits.text_page_cap, 30);
        assert_eq!(config.limits.ocr_page_cap, 10);
        assert_eq!(config.limits.ocr_deadline_secs, 25);
        assert_eq!(config.ocr.languages, vec!["chi_sim+eng", "eng"]);
    }

    #[test]
    fn overrides_are_read() {
        let (_tmp, path) = write_config(
            r#"
[server]
bind = "0.0.0.0:9000"

[limits]
ocr_page_cap = 3
ocr_deadline_secs = 0

[ocr]
tesseract_cmd = "/usr/local/bin/tesseract"
languages = ["eng"]
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.server.max_body_bytes, 25 * 1024 * 1024);
        assert_eq!(config.limits.text_page_cap, 30);
        assert_eq!(config.ocr.tesseract_cmd, "/usr/local/bin/tesseract");

        let limits = config.limits.ocr_limits();
        assert_eq!(limits.page_cap, 3);
        assert!(limits.deadline.is_none());
    }

    #[test]
    fn default_deadline_is_enabled() {
        let limits = Config::minimal().limits.ocr_limits();
        assert_eq!(limits.deadline, Some(Duration::from_secs(25)));
    }

    #[test]
    fn rejects_zero_caps() {
        let (_tmp, path) = write_config("[limits]\nocr_page_cap = 0\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("ocr_page_cap"));

        let (_tmp, path) = write_config("[limits]\ntext_page_cap = 0\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn rejects_empty_or_blank_languages() {
        let (_tmp, path) = write_config("[ocr]\nlanguages = []\n");
        assert!(load_config(&path).is_err());

        let (_tmp, path) = write_config("[ocr]\nlanguages = [\"eng\", \" \"]\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("languages[1]"));
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let (_tmp, path) = write_config("[server\nbind = ");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_config(Path::new("/nonexistent/parsedoc.toml")).is_err());
    }
}
