//! OCR over screenshots of device logs

use apktriage_core::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Extract text from an image file
    async fn extract_text(&self, image_path: &Path) -> Result<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_program")]
    pub program: String,

    /// Tesseract language pack, e.g. `eng`
    #[serde(default)]
    pub language: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_program() -> String {
    "tesseract".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            language: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Runs the Tesseract CLI as `<program> <image> stdout [-l <language>]`
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    config: OcrConfig,
}

impl TesseractOcr {
    pub fn new(config: OcrConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn extract_text(&self, image_path: &Path) -> Result<String> {
        if !image_path.is_file() {
            return Err(Error::ocr(format!(
                "image not found: {}",
                image_path.display()
            )));
        }

        let mut command = Command::new(&self.config.program);
        command.arg(image_path).arg("stdout");
        if let Some(language) = &self.config.language {
            command.arg("-l").arg(language);
        }

        let child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ocr(format!("failed to start {}: {}", self.config.program, e)))?;

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::ocr(format!("OCR timed out after {:?}", timeout)))?
            .map_err(|e| Error::ocr(format!("OCR process failed: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ocr(format!(
                "{} exited with {}: {}",
                self.config.program,
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        tracing::debug!(chars = text.len(), "OCR extraction complete");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(program: &str) -> TesseractOcr {
        TesseractOcr::new(OcrConfig {
            program: program.to_string(),
            language: Some("eng".to_string()),
            timeout_secs: 5,
        })
    }

    fn image() -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"\x89PNG\r\n\x1a\n").unwrap();
        file
    }

    #[tokio::test]
    async fn test_missing_image_is_ocr_error() {
        let err = engine("echo")
            .extract_text(Path::new("/nonexistent/screen.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::OcrExtraction(_)));
    }

    #[tokio::test]
    async fn test_engine_stdout_is_returned() {
        let image = image();
        let text = engine("echo").extract_text(image.path()).await.unwrap();
        assert!(text.contains("stdout -l eng"));
    }

    #[tokio::test]
    async fn test_engine_failure_is_ocr_error() {
        let image = image();
        let err = engine("false").extract_text(image.path()).await.unwrap_err();
        assert!(matches!(err, Error::OcrExtraction(_)));

        let err = engine("no-such-ocr-engine")
            .extract_text(image.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to start"));
    }
}
