//! Local OCR through the `tesseract` command-line tool.

use super::{clean::clean_text, render::render_pdf};
use crate::components::OcrExtractor;
use crate::config::PipelineConfig;
use crate::document::Document;
use crate::error::OcrError;
use crate::resolver::ContentKind;
use async_trait::async_trait;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

/// Runs `tesseract <image> stdout -l <lang>` once per image or PDF page.
#[derive(Debug, Clone)]
pub struct TesseractOcrExtractor {
    binary: PathBuf,
    language: String,
    dpi: u32,
    max_rendered_pixels: u32,
    password: Option<String>,
    timeout_secs: u64,
}

impl TesseractOcrExtractor {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
            language: config.tesseract_language.clone(),
            dpi: config.dpi,
            max_rendered_pixels: config.max_rendered_pixels,
            password: config.password.clone(),
            timeout_secs: config.api_timeout_secs,
        }
    }

    /// Use a specific executable instead of `tesseract` from `PATH`.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Whether the binary can be executed at all.
    pub async fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn run_on(&self, image_path: &Path) -> Result<String, OcrError> {
        let mut command = Command::new(&self.binary);
        command
            .arg(image_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .kill_on_drop(true);

        let output = match timeout(Duration::from_secs(self.timeout_secs), command.output()).await {
            Err(_) => return Err(OcrError::Timeout { secs: self.timeout_secs }),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OcrError::Config(format!(
                    "tesseract binary '{}' not found",
                    self.binary.display()
                )))
            }
            Ok(Err(e)) => return Err(OcrError::Service(format!("failed to run tesseract: {e}"))),
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Service(format!("tesseract failed: {}", stderr.trim())));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl OcrExtractor for TesseractOcrExtractor {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn extract_text(&self, doc: &Document) -> Result<String, OcrError> {
        let content = doc.content().ok_or_else(|| {
            OcrError::MissingFile(format!("content of '{}' was not loaded", doc.source_locator()))
        })?;

        let scratch = TempDir::new()
            .map_err(|e| OcrError::Service(format!("failed to create temp dir: {e}")))?;

        let inputs: Vec<PathBuf> = match content.kind {
            ContentKind::Text => {
                let text = clean_text(&String::from_utf8_lossy(&content.bytes));
                return if text.is_empty() { Err(OcrError::EmptyResult) } else { Ok(text) };
            }
            ContentKind::Image => {
                let ext = content
                    .image_format()
                    .and_then(|f| f.extensions_str().first().copied())
                    .unwrap_or("img");
                let path = scratch.path().join(format!("scan.{ext}"));
                write_scratch(&path, &content.bytes).await?;
                vec![path]
            }
            ContentKind::Pdf => {
                let pages = render_pdf(
                    content.bytes.clone(),
                    self.dpi,
                    self.max_rendered_pixels,
                    self.password.clone(),
                )
                .await?;
                let mut paths = Vec::with_capacity(pages.len());
                for (idx, page) in pages.iter().enumerate() {
                    let path = scratch.path().join(format!("page-{:04}.png", idx + 1));
                    page.save_with_format(&path, ImageFormat::Png)
                        .map_err(|e| OcrError::Service(format!("failed to write page image: {e}")))?;
                    paths.push(path);
                }
                paths
            }
        };

        let mut texts = Vec::with_capacity(inputs.len());
        for path in &inputs {
            let page = clean_text(&self.run_on(path).await?);
            debug!(doc = %doc.id(), file = %path.display(), chars = page.len(), "tesseract page done");
            if !page.is_empty() {
                texts.push(page);
            }
        }

        let text = texts.join("\n\n");
        if text.is_empty() {
            Err(OcrError::EmptyResult)
        } else {
            Ok(text)
        }
    }
}

async fn write_scratch(path: &Path, bytes: &[u8]) -> Result<(), OcrError> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| OcrError::Service(format!("failed to write temp file: {e}")))
}
