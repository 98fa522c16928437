//! Vision-LLM OCR through `edgequake-llm`.
//!
//! Each page image goes out as one chat request: the transcription prompt as
//! the system turn and the base64 image as the user turn. Transient failures
//! (HTTP 429/503, timeouts) are retried with exponential backoff
//! (`retry_backoff_ms * 2^(retry - 1)`, capped at one minute); authentication
//! failures are not.

use super::{clean::clean_text, render::render_pdf};
use crate::components::OcrExtractor;
use crate::config::PipelineConfig;
use crate::document::Document;
use crate::error::{DocProcError, OcrError};
use crate::prompts::{page_instruction, TRANSCRIPTION_PROMPT};
use crate::resolver::ContentKind;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

const DEFAULT_VISION_MODEL: &str = "gpt-4.1-nano";
const MAX_RETRY_DELAY_MS: u64 = 60_000;

/// OCR settings copied out of [`PipelineConfig`] at construction.
#[derive(Debug, Clone)]
struct VisionSettings {
    dpi: u32,
    max_rendered_pixels: u32,
    password: Option<String>,
    system_prompt: Option<String>,
    temperature: f32,
    max_tokens: usize,
    max_retries: u32,
    retry_backoff_ms: u64,
    api_timeout_secs: u64,
}

impl From<&PipelineConfig> for VisionSettings {
    fn from(c: &PipelineConfig) -> Self {
        Self {
            dpi: c.dpi,
            max_rendered_pixels: c.max_rendered_pixels,
            password: c.password.clone(),
            system_prompt: c.system_prompt.clone(),
            temperature: c.temperature,
            max_tokens: c.max_tokens,
            max_retries: c.max_retries,
            retry_backoff_ms: c.retry_backoff_ms,
            api_timeout_secs: c.api_timeout_secs,
        }
    }
}

/// Transcribes PDFs and images with a vision-capable LLM.
pub struct VisionOcrExtractor {
    provider: Arc<dyn LLMProvider>,
    settings: VisionSettings,
}

impl VisionOcrExtractor {
    /// Use an already-constructed provider.
    pub fn new(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            settings: VisionSettings::from(config),
        }
    }

    /// Resolve a provider from `config` and the environment.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, DocProcError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.settings.temperature),
            max_tokens: Some(self.settings.max_tokens),
            ..Default::default()
        }
    }

    async fn transcribe_page(
        &self,
        doc_id: &str,
        page_num: usize,
        total_pages: usize,
        image: ImageData,
    ) -> Result<String, OcrError> {
        let start = Instant::now();
        let system_prompt = self
            .settings
            .system_prompt
            .as_deref()
            .unwrap_or(TRANSCRIPTION_PROMPT);
        let messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user_with_images(&page_instruction(page_num, total_pages), vec![image]),
        ];
        let options = self.options();
        let call_timeout = Duration::from_secs(self.settings.api_timeout_secs);

        let mut last_err = OcrError::Service("no attempt made".into());
        for attempt in 0..=self.settings.max_retries {
            if attempt > 0 {
                let backoff = retry_delay_ms(self.settings.retry_backoff_ms, attempt);
                warn!(
                    "{} page {}: retry {}/{} after {}ms",
                    doc_id, page_num, attempt, self.settings.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match timeout(call_timeout, self.provider.chat(&messages, Some(&options))).await {
                Ok(Ok(response)) => {
                    debug!(
                        "{} page {}: {} input tokens, {} output tokens, {:?}",
                        doc_id,
                        page_num,
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(response.content);
                }
                Ok(Err(e)) => {
                    let err = classify_service_error(&e.to_string());
                    warn!("{} page {}: attempt {} failed: {}", doc_id, page_num, attempt + 1, err);
                    if matches!(err, OcrError::Config(_)) {
                        return Err(err);
                    }
                    last_err = err;
                }
                Err(_) => {
                    warn!("{} page {}: attempt {} timed out", doc_id, page_num, attempt + 1);
                    last_err = OcrError::Timeout {
                        secs: self.settings.api_timeout_secs,
                    };
                }
            }
        }
        Err(last_err)
    }
}

#[async_trait]
impl OcrExtractor for VisionOcrExtractor {
    fn name(&self) -> &str {
        "vision"
    }

    async fn extract_text(&self, doc: &Document) -> Result<String, OcrError> {
        let content = doc.content().ok_or_else(|| {
            OcrError::MissingFile(format!("content of '{}' was not loaded", doc.source_locator()))
        })?;

        let images = match content.kind {
            ContentKind::Text => {
                let text = String::from_utf8_lossy(&content.bytes);
                return non_empty(clean_text(&text));
            }
            ContentKind::Image => vec![encode_image_bytes(&content.bytes)?],
            ContentKind::Pdf => {
                let pages = render_pdf(
                    content.bytes.clone(),
                    self.settings.dpi,
                    self.settings.max_rendered_pixels,
                    self.settings.password.clone(),
                )
                .await?;
                pages.iter().map(encode_page).collect::<Result<Vec<_>, _>>()?
            }
        };

        let total = images.len();
        let mut texts = Vec::with_capacity(total);
        for (idx, image) in images.into_iter().enumerate() {
            let raw = self.transcribe_page(doc.id().as_str(), idx + 1, total, image).await?;
            let page = clean_text(&raw);
            if !page.is_empty() {
                texts.push(page);
            }
        }
        non_empty(texts.join("\n\n"))
    }
}

/// Delay before retry number `retry` (1-based).
fn retry_delay_ms(base_ms: u64, retry: u32) -> u64 {
    let factor = 2u64.checked_pow(retry.saturating_sub(1)).unwrap_or(u64::MAX);
    base_ms.saturating_mul(factor).min(MAX_RETRY_DELAY_MS)
}

fn non_empty(text: String) -> Result<String, OcrError> {
    if text.trim().is_empty() {
        Err(OcrError::EmptyResult)
    } else {
        Ok(text)
    }
}

/// Encode a rendered page as a lossless base64 PNG with high detail.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, OcrError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| OcrError::Unsupported(format!("failed to encode page: {e}")))?;
    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());
    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// PNG and JPEG scans go out untouched; anything else is decoded and
/// re-encoded as PNG.
pub fn encode_image_bytes(bytes: &[u8]) -> Result<ImageData, OcrError> {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => Ok(ImageData::new(STANDARD.encode(bytes), "image/png").with_detail("high")),
        Ok(ImageFormat::Jpeg) => Ok(ImageData::new(STANDARD.encode(bytes), "image/jpeg").with_detail("high")),
        _ => {
            let img = image::load_from_memory(bytes)
                .map_err(|e| OcrError::Unsupported(format!("cannot decode image: {e}")))?;
            encode_page(&img)
        }
    }
}

/// Authentication problems will not fix themselves; everything else is
/// treated as a transient service fault.
fn classify_service_error(message: &str) -> OcrError {
    let lower = message.to_lowercase();
    let is_auth = ["401", "403", "unauthorized", "forbidden", "api key", "api_key"]
        .iter()
        .any(|needle| lower.contains(needle));
    if is_auth {
        OcrError::Config(message.to_string())
    } else {
        OcrError::Service(message.to_string())
    }
}

fn create_vision_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, DocProcError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        DocProcError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the provider, from most-specific to least-specific:
///
/// 1. `config.provider`, used as-is.
/// 2. `config.provider_name` with `config.model`.
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set.
/// 4. OpenAI, when `OPENAI_API_KEY` is set.
/// 5. `ProviderFactory::from_env` auto-detection.
pub fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, DocProcError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_VISION_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_VISION_MODEL);
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| DocProcError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No vision provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
