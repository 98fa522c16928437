//! Configuration for a processing run.
//!
//! Everything tunable lives in [`PipelineConfig`], built via
//! [`PipelineConfig::builder()`]. Orchestration knobs (concurrency, summary
//! snippet length, progress events) sit next to the OCR knobs shared by the
//! built-in extractors, so one config describes one run end to end.

use crate::error::DocProcError;
use crate::progress::RunProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Configuration for a [`crate::orchestrator::ProcessRun`] and the built-in
/// OCR extractors.
///
/// # Example
/// ```rust
/// use edgequake_docproc::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .concurrency(4)
///     .model("gpt-4.1-nano")
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 4);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Documents processed at once. Default: 1 (sequential).
    ///
    /// Documents never share state, so raising this only trades memory and
    /// OCR-service quota for wall-clock time. Summaries stay in enqueue order.
    pub concurrency: usize,

    /// Characters of `raw_text` kept in each summary entry. Default: 100.
    pub snippet_len: usize,

    /// Rendering DPI hint for PDF pages. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Longest edge of a rendered page in pixels. Default: 2000.
    ///
    /// Caps memory for oversized pages regardless of their physical size.
    pub max_rendered_pixels: u32,

    /// Vision model identifier, e.g. "gpt-4.1-nano". If None, the provider default.
    pub model: Option<String>,

    /// Vision provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for transcription. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens generated per page. Default: 4096.
    pub max_tokens: usize,

    /// Retries on a failed OCR call. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Password for encrypted PDFs.
    pub password: Option<String>,

    /// Custom transcription prompt. If None, [`crate::prompts::TRANSCRIPTION_PROMPT`].
    pub system_prompt: Option<String>,

    /// Download timeout for URL locators in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-OCR-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Language passed to `tesseract -l`. Default: "eng".
    pub tesseract_language: String,

    /// Receives run and per-document events.
    pub progress_callback: Option<Arc<dyn RunProgressCallback>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            snippet_len: 100,
            dpi: 150,
            max_rendered_pixels: 2000,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            password: None,
            system_prompt: None,
            download_timeout_secs: 120,
            api_timeout_secs: 60,
            tesseract_language: "eng".to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("concurrency", &self.concurrency)
            .field("snippet_len", &self.snippet_len)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("tesseract_language", &self.tesseract_language)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn RunProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn snippet_len(mut self, n: usize) -> Self {
        self.config.snippet_len = n;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn tesseract_language(mut self, lang: impl Into<String>) -> Self {
        self.config.tesseract_language = lang.into();
        self
    }

    pub fn progress_callback(mut self, cb: Arc<dyn RunProgressCallback>) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, DocProcError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(DocProcError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.download_timeout_secs == 0 || c.api_timeout_secs == 0 {
            return Err(DocProcError::InvalidConfig(
                "Timeouts must be at least one second".into(),
            ));
        }
        if c.tesseract_language.trim().is_empty() {
            return Err(DocProcError::InvalidConfig(
                "Tesseract language must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
