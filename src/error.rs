//! Error types for the edgequake-docproc library.
//!
//! Two tiers reflect two distinct failure modes:
//!
//! * [`DocProcError`]: **Fatal**: something outside a single document is
//!   wrong (invalid configuration, unreadable rule file, sink I/O). Returned
//!   as `Err(DocProcError)` from builders, loaders and helpers. The pipeline's
//!   `run()` never returns it.
//!
//! * [`LoadError`], [`OcrError`], [`ComponentError`]: **Per-document**: one
//!   stage of one document failed. The orchestrator turns them into
//!   [`crate::document::ErrorRecord`] entries and moves on to the next
//!   document, so a batch survives any number of bad inputs.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-docproc library.
#[derive(Debug, Error)]
pub enum DocProcError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A classification, retrieval or validation rule is malformed.
    #[error("Invalid rule for '{target}': {detail}")]
    InvalidRule { target: String, detail: String },

    /// The rule file could not be read.
    #[error("Failed to read rule file '{path}': {source}")]
    RuleFileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The rule file is not valid JSON for a [`crate::rules::RuleSet`].
    #[error("Failed to parse rules: {0}")]
    RuleParse(#[from] serde_json::Error),

    /// The OCR backend could not be initialised (missing API key etc.).
    #[error("OCR provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not write results to the configured sink.
    #[error("Failed to write results to '{path}': {source}")]
    SinkWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Content could not be loaded for a document.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    #[error("permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    #[error("failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes do not look like the content kind the resolver picked.
    #[error("content of '{locator}' is not a valid {expected}: {detail}")]
    InvalidContent {
        locator: String,
        expected: &'static str,
        detail: String,
    },

    #[error("failed to read '{locator}': {detail}")]
    Io { locator: String, detail: String },
}

/// Why an OCR extractor produced no text.
///
/// The kinds are kept apart for diagnostics only; the orchestrator treats
/// every variant the same way (`failed:ocr`).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OcrError {
    /// The OCR service returned an error or an unusable response.
    #[error("OCR service error: {0}")]
    Service(String),

    /// The document content was never loaded or its file vanished.
    #[error("document content missing: {0}")]
    MissingFile(String),

    /// Credentials, binaries or other configuration are missing or wrong.
    #[error("OCR configuration error: {0}")]
    Config(String),

    /// The document is of a kind or size the extractor cannot handle.
    #[error("unsupported document: {0}")]
    Unsupported(String),

    /// The service answered but produced no text.
    #[error("OCR produced no text")]
    EmptyResult,

    #[error("OCR call timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// An unexpected internal fault inside a classifier or field retriever.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{component}: {detail}")]
pub struct ComponentError {
    pub component: String,
    pub detail: String,
}

impl ComponentError {
    pub fn new(component: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            detail: detail.into(),
        }
    }
}
