//! # edgequake-docproc
//!
//! Turn scanned and photographed documents into classified, field-extracted,
//! validated records.
//!
//! Every document in a batch runs through the same fixed stage sequence, and
//! each stage is a swappable component behind a trait:
//!
//! ```text
//! locator
//!  │
//!  ├─ 1. Resolve   suffix / media type → content kind (pdf, image, text)
//!  ├─ 2. Load      read from disk or download, sniff magic bytes
//!  ├─ 3. OCR       vision LLM or tesseract → raw_text
//!  ├─ 4. Classify  keyword table, first match wins → type tag
//!  ├─ 5. Retrieve  per-type regex rules → extracted_fields
//!  └─ 6. Validate  per-field validators → done / done_with_validation_errors
//! ```
//!
//! One bad document never sinks the batch: a failing stage moves that
//! document to a `failed:<stage>` status with an error record and the run
//! carries on. Only a missing OCR extractor or classifier aborts a run.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_docproc::{PipelineConfig, ProcessRun, RuleSet, VisionOcrExtractor};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder().concurrency(4).build()?;
//!     let rules = RuleSet::load("rules.json")?;
//!
//!     let mut run = ProcessRun::new(config.clone());
//!     run.set_ocr_extractor(Arc::new(VisionOcrExtractor::from_config(&config)?));
//!     rules.apply(&mut run)?;
//!     run.enqueue("invoice.pdf");
//!     run.enqueue("https://example.com/receipt.png");
//!
//!     let done = run.run().await;
//!     println!("{}", done.process_summary().to_json_pretty()?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docproc` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-docproc = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod components;
pub mod config;
pub mod document;
pub mod error;
pub mod ocr;
pub mod orchestrator;
pub mod progress;
pub mod prompts;
pub mod registry;
pub mod resolver;
pub mod rules;
pub mod sink;
pub mod status;
pub mod summary;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use components::{
    Classifier, ClassifierChain, FieldKind, FieldRetriever, KeywordClassifier, OcrExtractor,
    PatternFieldRetriever, RetrievalRule, RuleParams, Validator, ValidatorKind,
};
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use document::{Document, DocumentId, ErrorRecord, FieldMap, FieldValue, TypeTag, UNKNOWN_TYPE};
pub use error::{ComponentError, DocProcError, LoadError, OcrError};
pub use ocr::{TesseractOcrExtractor, VisionOcrExtractor};
pub use orchestrator::{CompletedRun, ProcessRun};
pub use progress::{NoopProgressCallback, ProgressCallback, RunProgressCallback};
pub use registry::{RetrieverRegistry, ValidatorRegistry, DEFAULT_RETRIEVER};
pub use resolver::{ContentKind, DocumentContent, DocumentResolver};
pub use rules::RuleSet;
pub use sink::{JsonLinesSink, ResultSink};
pub use status::{DocumentStatus, FailureStage, RunStatus, Stage};
pub use summary::{DocumentSummary, PersistedDocument, ProcessSummary};
