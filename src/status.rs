//! Per-document state machine and run-level status.
//!
//! ```text
//! queued → content_loaded → ocr_done → classified → fields_retrieved → validated
//!    │            │             │           │               │              │
//!    └────────────┴─────────────┴───────────┴───────────────┴──────────────┴──▶ terminal
//! ```
//!
//! Terminal states are `done`, `done_with_validation_errors` and the
//! `failed:<stage>` family. Status only ever moves forward; once terminal, no
//! further transition is accepted.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stage that produced an [`crate::document::ErrorRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Document-type resolution (warnings only).
    Resolve,
    ContentLoad,
    Ocr,
    Classification,
    Retrieval,
    Validation,
    /// Unexpected fault caught at the orchestrator boundary.
    Processing,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Resolve => "resolve",
            Stage::ContentLoad => "content_load",
            Stage::Ocr => "ocr",
            Stage::Classification => "classification",
            Stage::Retrieval => "retrieval",
            Stage::Validation => "validation",
            Stage::Processing => "processing",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a document stopped before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureStage {
    ContentLoad,
    Ocr,
    NoRetriever,
    ExtractionException,
    ProcessingException,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::ContentLoad => "content_load",
            FailureStage::Ocr => "ocr",
            FailureStage::NoRetriever => "no_retriever",
            FailureStage::ExtractionException => "extraction_exception",
            FailureStage::ProcessingException => "processing_exception",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "content_load" => FailureStage::ContentLoad,
            "ocr" => FailureStage::Ocr,
            "no_retriever" => FailureStage::NoRetriever,
            "extraction_exception" => FailureStage::ExtractionException,
            "processing_exception" => FailureStage::ProcessingException,
            _ => return None,
        })
    }
}

/// Where a document is in the pipeline.
///
/// Serialises as the flat strings used in summaries: `"ocr_done"`,
/// `"done_with_validation_errors"`, `"failed:no_retriever"`, …
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum DocumentStatus {
    #[default]
    Queued,
    ContentLoaded,
    OcrDone,
    Classified,
    FieldsRetrieved,
    Validated,
    /// Validation ran and produced no errors.
    Done,
    /// Validation ran and produced at least one error. Not a hard failure.
    DoneWithValidationErrors,
    Failed(FailureStage),
}

impl DocumentStatus {
    /// Every status a finished document may carry.
    pub const TERMINAL: [DocumentStatus; 7] = [
        DocumentStatus::Done,
        DocumentStatus::DoneWithValidationErrors,
        DocumentStatus::Failed(FailureStage::ContentLoad),
        DocumentStatus::Failed(FailureStage::Ocr),
        DocumentStatus::Failed(FailureStage::NoRetriever),
        DocumentStatus::Failed(FailureStage::ExtractionException),
        DocumentStatus::Failed(FailureStage::ProcessingException),
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DocumentStatus::Done | DocumentStatus::DoneWithValidationErrors | DocumentStatus::Failed(_)
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, DocumentStatus::Failed(_))
    }

    fn rank(&self) -> u8 {
        match self {
            DocumentStatus::Queued => 0,
            DocumentStatus::ContentLoaded => 1,
            DocumentStatus::OcrDone => 2,
            DocumentStatus::Classified => 3,
            DocumentStatus::FieldsRetrieved => 4,
            DocumentStatus::Validated => 5,
            DocumentStatus::Done
            | DocumentStatus::DoneWithValidationErrors
            | DocumentStatus::Failed(_) => 6,
        }
    }

    /// Whether moving from `self` to `next` keeps the status monotonic.
    pub fn can_advance_to(&self, next: DocumentStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentStatus::Queued => f.write_str("queued"),
            DocumentStatus::ContentLoaded => f.write_str("content_loaded"),
            DocumentStatus::OcrDone => f.write_str("ocr_done"),
            DocumentStatus::Classified => f.write_str("classified"),
            DocumentStatus::FieldsRetrieved => f.write_str("fields_retrieved"),
            DocumentStatus::Validated => f.write_str("validated"),
            DocumentStatus::Done => f.write_str("done"),
            DocumentStatus::DoneWithValidationErrors => f.write_str("done_with_validation_errors"),
            DocumentStatus::Failed(stage) => write!(f, "failed:{}", stage.as_str()),
        }
    }
}

impl From<DocumentStatus> for String {
    fn from(status: DocumentStatus) -> Self {
        status.to_string()
    }
}

impl TryFrom<String> for DocumentStatus {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let status = match s.as_str() {
            "queued" => DocumentStatus::Queued,
            "content_loaded" => DocumentStatus::ContentLoaded,
            "ocr_done" => DocumentStatus::OcrDone,
            "classified" => DocumentStatus::Classified,
            "fields_retrieved" => DocumentStatus::FieldsRetrieved,
            "validated" => DocumentStatus::Validated,
            "done" => DocumentStatus::Done,
            "done_with_validation_errors" => DocumentStatus::DoneWithValidationErrors,
            other => match other.strip_prefix("failed:").and_then(FailureStage::parse) {
                Some(stage) => DocumentStatus::Failed(stage),
                None => return Err(format!("unknown document status '{other}'")),
            },
        };
        Ok(status)
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Configured but not yet executed.
    #[default]
    Pending,
    /// Every document reached `done` or `done_with_validation_errors`.
    Completed,
    /// At least one document failed, or a run-level error was recorded.
    CompletedWithErrors,
    /// A required component was missing; no document was processed.
    Aborted,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Pending => "pending",
            RunStatus::Completed => "completed",
            RunStatus::CompletedWithErrors => "completed_with_errors",
            RunStatus::Aborted => "aborted",
        })
    }
}
