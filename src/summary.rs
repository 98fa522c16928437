//! Read-only projections of a finished run.
//!
//! [`ProcessSummary`] is the reporting view (what the CLI prints and
//! `--summary` writes). [`PersistedDocument`] is the flattened record handed
//! to a [`crate::sink::ResultSink`].

use crate::document::{Document, ErrorRecord, FieldMap};
use crate::resolver::ContentKind;
use crate::status::{DocumentStatus, RunStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Summary of one orchestration session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSummary {
    pub run_id: String,
    pub overall_status: RunStatus,
    pub queued_count: usize,
    pub processed_count: usize,
    pub run_errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// In enqueue order.
    pub documents: Vec<DocumentSummary>,
}

impl ProcessSummary {
    pub fn failed_count(&self) -> usize {
        self.documents.iter().filter(|d| d.status.is_failed()).count()
    }

    /// Documents whose fields were validated without errors.
    pub fn done_count(&self) -> usize {
        self.documents
            .iter()
            .filter(|d| d.status == DocumentStatus::Done)
            .count()
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Summary of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: String,
    pub source_locator: String,
    pub content_kind: ContentKind,
    pub status: DocumentStatus,
    pub classified_type: Option<String>,
    pub extracted_fields: FieldMap,
    pub errors: Vec<ErrorRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ErrorRecord>,
    /// First `snippet_len` characters of the OCR text.
    pub raw_text_snippet: String,
}

impl DocumentSummary {
    pub fn from_document(doc: &Document, snippet_len: usize) -> Self {
        Self {
            id: doc.id().to_string(),
            source_locator: doc.source_locator().to_string(),
            content_kind: doc.content_kind(),
            status: doc.status(),
            classified_type: doc.classified_type().map(str::to_string),
            extracted_fields: doc.extracted_fields().clone(),
            errors: doc.errors().to_vec(),
            warnings: doc.warnings().to_vec(),
            raw_text_snippet: snippet(doc.raw_text(), snippet_len),
        }
    }
}

/// Flattened per-document record for storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedDocument {
    pub run_id: String,
    pub id: String,
    pub source_locator: String,
    pub content_kind: ContentKind,
    pub status: DocumentStatus,
    pub classified_type: Option<String>,
    pub raw_text: String,
    pub extracted_fields: FieldMap,
    pub errors: Vec<ErrorRecord>,
}

impl PersistedDocument {
    pub fn from_document(run_id: &str, doc: &Document) -> Self {
        Self {
            run_id: run_id.to_string(),
            id: doc.id().to_string(),
            source_locator: doc.source_locator().to_string(),
            content_kind: doc.content_kind(),
            status: doc.status(),
            classified_type: doc.classified_type().map(str::to_string),
            raw_text: doc.raw_text().to_string(),
            extracted_fields: doc.extracted_fields().clone(),
            errors: doc.errors().to_vec(),
        }
    }
}

/// First `max_chars` characters of `text`, never splitting a code point.
fn snippet(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}
