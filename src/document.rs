//! The unit of work moving through the pipeline.
//!
//! A [`Document`] is created by the resolver at enqueue time and then only
//! mutated by the orchestrator, one stage at a time. Every stage owns exactly
//! one slice of it: content loading owns `content`, OCR owns `raw_text`,
//! classification owns `classified_type`, retrieval owns `extracted_fields`.
//! `errors` and `warnings` are append-only.

use crate::resolver::{ContentKind, DocumentContent};
use crate::status::{DocumentStatus, FailureStage, Stage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Type tag assigned by a classifier, e.g. `"invoice"`.
pub type TypeTag = String;

/// Tag returned by classifiers when no rule matches.
pub const UNKNOWN_TYPE: &str = "unknown";

/// Extracted fields, keyed by field name. Ordered so summaries are stable.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Opaque, immutable document identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// A fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A single extracted value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view: numbers as-is, text if it parses as a float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(s) => s.trim().parse().ok(),
            FieldValue::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Number(n) => write!(f, "{n}"),
            FieldValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// One entry in a document's error or warning trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub stage: Stage,
    pub message: String,
}

impl ErrorRecord {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stage, self.message)
    }
}

/// A document and everything the pipeline has learned about it so far.
#[derive(Debug, Clone)]
pub struct Document {
    id: DocumentId,
    source_locator: String,
    content_kind: ContentKind,
    kind_guessed: bool,
    status: DocumentStatus,
    content: Option<DocumentContent>,
    raw_text: String,
    classified_type: Option<TypeTag>,
    extracted_fields: FieldMap,
    errors: Vec<ErrorRecord>,
    warnings: Vec<ErrorRecord>,
}

impl Document {
    pub fn new(id: DocumentId, source_locator: impl Into<String>, content_kind: ContentKind) -> Self {
        Self {
            id,
            source_locator: source_locator.into(),
            content_kind,
            kind_guessed: false,
            status: DocumentStatus::Queued,
            content: None,
            raw_text: String::new(),
            classified_type: None,
            extracted_fields: FieldMap::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Build a document that already carries OCR text, for running
    /// classifiers or retrievers outside a [`crate::orchestrator::ProcessRun`].
    pub fn with_raw_text(id: impl Into<DocumentId>, text: impl Into<String>) -> Self {
        let mut doc = Self::new(id.into(), "", ContentKind::Text);
        doc.raw_text = text.into();
        doc.status = DocumentStatus::OcrDone;
        doc
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn source_locator(&self) -> &str {
        &self.source_locator
    }

    pub fn content_kind(&self) -> ContentKind {
        self.content_kind
    }

    /// Whether `content_kind` is the resolver's fallback rather than a
    /// recognised suffix or media type. Such documents have their kind
    /// sniffed from the loaded bytes.
    pub fn kind_is_guessed(&self) -> bool {
        self.kind_guessed
    }

    pub fn status(&self) -> DocumentStatus {
        self.status
    }

    /// Loaded bytes; `None` before content loading and after OCR.
    pub fn content(&self) -> Option<&DocumentContent> {
        self.content.as_ref()
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn classified_type(&self) -> Option<&str> {
        self.classified_type.as_deref()
    }

    pub fn extracted_fields(&self) -> &FieldMap {
        &self.extracted_fields
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    pub fn warnings(&self) -> &[ErrorRecord] {
        &self.warnings
    }

    // ── Orchestrator-only mutation ───────────────────────────────────────

    /// Move to `next` if that keeps the status monotonic. Returns whether
    /// the transition happened.
    pub(crate) fn advance(&mut self, next: DocumentStatus) -> bool {
        if !self.status.can_advance_to(next) {
            debug!(doc = %self.id, from = %self.status, to = %next, "Rejected status transition");
            return false;
        }
        self.status = next;
        true
    }

    /// Record `message` and move to `failed:<failure>`. No-op on a terminal
    /// document so the first failure always stays authoritative.
    pub(crate) fn fail(&mut self, failure: FailureStage, stage: Stage, message: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.errors.push(ErrorRecord::new(stage, message));
        self.status = DocumentStatus::Failed(failure);
    }

    pub(crate) fn push_error(&mut self, record: ErrorRecord) {
        self.errors.push(record);
    }

    pub(crate) fn push_warning(&mut self, stage: Stage, message: impl Into<String>) {
        self.warnings.push(ErrorRecord::new(stage, message));
    }

    pub(crate) fn set_content_kind(&mut self, kind: ContentKind) {
        self.content_kind = kind;
    }

    pub(crate) fn mark_kind_guessed(&mut self) {
        self.kind_guessed = true;
    }

    pub(crate) fn set_content(&mut self, content: DocumentContent) {
        self.content = Some(content);
    }

    /// Drop loaded bytes once OCR no longer needs them.
    pub(crate) fn release_content(&mut self) {
        self.content = None;
    }

    pub(crate) fn set_raw_text(&mut self, text: String) {
        if self.raw_text.is_empty() {
            self.raw_text = text;
        }
    }

    pub(crate) fn set_classified_type(&mut self, tag: TypeTag) {
        if self.classified_type.is_none() {
            self.classified_type = Some(tag);
        }
    }

    pub(crate) fn set_extracted_fields(&mut self, fields: FieldMap) {
        if self.extracted_fields.is_empty() {
            self.extracted_fields = fields;
        }
    }
}
