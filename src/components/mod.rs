//! Capability contracts the orchestrator depends on.
//!
//! Four roles, each swappable per run or per document type:
//!
//! | Role              | Contract              | Built-in strategies                      |
//! |-------------------|-----------------------|------------------------------------------|
//! | OCR extractor     | [`OcrExtractor`]      | [`crate::ocr::VisionOcrExtractor`], [`crate::ocr::TesseractOcrExtractor`] |
//! | Classifier        | [`Classifier`]        | [`KeywordClassifier`], [`ClassifierChain`] |
//! | Field retriever   | [`FieldRetriever`]    | [`PatternFieldRetriever`]                |
//! | Field validator   | [`Validator`]         | [`ValidatorKind`] variants               |
//!
//! The orchestrator only ever holds `Arc<dyn …>` handles and never inspects
//! the concrete strategy behind them.

pub mod classifier;
pub mod retriever;
pub mod validator;

pub use classifier::{ClassifierChain, KeywordClassifier};
pub use retriever::{FieldKind, PatternFieldRetriever, RetrievalRule};
pub use validator::ValidatorKind;

use crate::document::{Document, FieldMap, FieldValue, TypeTag};
use crate::error::{ComponentError, OcrError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Turns loaded document content into text.
///
/// Implementations must return non-empty text on success. Any reason for
/// producing no text (service fault, missing file, bad credentials, empty
/// output) is an `Err`; the orchestrator treats every kind as `failed:ocr`
/// and keeps the message for diagnostics.
#[async_trait]
pub trait OcrExtractor: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn extract_text(&self, doc: &Document) -> Result<String, OcrError>;
}

/// Assigns a type tag from a document's text.
///
/// Returning [`crate::document::UNKNOWN_TYPE`] is not a failure. `Err` is
/// reserved for internal faults.
pub trait Classifier: Send + Sync {
    fn classify(&self, doc: &Document) -> Result<TypeTag, ComponentError>;
}

/// Extracts named fields from a classified document.
///
/// Fields that cannot be located are omitted from the map. `Err` is
/// reserved for internal faults and fails the document with
/// `failed:extraction_exception`.
pub trait FieldRetriever: Send + Sync {
    fn retrieve_fields(&self, doc: &Document) -> Result<FieldMap, ComponentError>;
}

/// Checks one field value against parameterised rules.
///
/// Pure: the same value and rules always yield the same messages.
pub trait Validator: Send + Sync {
    fn name(&self) -> &str;

    fn validate(&self, value: &FieldValue, rules: &RuleParams) -> Vec<String>;
}

/// Flat key/value rule parameters, e.g. `{"min_length": 3, "max_length": 20}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleParams(Map<String, Value>);

impl RuleParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Non-negative integer, also accepting integral floats such as `3.0`.
    pub fn get_usize(&self, key: &str) -> Option<usize> {
        let v = self.0.get(key)?;
        v.as_u64()
            .or_else(|| v.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
            .map(|n| n as usize)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for RuleParams {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
