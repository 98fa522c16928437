//! Declarative rule files.
//!
//! A [`RuleSet`] is everything a run needs besides its OCR backend,
//! expressed as JSON:
//!
//! ```json
//! {
//!   "classification": [
//!     { "type": "invoice", "keywords": ["invoice", "factura"] }
//!   ],
//!   "retrievers": {
//!     "invoice": [
//!       { "field": "invoice_number", "pattern": "Invoice No[:\\s]+([A-Z0-9-]+)" },
//!       { "field": "total_amount", "pattern": "Total[:\\s]+\\$?([\\d,]+\\.?\\d*)", "kind": "number" }
//!     ]
//!   },
//!   "default_retriever": [],
//!   "validators": {
//!     "invoice_number": [
//!       { "kind": "length", "params": { "min_length": 3, "max_length": 20 } },
//!       { "kind": "regex", "params": { "pattern": "^[A-Z0-9-]+$" } }
//!     ]
//!   },
//!   "required_fields": ["invoice_number"]
//! }
//! ```
//!
//! Classification rules keep file order (first match wins). A retriever
//! listed under `"default"` in `retrievers`, or in `default_retriever`, is the
//! fallback for unmatched types.

use crate::components::{KeywordClassifier, PatternFieldRetriever, RetrievalRule, RuleParams, ValidatorKind};
use crate::error::DocProcError;
use crate::orchestrator::ProcessRun;
use crate::registry::DEFAULT_RETRIEVER;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// One `(type_tag, keywords)` classification rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRule {
    #[serde(rename = "type")]
    pub type_tag: String,
    pub keywords: Vec<String>,
}

/// One `(validator_kind, parameters)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorRule {
    pub kind: ValidatorKind,
    #[serde(default)]
    pub params: RuleParams,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSet {
    #[serde(default)]
    pub classification: Vec<ClassificationRule>,
    #[serde(default)]
    pub retrievers: BTreeMap<String, Vec<RetrievalRule>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_retriever: Option<Vec<RetrievalRule>>,
    #[serde(default)]
    pub validators: BTreeMap<String, Vec<ValidatorRule>>,
    #[serde(default)]
    pub required_fields: Vec<String>,
}

impl RuleSet {
    pub fn from_json_str(json: &str) -> Result<Self, DocProcError> {
        let rules: RuleSet = serde_json::from_str(json)?;
        rules.check()?;
        Ok(rules)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DocProcError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| DocProcError::RuleFileUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Structural checks serde cannot express.
    fn check(&self) -> Result<(), DocProcError> {
        for rule in &self.classification {
            if rule.type_tag.trim().is_empty() {
                return Err(DocProcError::InvalidRule {
                    target: "classification".into(),
                    detail: "type tag must not be empty".into(),
                });
            }
            if rule.keywords.iter().all(|k| k.trim().is_empty()) {
                return Err(DocProcError::InvalidRule {
                    target: rule.type_tag.clone(),
                    detail: "classification rule needs at least one keyword".into(),
                });
            }
        }
        if self.retrievers.contains_key(DEFAULT_RETRIEVER) && self.default_retriever.is_some() {
            return Err(DocProcError::InvalidRule {
                target: DEFAULT_RETRIEVER.into(),
                detail: "default retriever given twice (retrievers.default and default_retriever)".into(),
            });
        }
        Ok(())
    }

    /// The keyword classifier these rules describe, if any.
    pub fn classifier(&self) -> Option<KeywordClassifier> {
        if self.classification.is_empty() {
            return None;
        }
        Some(
            self.classification
                .iter()
                .fold(KeywordClassifier::new(), |c, rule| c.with_rule(&rule.type_tag, &rule.keywords)),
        )
    }

    /// Register the classifier, retrievers, validators and required fields
    /// on `run`. Patterns are compiled here, so a bad pattern fails before
    /// any document is processed.
    pub fn apply(&self, run: &mut ProcessRun) -> Result<(), DocProcError> {
        if let Some(classifier) = self.classifier() {
            run.set_classifier(Arc::new(classifier));
        }

        for (type_tag, rules) in &self.retrievers {
            let retriever = PatternFieldRetriever::new(rules.iter().cloned())?;
            run.register_retriever(type_tag, Arc::new(retriever));
        }
        if let Some(ref rules) = self.default_retriever {
            let retriever = PatternFieldRetriever::new(rules.iter().cloned())?;
            run.register_default_retriever(Arc::new(retriever));
        }

        for (field, rules) in &self.validators {
            for rule in rules {
                run.register_validator(field, Arc::new(rule.kind), rule.params.clone());
            }
        }
        for field in &self.required_fields {
            run.require_field(field);
        }

        debug!(
            classification_rules = self.classification.len(),
            retrievers = self.retrievers.len(),
            validated_fields = self.validators.len(),
            "Applied rule set"
        );
        Ok(())
    }
}
