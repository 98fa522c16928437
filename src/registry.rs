//! Per-type retriever and per-field validator registries.
//!
//! Both are plain values owned by a [`crate::orchestrator::ProcessRun`];
//! there is no process-wide registry.

use crate::components::{FieldRetriever, RuleParams, Validator};
use crate::document::{ErrorRecord, FieldMap, TypeTag};
use crate::status::Stage;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Type tag under which a fallback retriever is registered.
pub const DEFAULT_RETRIEVER: &str = "default";

/// Classified type → field retriever, with an optional fallback.
#[derive(Clone, Default)]
pub struct RetrieverRegistry {
    by_type: HashMap<TypeTag, Arc<dyn FieldRetriever>>,
    fallback: Option<Arc<dyn FieldRetriever>>,
}

impl RetrieverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `retriever` for `type_tag`. The tag `"default"` sets the
    /// fallback. A later registration for the same tag replaces the earlier one.
    pub fn register(&mut self, type_tag: impl Into<TypeTag>, retriever: Arc<dyn FieldRetriever>) {
        let type_tag = type_tag.into();
        if type_tag == DEFAULT_RETRIEVER {
            self.fallback = Some(retriever);
        } else {
            self.by_type.insert(type_tag, retriever);
        }
    }

    pub fn register_default(&mut self, retriever: Arc<dyn FieldRetriever>) {
        self.fallback = Some(retriever);
    }

    /// Exact match first, then the fallback.
    pub fn lookup(&self, type_tag: &str) -> Option<&Arc<dyn FieldRetriever>> {
        self.by_type.get(type_tag).or(self.fallback.as_ref())
    }

    pub fn has_default(&self) -> bool {
        self.fallback.is_some()
    }

    /// Registered type tags, sorted.
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.by_type.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

/// Field name → ordered `(validator, rules)` pairs, plus required fields.
#[derive(Clone, Default)]
pub struct ValidatorRegistry {
    by_field: HashMap<String, Vec<(Arc<dyn Validator>, RuleParams)>>,
    required: Vec<String>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a validator for `field`. Every pair registered for a field runs.
    pub fn register(&mut self, field: impl Into<String>, validator: Arc<dyn Validator>, rules: RuleParams) {
        self.by_field
            .entry(field.into())
            .or_default()
            .push((validator, rules));
    }

    /// Make a missing `field` a validation error.
    pub fn require_field(&mut self, field: impl Into<String>) {
        let field = field.into();
        if !self.required.contains(&field) {
            self.required.push(field);
        }
    }

    pub fn validators_for(&self, field: &str) -> &[(Arc<dyn Validator>, RuleParams)] {
        self.by_field.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn required_fields(&self) -> &[String] {
        &self.required
    }

    /// Run every registered validator against `fields`.
    ///
    /// Fields are visited in name order and validators in registration
    /// order, so the same input always yields the same list. Fields without
    /// validators are accepted unconditionally.
    pub fn validate_fields(&self, fields: &FieldMap) -> Vec<ErrorRecord> {
        let mut errors = Vec::new();
        for (name, value) in fields {
            for (validator, rules) in self.validators_for(name) {
                let messages = validator.validate(value, rules);
                if !messages.is_empty() {
                    debug!(field = %name, validator = validator.name(), failures = messages.len(), "Field rejected");
                }
                errors.extend(
                    messages
                        .into_iter()
                        .map(|msg| ErrorRecord::new(Stage::Validation, format!("Field '{name}': {msg}"))),
                );
            }
        }
        for name in &self.required {
            if !fields.contains_key(name) {
                errors.push(ErrorRecord::new(
                    Stage::Validation,
                    format!("Field '{name}': required field is missing"),
                ));
            }
        }
        errors
    }
}
