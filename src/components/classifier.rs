//! Rule-table classifiers.

use super::Classifier;
use crate::document::{Document, TypeTag, UNKNOWN_TYPE};
use crate::error::ComponentError;
use std::sync::Arc;
use tracing::debug;

/// Ordered `(type_tag, keywords)` table.
///
/// The first rule with any keyword present in the lower-cased text wins,
/// even if a later rule matches more keywords.
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier {
    rules: Vec<(TypeTag, Vec<String>)>,
}

impl KeywordClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule. Keywords are matched case-insensitively; blank
    /// keywords are dropped since they would match every document.
    pub fn with_rule<I, S>(mut self, type_tag: impl Into<TypeTag>, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        self.rules.push((type_tag.into(), keywords));
        self
    }

    pub fn rules(&self) -> &[(TypeTag, Vec<String>)] {
        &self.rules
    }

    /// Tag for raw text, independent of any document.
    pub fn classify_text(&self, text: &str) -> TypeTag {
        let haystack = text.to_lowercase();
        for (tag, keywords) in &self.rules {
            if let Some(hit) = keywords.iter().find(|k| haystack.contains(k.as_str())) {
                debug!(tag = %tag, keyword = %hit, "Keyword rule matched");
                return tag.clone();
            }
        }
        UNKNOWN_TYPE.to_string()
    }
}

impl Classifier for KeywordClassifier {
    fn classify(&self, doc: &Document) -> Result<TypeTag, ComponentError> {
        Ok(self.classify_text(doc.raw_text()))
    }
}

/// Asks each inner classifier in turn and returns the first tag that is not
/// `unknown`. Faults from an inner classifier are propagated.
#[derive(Clone, Default)]
pub struct ClassifierChain {
    inner: Vec<Arc<dyn Classifier>>,
}

impl ClassifierChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.inner.push(classifier);
        self
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Classifier for ClassifierChain {
    fn classify(&self, doc: &Document) -> Result<TypeTag, ComponentError> {
        for classifier in &self.inner {
            let tag = classifier.classify(doc)?;
            if tag != UNKNOWN_TYPE {
                return Ok(tag);
            }
        }
        Ok(UNKNOWN_TYPE.to_string())
    }
}
