//! Pattern-based field retrieval.

use super::FieldRetriever;
use crate::document::{Document, FieldMap, FieldValue};
use crate::error::{ComponentError, DocProcError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// How a captured string becomes a [`FieldValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// The capture as-is (trimmed).
    #[default]
    Text,
    /// The capture parsed as `f64` after stripping currency symbols,
    /// whitespace and thousands separators.
    Number,
    /// `true` when the pattern matches anywhere, `false` otherwise.
    /// Always emitted.
    Flag,
}

/// One `field ← pattern` rule as written in a rule file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalRule {
    pub field: String,
    pub pattern: String,
    #[serde(default)]
    pub kind: FieldKind,
}

impl RetrievalRule {
    pub fn new(field: impl Into<String>, pattern: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            field: field.into(),
            pattern: pattern.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    field: String,
    regex: Regex,
    kind: FieldKind,
}

/// Ordered regex rules; the first match of each pattern wins.
///
/// The value is capture group 1 when the pattern has groups, otherwise the
/// whole match. Patterns that do not match leave the field out.
#[derive(Debug, Clone, Default)]
pub struct PatternFieldRetriever {
    rules: Vec<CompiledRule>,
}

impl PatternFieldRetriever {
    /// Compile `rules`, rejecting the first invalid pattern.
    pub fn new(rules: impl IntoIterator<Item = RetrievalRule>) -> Result<Self, DocProcError> {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let regex = Regex::new(&rule.pattern).map_err(|e| DocProcError::InvalidRule {
                    target: rule.field.clone(),
                    detail: e.to_string(),
                })?;
                Ok(CompiledRule {
                    field: rule.field,
                    regex,
                    kind: rule.kind,
                })
            })
            .collect::<Result<Vec<_>, DocProcError>>()?;
        Ok(Self { rules })
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.field.as_str())
    }

    /// Apply the rules to `text`.
    pub fn retrieve_from_text(&self, text: &str) -> Result<FieldMap, ComponentError> {
        let mut fields = FieldMap::new();
        for rule in &self.rules {
            if fields.contains_key(&rule.field) {
                continue;
            }
            if rule.kind == FieldKind::Flag {
                fields.insert(rule.field.clone(), FieldValue::Bool(rule.regex.is_match(text)));
                continue;
            }
            let Some(raw) = capture(&rule.regex, text) else {
                debug!(field = %rule.field, "Pattern not found");
                continue;
            };
            let value = match rule.kind {
                FieldKind::Number => match parse_number(raw) {
                    Some(n) => FieldValue::Number(n),
                    None => {
                        warn!(field = %rule.field, raw, "Captured value is not a number, field omitted");
                        continue;
                    }
                },
                _ => FieldValue::Text(raw.to_string()),
            };
            fields.insert(rule.field.clone(), value);
        }
        Ok(fields)
    }
}

impl FieldRetriever for PatternFieldRetriever {
    fn retrieve_fields(&self, doc: &Document) -> Result<FieldMap, ComponentError> {
        self.retrieve_from_text(doc.raw_text())
    }
}

fn capture<'t>(regex: &Regex, text: &'t str) -> Option<&'t str> {
    let caps = regex.captures(text)?;
    let m = if caps.len() > 1 { caps.get(1)? } else { caps.get(0)? };
    let s = m.as_str().trim();
    (!s.is_empty()).then_some(s)
}

fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | '¥' | ',' | '_') && !c.is_whitespace())
        .collect();
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoice_retriever() -> PatternFieldRetriever {
        PatternFieldRetriever::new([
            RetrievalRule::new("invoice_number", r"Invoice No[:\s]+([A-Z0-9-]+)", FieldKind::Text),
            RetrievalRule::new("date", r"Date[:\s]+(\d{4}-\d{2}-\d{2})", FieldKind::Text),
            RetrievalRule::new("total_amount", r"Total[:\s]+\$?([\d,]+\.?\d*)", FieldKind::Number),
        ])
        .unwrap()
    }

    #[test]
    fn extracts_invoice_fields() {
        let fields = invoice_retriever()
            .retrieve_from_text("ACME\nInvoice No: INV-001\nDate: 2024-01-31\nTotal: $1,200.50")
            .unwrap();
        assert_eq!(fields["invoice_number"], FieldValue::from("INV-001"));
        assert_eq!(fields["date"], FieldValue::from("2024-01-31"));
        assert_eq!(fields["total_amount"], FieldValue::Number(1200.5));
    }

    #[test]
    fn missing_patterns_are_omitted() {
        let fields = invoice_retriever()
            .retrieve_from_text("Invoice No: X-1")
            .unwrap();
        assert_eq!(fields.len(), 1);
        assert!(!fields.contains_key("total_amount"));
    }

    #[test]
    fn whole_match_without_groups() {
        let r = PatternFieldRetriever::new([RetrievalRule::new("code", r"[A-Z]{3}-\d+", FieldKind::Text)])
            .unwrap();
        let fields = r.retrieve_from_text("ref ABC-42 and XYZ-7").unwrap();
        assert_eq!(fields["code"], FieldValue::from("ABC-42"));
    }

    #[test]
    fn flags_always_present() {
        let r = PatternFieldRetriever::new([RetrievalRule::new("signed", r"(?i)firma", FieldKind::Flag)])
            .unwrap();
        assert_eq!(r.retrieve_from_text("Firma: ___").unwrap()["signed"], FieldValue::Bool(true));
        assert_eq!(r.retrieve_from_text("nothing").unwrap()["signed"], FieldValue::Bool(false));
    }

    #[test]
    fn unparseable_number_is_omitted() {
        let r = PatternFieldRetriever::new([
            RetrievalRule::new("invoice_number", r"Invoice No: (\S+)", FieldKind::Text),
            RetrievalRule::new("total", r"Total: (\S+)", FieldKind::Number),
        ])
        .unwrap();
        let fields = r.retrieve_from_text("Invoice No: INV-001\nTotal: 1.2.3").unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["invoice_number"], FieldValue::from("INV-001"));
    }

    #[test]
    fn later_rule_can_supply_an_unparseable_number() {
        let r = PatternFieldRetriever::new([
            RetrievalRule::new("total", r"Total: (\S+)", FieldKind::Number),
            RetrievalRule::new("total", r"Amount due: (\S+)", FieldKind::Number),
        ])
        .unwrap();
        let fields = r.retrieve_from_text("Total: n/a\nAmount due: 42.50").unwrap();
        assert_eq!(fields["total"], FieldValue::Number(42.5));
    }

    #[test]
    fn invalid_pattern_rejected_at_build_time() {
        let err = PatternFieldRetriever::new([RetrievalRule::new("broken", r"(unclosed", FieldKind::Text)])
            .unwrap_err();
        assert!(matches!(err, DocProcError::InvalidRule { ref target, .. } if target == "broken"));
    }

    #[test]
    fn number_cleanup() {
        assert_eq!(parse_number("$ 1,000"), Some(1000.0));
        assert_eq!(parse_number("€200.00"), Some(200.0));
        assert_eq!(parse_number("abc"), None);
    }

    #[test]
    fn rule_kind_defaults_to_text() {
        let rule: RetrievalRule =
            serde_json::from_str(r#"{"field": "rut", "pattern": "RUT: (\\S+)"}"#).unwrap();
        assert_eq!(rule.kind, FieldKind::Text);
    }
}
