//! Built-in field validators.
//!
//! Each kind reads its own keys from [`RuleParams`]:
//!
//! | Kind             | Keys                                                        |
//! |------------------|-------------------------------------------------------------|
//! | `length`         | `min_length`, `max_length`                                  |
//! | `regex`          | `pattern` (matched at the start of the value)               |
//! | `date_format`    | `format`, `not_after`, `not_before`, `not_in_future`        |
//! | `allowed_values` | `allowed_values`                                            |
//! | `numeric_range`  | `min`, `max`                                                |
//! | `required_true`  | none                                                        |
//!
//! `length` and `regex` see a value in its display form: numbers print in
//! their shortest form (`200.0` is `"200"`, `1200.5` is `"1200.5"`) and
//! booleans as `true`/`false`.
//!
//! Missing or malformed rule keys are reported as validation messages rather
//! than panics, so a bad rule surfaces on the document that hit it.

use super::{RuleParams, Validator};
use crate::document::FieldValue;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

static ISO_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());
static DMY_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{2}/\d{2}/\d{4}$").unwrap());

/// The closed set of built-in validators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorKind {
    Length,
    Regex,
    DateFormat,
    AllowedValues,
    NumericRange,
    RequiredTrue,
}

impl ValidatorKind {
    pub const ALL: [ValidatorKind; 6] = [
        ValidatorKind::Length,
        ValidatorKind::Regex,
        ValidatorKind::DateFormat,
        ValidatorKind::AllowedValues,
        ValidatorKind::NumericRange,
        ValidatorKind::RequiredTrue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidatorKind::Length => "length",
            ValidatorKind::Regex => "regex",
            ValidatorKind::DateFormat => "date_format",
            ValidatorKind::AllowedValues => "allowed_values",
            ValidatorKind::NumericRange => "numeric_range",
            ValidatorKind::RequiredTrue => "required_true",
        }
    }
}

impl fmt::Display for ValidatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ValidatorKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown validator kind '{s}'"))
    }
}

impl Validator for ValidatorKind {
    fn name(&self) -> &str {
        self.as_str()
    }

    fn validate(&self, value: &FieldValue, rules: &RuleParams) -> Vec<String> {
        match self {
            ValidatorKind::Length => validate_length(value, rules),
            ValidatorKind::Regex => validate_regex(value, rules),
            ValidatorKind::DateFormat => validate_date(value, rules),
            ValidatorKind::AllowedValues => validate_allowed(value, rules),
            ValidatorKind::NumericRange => validate_range(value, rules),
            ValidatorKind::RequiredTrue => validate_true(value),
        }
    }
}

fn validate_length(value: &FieldValue, rules: &RuleParams) -> Vec<String> {
    let data = value.to_string();
    let len = data.chars().count();
    let mut errors = Vec::new();
    if let Some(min) = rules.get_usize("min_length") {
        if len < min {
            errors.push(format!("Data '{data}' is shorter than minimum length {min}."));
        }
    }
    if let Some(max) = rules.get_usize("max_length") {
        if len > max {
            errors.push(format!("Data '{data}' is longer than maximum length {max}."));
        }
    }
    errors
}

fn validate_regex(value: &FieldValue, rules: &RuleParams) -> Vec<String> {
    let Some(pattern) = rules.get_str("pattern").filter(|p| !p.is_empty()) else {
        return vec!["Regex pattern not provided in rules.".to_string()];
    };
    let re = match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => return vec![format!("Invalid regex pattern '{pattern}': {e}")],
    };
    let data = value.to_string();
    let matches_at_start = re.find(&data).is_some_and(|m| m.start() == 0);
    if matches_at_start {
        Vec::new()
    } else {
        vec![format!("Data '{data}' does not match pattern '{pattern}'.")]
    }
}

fn validate_date(value: &FieldValue, rules: &RuleParams) -> Vec<String> {
    let Some(format) = rules.get_str("format") else {
        return vec!["Date format not provided in rules.".to_string()];
    };
    let day_first = match format {
        "YYYY-MM-DD" => false,
        "DD/MM/YYYY" => true,
        other => {
            return vec![format!(
                "Unsupported date format rule: {other}. Supported formats are 'YYYY-MM-DD' and 'DD/MM/YYYY'."
            )]
        }
    };

    let data = value.to_string();
    let shaped = if day_first {
        DMY_DATE.is_match(&data)
    } else {
        ISO_DATE.is_match(&data)
    };
    if value.as_text().is_none() || !shaped {
        return vec![format!("Date '{data}' is not in {format} format.")];
    }
    let parts = if day_first { split_dmy(&data) } else { split_iso(&data) };
    let Some((year, month, day)) = parts else {
        return vec![format!("Date '{data}' is not a valid date structure.")];
    };
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return vec![format!("Date '{data}' contains invalid month or day numbers.")];
    }
    let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
        return vec![format!("Date '{data}' is not a valid calendar date.")];
    };

    let mut errors = Vec::new();
    match bound(rules, "not_after") {
        Some(Ok(limit)) if date > limit => {
            errors.push(format!("Date '{data}' is after the latest allowed date {limit}."))
        }
        Some(Err(msg)) => errors.push(msg),
        _ => {}
    }
    match bound(rules, "not_before") {
        Some(Ok(limit)) if date < limit => {
            errors.push(format!("Date '{data}' is before the earliest allowed date {limit}."))
        }
        Some(Err(msg)) => errors.push(msg),
        _ => {}
    }
    if rules.get_bool("not_in_future") == Some(true) && date > chrono::Local::now().date_naive() {
        errors.push(format!("Date '{data}' is in the future."));
    }
    errors
}

fn split_iso(s: &str) -> Option<(i32, u32, u32)> {
    let mut parts = s.split('-');
    let y = parts.next()?.parse().ok()?;
    let m = parts.next()?.parse().ok()?;
    let d = parts.next()?.parse().ok()?;
    Some((y, m, d))
}

fn split_dmy(s: &str) -> Option<(i32, u32, u32)> {
    let mut parts = s.split('/');
    let d = parts.next()?.parse().ok()?;
    let m = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    Some((y, m, d))
}

fn bound(rules: &RuleParams, key: &str) -> Option<Result<NaiveDate, String>> {
    let raw = rules.get_str(key)?;
    Some(
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| format!("Invalid '{key}' bound '{raw}'; expected YYYY-MM-DD.")),
    )
}

fn validate_allowed(value: &FieldValue, rules: &RuleParams) -> Vec<String> {
    let Some(allowed) = rules.get("allowed_values") else {
        return vec!["Allowed values not provided in rules.".to_string()];
    };
    let Some(list) = allowed.as_array() else {
        return vec!["Allowed values rule must be a list.".to_string()];
    };
    if list.iter().any(|candidate| same_value(value, candidate)) {
        Vec::new()
    } else {
        vec![format!(
            "Data '{value}' is not in the list of allowed values: {allowed}."
        )]
    }
}

fn same_value(value: &FieldValue, candidate: &Value) -> bool {
    match (value, candidate) {
        (FieldValue::Text(s), Value::String(c)) => s == c,
        (FieldValue::Number(n), Value::Number(c)) => c.as_f64() == Some(*n),
        (FieldValue::Bool(b), Value::Bool(c)) => b == c,
        _ => false,
    }
}

fn validate_range(value: &FieldValue, rules: &RuleParams) -> Vec<String> {
    let min = rules.get_f64("min");
    let max = rules.get_f64("max");
    if min.is_none() && max.is_none() {
        return vec!["Numeric range not provided in rules.".to_string()];
    }
    let Some(n) = value.as_f64() else {
        return vec![format!("Data '{value}' is not a number.")];
    };
    let mut errors = Vec::new();
    if let Some(min) = min.filter(|min| n < *min) {
        errors.push(format!("Data '{value}' is below minimum {min}."));
    }
    if let Some(max) = max.filter(|max| n > *max) {
        errors.push(format!("Data '{value}' is above maximum {max}."));
    }
    errors
}

fn validate_true(value: &FieldValue) -> Vec<String> {
    if value.as_bool() == Some(true) {
        Vec::new()
    } else {
        vec![format!("Data '{value}' must be true.")]
    }
}
