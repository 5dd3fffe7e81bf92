//! Check records as emitted by `ipa-healthcheck --output-type json`.
//!
//! A report is a JSON array of objects such as:
//!
//! ```json
//! [{"source": "ipahealthcheck.meta.services", "check": "krb5kdc",
//!   "result": "SUCCESS", "uuid": "...", "when": "20250101000000Z",
//!   "duration": "0.01", "kw": {"status": true}}]
//! ```

use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fmt;
use strum_macros::EnumString;

use crate::error::ExporterError;

/// Outcome of a single check.
///
/// Parsing is case-sensitive. Anything other than the four documented values
/// lands in `Unknown` and is treated as not successful.
#[derive(Debug, Clone, PartialEq, Eq, EnumString, Deserialize)]
#[serde(from = "String")]
pub enum CheckResult {
    #[strum(serialize = "SUCCESS")]
    Success,
    #[strum(serialize = "WARNING")]
    Warning,
    #[strum(serialize = "ERROR")]
    Error,
    #[strum(serialize = "CRITICAL")]
    Critical,
    #[strum(default)]
    Unknown(String),
}

impl CheckResult {
    /// The result exactly as the tool reported it.
    pub fn as_str(&self) -> &str {
        match self {
            CheckResult::Success => "SUCCESS",
            CheckResult::Warning => "WARNING",
            CheckResult::Error => "ERROR",
            CheckResult::Critical => "CRITICAL",
            CheckResult::Unknown(raw) => raw,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CheckResult::Success)
    }

    /// Lower-cased result, used as a label value.
    pub fn label(&self) -> String {
        self.as_str().to_lowercase()
    }

    /// Gauge value: 1 for success, 0 for everything else.
    pub fn gauge_value(&self) -> f64 {
        if self.is_success() {
            1.0
        } else {
            0.0
        }
    }
}

impl From<String> for CheckResult {
    fn from(raw: String) -> Self {
        match raw.parse() {
            Ok(result) => result,
            Err(_) => CheckResult::Unknown(raw),
        }
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single keyword value. The set of keys differs from check to check.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum KeywordValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<KeywordValue>),
    Map(BTreeMap<String, KeywordValue>),
}

impl KeywordValue {
    pub fn kind(&self) -> &'static str {
        match self {
            KeywordValue::Null => "null",
            KeywordValue::Bool(_) => "boolean",
            KeywordValue::Number(_) => "number",
            KeywordValue::Text(_) => "string",
            KeywordValue::List(_) => "list",
            KeywordValue::Map(_) => "map",
        }
    }

    /// Renders a scalar value as text. `Null`, lists and maps yield `None`.
    ///
    /// Whole numbers are written without a fractional part (`42`, not `42.0`).
    pub fn scalar_text(&self) -> Option<String> {
        match self {
            KeywordValue::Text(value) => Some(value.clone()),
            KeywordValue::Bool(value) => Some(value.to_string()),
            KeywordValue::Number(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
                Some(format!("{}", *value as i64))
            }
            KeywordValue::Number(value) => Some(value.to_string()),
            KeywordValue::Null | KeywordValue::List(_) | KeywordValue::Map(_) => None,
        }
    }
}

impl From<f64> for KeywordValue {
    fn from(value: f64) -> Self {
        KeywordValue::Number(value)
    }
}

impl From<bool> for KeywordValue {
    fn from(value: bool) -> Self {
        KeywordValue::Bool(value)
    }
}

impl From<&str> for KeywordValue {
    fn from(value: &str) -> Self {
        KeywordValue::Text(value.to_string())
    }
}

/// Check-specific detail attached to a record (`kw` in the tool's output).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Keywords(BTreeMap<String, KeywordValue>);

impl Keywords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<KeywordValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&KeywordValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Extracts a string keyword.
    ///
    /// Absent and `null` both yield `Ok(None)`. Any non-string value is a
    /// `FieldDecode` error naming `check`.
    pub fn text(&self, check: &str, key: &str) -> Result<Option<&str>, ExporterError> {
        match self.0.get(key) {
            None | Some(KeywordValue::Null) => Ok(None),
            Some(KeywordValue::Text(value)) => Ok(Some(value)),
            Some(other) => Err(ExporterError::field_decode(
                check,
                key,
                format!("expected a string, found {}", other.kind()),
            )),
        }
    }
}

impl<K: Into<String>, V: Into<KeywordValue>> FromIterator<(K, V)> for Keywords {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Keywords(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// One diagnostic finding.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CheckRecord {
    #[serde(default)]
    pub source: String,
    pub check: String,
    pub result: CheckResult,
    #[serde(rename = "kw", alias = "keywords", default, deserialize_with = "null_as_default")]
    pub keywords: Keywords,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub when: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
}

impl CheckRecord {
    pub fn new(source: &str, check: &str, result: &str) -> Self {
        CheckRecord {
            source: source.to_string(),
            check: check.to_string(),
            result: CheckResult::from(result.to_string()),
            keywords: Keywords::new(),
            uuid: None,
            when: None,
            duration: None,
        }
    }

    pub fn with_keyword(mut self, key: &str, value: impl Into<KeywordValue>) -> Self {
        self.keywords.insert(key, value);
        self
    }
}

fn null_as_default<'de, D>(deserializer: D) -> Result<Keywords, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Keywords>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Decodes a report produced by the tool.
pub fn parse_report(content: &str) -> Result<Vec<CheckRecord>, serde_json::Error> {
    serde_json::from_str(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_report() {
        let content = r#"[
            {"source": "ipahealthcheck.meta.services", "check": "krb5kdc",
             "result": "SUCCESS", "uuid": "b1d2", "when": "20250101000000Z",
             "duration": "0.02", "kw": {"status": true}},
            {"source": "ipahealthcheck.ipa.certs", "check": "IPACertmongerExpirationCheck",
             "result": "WARNING", "kw": {"key": "req-42", "expiration_date": "20251231235900Z",
             "days": 12, "items": ["a", null]}}
        ]"#;

        let checks = parse_report(content).unwrap();
        assert_eq!(checks.len(), 2);
        assert_eq!(checks[0].check, "krb5kdc");
        assert_eq!(checks[0].result, CheckResult::Success);
        assert_eq!(checks[0].uuid.as_deref(), Some("b1d2"));
        assert_eq!(checks[0].keywords.get("status"), Some(&KeywordValue::Bool(true)));
        assert_eq!(checks[1].result, CheckResult::Warning);
        assert_eq!(checks[1].keywords.get("days"), Some(&KeywordValue::Number(12.0)));
        assert_eq!(
            checks[1].keywords.text("IPACertmongerExpirationCheck", "key").unwrap(),
            Some("req-42")
        );
    }

    #[test]
    fn test_missing_or_null_keywords() {
        let content = r#"[
            {"check": "ReplicationConflictCheck", "result": "ERROR"},
            {"source": "s", "check": "c", "result": "SUCCESS", "kw": null},
            {"source": "s", "check": "c", "result": "SUCCESS", "keywords": {"msg": "ok"}}
        ]"#;

        let checks = parse_report(content).unwrap();
        assert_eq!(checks[0].source, "");
        assert!(checks[0].keywords.is_empty());
        assert!(checks[1].keywords.is_empty());
        assert_eq!(checks[2].keywords.text("c", "msg").unwrap(), Some("ok"));
    }

    #[test]
    fn test_result_is_case_sensitive() {
        assert_eq!(CheckResult::from("SUCCESS".to_string()), CheckResult::Success);
        assert_eq!(CheckResult::from("CRITICAL".to_string()), CheckResult::Critical);
        let lower = CheckResult::from("success".to_string());
        assert_eq!(lower, CheckResult::Unknown("success".to_string()));
        assert!(!lower.is_success());
        assert_eq!(lower.gauge_value(), 0.0);
        assert_eq!(CheckResult::from("WARNING".to_string()).label(), "warning");
        assert_eq!(CheckResult::from("Degraded".to_string()).label(), "degraded");
    }

    #[test]
    fn test_text_keyword_type_mismatch() {
        let keywords: Keywords = vec![("msg", KeywordValue::Number(3.0))].into_iter().collect();
        let err = keywords.text("ReplicationCheck", "msg").unwrap_err();
        assert!(matches!(err, ExporterError::FieldDecode { .. }));
        assert!(keywords.text("ReplicationCheck", "absent").unwrap().is_none());
    }

    #[test]
    fn test_record_result_from_text() {
        let warning = CheckRecord::new("ipahealthcheck.ipa.certs", "IPACertmongerExpirationCheck", "WARNING");
        assert_eq!(warning.result, CheckResult::Warning);

        let other = CheckRecord::new("ipahealthcheck.meta.services", "httpd", "Running");
        assert_eq!(other.result, CheckResult::Unknown("Running".to_string()));
        assert_eq!(other.result.label(), "running");
        assert!(!other.result.is_success());
    }

    #[test]
    fn test_scalar_text() {
        assert_eq!(KeywordValue::from("in sync").scalar_text().as_deref(), Some("in sync"));
        assert_eq!(KeywordValue::Number(42.0).scalar_text().as_deref(), Some("42"));
        assert_eq!(KeywordValue::Number(-1.5).scalar_text().as_deref(), Some("-1.5"));
        assert_eq!(KeywordValue::Bool(false).scalar_text().as_deref(), Some("false"));
        assert_eq!(KeywordValue::Null.scalar_text(), None);
        assert_eq!(KeywordValue::List(vec![]).scalar_text(), None);
        assert_eq!(KeywordValue::Map(BTreeMap::new()).scalar_text(), None);
    }

    #[test]
    fn test_invalid_report() {
        assert!(parse_report("{\"check\": \"not an array\"}").is_err());
        assert!(parse_report("[{\"check\": \"c\"}]").is_err());
    }
}
