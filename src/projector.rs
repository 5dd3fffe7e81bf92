//! Projection of check records into metric observations.
//!
//! Every rule is evaluated on its own for every record, so one record may
//! produce several observations:
//!
//! - each live-report record yields one `ipa_service_state` observation;
//! - logged-report records listed in the rule table with `scrape = true` yield
//!   one observation against the table's descriptor;
//! - `ReplicationCheck` records yield one `ipa_replication_check_detail`
//!   observation carrying the `msg` keyword;
//! - `IPACertmongerExpirationCheck` records in WARNING or ERROR state yield one
//!   `ipa_cert_expiration` observation whose value is the expiry time in
//!   seconds since the epoch.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::check::{CheckRecord, CheckResult, KeywordValue};
use crate::error::ExporterError;

/// A metric family observations are emitted against.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct MetricDescriptor {
    pub name: &'static str,
    pub help: &'static str,
    pub labels: &'static [&'static str],
}

pub static SERVICE_STATE: MetricDescriptor = MetricDescriptor {
    name: "ipa_service_state",
    help: "State of the services monitored by IPA healthcheck (1: running, 0: not running)",
    labels: &["service", "state"],
};

pub static REPLICATION_CHECK: MetricDescriptor = MetricDescriptor {
    name: "ipa_replication_check",
    help: "Replication checks (1: success, 0: failure)",
    labels: &["check", "severity"],
};

pub static DOGTAG_CONNECTIVITY_CHECK: MetricDescriptor = MetricDescriptor {
    name: "ipa_dogtag_connectivity_check",
    help: "Dogtag connectivity check (1: success, 0: failure)",
    labels: &["check", "severity"],
};

pub static REPLICATION_DETAIL: MetricDescriptor = MetricDescriptor {
    name: "ipa_replication_check_detail",
    help: "Replication check with the reported message (1: success, 0: failure)",
    labels: &["check", "severity", "message"],
};

pub static CERT_EXPIRATION: MetricDescriptor = MetricDescriptor {
    name: "ipa_cert_expiration",
    help: "Expiration date of the certificates in warning or error state (unix timestamp)",
    labels: &["check", "certificate_request_id", "severity"],
};

/// Every descriptor the projector can emit against.
pub static DESCRIPTORS: [&MetricDescriptor; 5] = [
    &SERVICE_STATE,
    &REPLICATION_CHECK,
    &DOGTAG_CONNECTIVITY_CHECK,
    &REPLICATION_DETAIL,
    &CERT_EXPIRATION,
];

pub const REPLICATION_CHECK_NAME: &str = "ReplicationCheck";
pub const CERT_EXPIRATION_CHECK_NAME: &str = "IPACertmongerExpirationCheck";
pub const CERT_SOURCE: &str = "ipahealthcheck.ipa.certs";
const SOURCE_PREFIX: &str = "ipahealthcheck.";
const NIL_MESSAGE: &str = "nil";

/// One data point ready for export.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricObservation {
    pub descriptor: &'static MetricDescriptor,
    pub value: f64,
    /// Label values, in the order of `descriptor.labels`
    pub labels: Vec<String>,
}

impl MetricObservation {
    fn new(descriptor: &'static MetricDescriptor, value: f64, labels: Vec<String>) -> Self {
        debug_assert_eq!(descriptor.labels.len(), labels.len());
        MetricObservation {
            descriptor,
            value,
            labels,
        }
    }
}

/// Static configuration of a logged check.
#[derive(Debug, Clone, Copy)]
pub struct ScrapedCheckRule {
    pub scrape: bool,
    pub descriptor: &'static MetricDescriptor,
}

/// Check name to rule. Several checks may share one descriptor.
pub type RuleTable = HashMap<&'static str, ScrapedCheckRule>;

/// Builds the rule table for the checks this exporter knows about.
///
/// `ReplicationCheck` and `IPACertmongerExpirationCheck` are declared but not
/// scraped through the table; they have dedicated projections.
pub fn default_rules() -> RuleTable {
    let mut rules = HashMap::new();
    rules.insert(
        "ReplicationConflictCheck",
        ScrapedCheckRule {
            scrape: true,
            descriptor: &REPLICATION_CHECK,
        },
    );
    rules.insert(
        REPLICATION_CHECK_NAME,
        ScrapedCheckRule {
            scrape: false,
            descriptor: &REPLICATION_CHECK,
        },
    );
    rules.insert(
        "DogtagCertsConnectivityCheck",
        ScrapedCheckRule {
            scrape: true,
            descriptor: &DOGTAG_CONNECTIVITY_CHECK,
        },
    );
    rules.insert(
        CERT_EXPIRATION_CHECK_NAME,
        ScrapedCheckRule {
            scrape: false,
            descriptor: &CERT_EXPIRATION,
        },
    );
    rules
}

lazy_static! {
    /// Process-wide rule table, built on first use and never modified.
    pub static ref SCRAPED_CHECKS: RuleTable = default_rules();
}

/// Projects both reports into observations. Pure: no I/O besides logging.
///
/// # Arguments
///
/// * `live` - Records of the on-demand run; each yields one `ipa_service_state`
/// * `logged` - Records of the background runs, matched against `rules` and
///   the replication and certificate projections
/// * `rules` - Check name to descriptor table, usually [`SCRAPED_CHECKS`]
///
/// # Returns
///
/// Observations in input order: all live ones first, then for each logged
/// record its table, replication and certificate observations.
///
/// # Example
///
/// ```
/// # use ipa_healthcheck_exporter::{project, CheckRecord, SCRAPED_CHECKS};
/// let logged = vec![CheckRecord::new("", "ReplicationConflictCheck", "ERROR")];
/// let observations = project(&[], &logged, &SCRAPED_CHECKS);
///
/// assert_eq!(observations[0].descriptor.name, "ipa_replication_check");
/// assert_eq!(observations[0].value, 0.0);
/// ```
pub fn project(
    live: &[CheckRecord],
    logged: &[CheckRecord],
    rules: &RuleTable,
) -> Vec<MetricObservation> {
    let mut observations = Vec::with_capacity(live.len() + logged.len());

    for record in live {
        observations.push(service_state(record));
    }

    for record in logged {
        if let Some(observation) = rule_table(record, rules) {
            observations.push(observation);
        }
        if let Some(observation) = replication_detail(record) {
            observations.push(observation);
        }
        if let Some(observation) = cert_expiration(record) {
            observations.push(observation);
        }
    }

    debug!(
        live = live.len(),
        logged = logged.len(),
        observations = observations.len(),
        "projected checks"
    );
    observations
}

fn service_state(record: &CheckRecord) -> MetricObservation {
    MetricObservation::new(
        &SERVICE_STATE,
        record.result.gauge_value(),
        vec![record.check.clone(), record.result.label()],
    )
}

fn rule_table(record: &CheckRecord, rules: &RuleTable) -> Option<MetricObservation> {
    let rule = rules.get(record.check.as_str()).filter(|rule| rule.scrape)?;
    Some(MetricObservation::new(
        rule.descriptor,
        record.result.gauge_value(),
        vec![record.check.clone(), record.result.label()],
    ))
}

fn replication_detail(record: &CheckRecord) -> Option<MetricObservation> {
    if record.check != REPLICATION_CHECK_NAME {
        return None;
    }
    let message = match record.keywords.get("msg") {
        None | Some(KeywordValue::Null) => NIL_MESSAGE.to_string(),
        Some(value) => value.scalar_text().unwrap_or_else(|| {
            let err = ExporterError::field_decode(
                &record.check,
                "msg",
                format!("expected a scalar, found {}", value.kind()),
            );
            warn!("{}", err);
            NIL_MESSAGE.to_string()
        }),
    };
    Some(MetricObservation::new(
        &REPLICATION_DETAIL,
        record.result.gauge_value(),
        vec![record.check.clone(), record.result.label(), message],
    ))
}

fn is_cert_source(source: &str) -> bool {
    let short = &CERT_SOURCE[SOURCE_PREFIX.len()..];
    source == CERT_SOURCE || source == short
}

fn cert_expiration(record: &CheckRecord) -> Option<MetricObservation> {
    if !is_cert_source(&record.source) || record.check != CERT_EXPIRATION_CHECK_NAME {
        return None;
    }
    if !matches!(record.result, CheckResult::Warning | CheckResult::Error) {
        return None;
    }

    let request_id = match record.keywords.text(&record.check, "key") {
        Ok(key) => key.unwrap_or_default(),
        Err(err) => {
            warn!("{}", err);
            return None;
        }
    };

    let expires_at = record
        .keywords
        .text(&record.check, "expiration_date")
        .and_then(|value| {
            let value = value.ok_or_else(|| {
                ExporterError::field_decode(&record.check, "expiration_date", "missing")
            })?;
            parse_expiration_date(value)
                .map_err(|reason| ExporterError::field_decode(&record.check, "expiration_date", reason))
        });

    match expires_at {
        Ok(seconds) => Some(MetricObservation::new(
            &CERT_EXPIRATION,
            seconds as f64,
            vec![
                record.check.clone(),
                request_id.to_string(),
                record.result.label(),
            ],
        )),
        Err(err) => {
            warn!(certificate_request_id = request_id, "{}", err);
            None
        }
    }
}

/// Parses a `YYYYMMDDHHMMSSZ` UTC timestamp into seconds since the epoch.
pub fn parse_expiration_date(value: &str) -> Result<i64, String> {
    let bytes = value.as_bytes();
    if bytes.len() != 15
        || bytes[14] != b'Z'
        || !bytes[..14].iter().all(|b| b.is_ascii_digit())
    {
        return Err(format!("'{}' is not a YYYYMMDDHHMMSSZ timestamp", value));
    }

    // All 14 leading bytes are ASCII digits, so these slices cannot fail.
    let field = |range: std::ops::Range<usize>| -> u32 {
        value[range].bytes().fold(0, |acc, b| acc * 10 + u32::from(b - b'0'))
    };

    NaiveDate::from_ymd_opt(field(0..4) as i32, field(4..6), field(6..8))
        .and_then(|date| date.and_hms_opt(field(8..10), field(10..12), field(12..14)))
        .map(|datetime| datetime.and_utc().timestamp())
        .ok_or_else(|| format!("'{}' is not a valid date", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn logged(records: &[CheckRecord]) -> Vec<MetricObservation> {
        project(&[], records, &SCRAPED_CHECKS)
    }

    fn labels(observation: &MetricObservation) -> Vec<&str> {
        observation.labels.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_service_state_success() {
        let live = vec![CheckRecord::new("meta.services", "krb5kdc", "SUCCESS")];
        let observations = project(&live, &[], &SCRAPED_CHECKS);

        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].descriptor, &SERVICE_STATE);
        assert_eq!(observations[0].value, 1.0);
        assert_eq!(labels(&observations[0]), vec!["krb5kdc", "success"]);
    }

    #[test]
    fn test_service_state_one_per_live_record() {
        let live = vec![
            CheckRecord::new("ipahealthcheck.meta.services", "httpd", "ERROR"),
            CheckRecord::new("ipahealthcheck.meta.services", "sssd", "success"),
            CheckRecord::new("ipahealthcheck.meta.services", "ReplicationConflictCheck", "CRITICAL"),
        ];
        let observations = project(&live, &[], &SCRAPED_CHECKS);

        assert_eq!(observations.len(), 3);
        assert!(observations.iter().all(|o| o.descriptor == &SERVICE_STATE));
        assert!(observations.iter().all(|o| o.value == 0.0));
        assert_eq!(labels(&observations[1]), vec!["sssd", "success"]);
        assert_eq!(labels(&observations[2])[1], "critical");
    }

    #[test]
    fn test_rule_table_hit() {
        let observations = logged(&[CheckRecord::new("", "ReplicationConflictCheck", "ERROR")]);

        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].descriptor, &REPLICATION_CHECK);
        assert_eq!(observations[0].value, 0.0);
        assert_eq!(labels(&observations[0]), vec!["ReplicationConflictCheck", "error"]);
    }

    #[test]
    fn test_rule_table_miss_and_disabled() {
        let observations = logged(&[
            CheckRecord::new("ipahealthcheck.ipa.files", "IPAFileCheck", "ERROR"),
            CheckRecord::new(CERT_SOURCE, CERT_EXPIRATION_CHECK_NAME, "SUCCESS"),
        ]);
        assert!(observations.is_empty());
    }

    #[test]
    fn test_rule_table_shared_descriptor() {
        let mut rules = default_rules();
        rules.insert(
            "ReplicationChangelogCheck",
            ScrapedCheckRule {
                scrape: true,
                descriptor: &REPLICATION_CHECK,
            },
        );
        let records = vec![
            CheckRecord::new("", "ReplicationConflictCheck", "SUCCESS"),
            CheckRecord::new("", "ReplicationChangelogCheck", "WARNING"),
        ];
        let observations = project(&[], &records, &rules);

        assert_eq!(observations.len(), 2);
        assert!(observations.iter().all(|o| o.descriptor == &REPLICATION_CHECK));
        assert_eq!(observations[0].value, 1.0);
        assert_eq!(labels(&observations[1]), vec!["ReplicationChangelogCheck", "warning"]);
    }

    #[test]
    fn test_rule_table_is_only_for_logged_report() {
        let live = vec![CheckRecord::new("", "DogtagCertsConnectivityCheck", "SUCCESS")];
        let observations = project(&live, &[], &SCRAPED_CHECKS);
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].descriptor, &SERVICE_STATE);
    }

    #[test]
    fn test_replication_detail_with_message() {
        let record = CheckRecord::new("ipahealthcheck.ds.replication", REPLICATION_CHECK_NAME, "SUCCESS")
            .with_keyword("msg", "in sync");
        let observations = logged(&[record]);

        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].descriptor, &REPLICATION_DETAIL);
        assert_eq!(observations[0].value, 1.0);
        assert_eq!(labels(&observations[0]), vec!["ReplicationCheck", "success", "in sync"]);
    }

    #[test]
    fn test_replication_detail_without_message() {
        let absent = CheckRecord::new("", REPLICATION_CHECK_NAME, "ERROR");
        let null = CheckRecord::new("", REPLICATION_CHECK_NAME, "ERROR")
            .with_keyword("msg", KeywordValue::Null);
        let observations = logged(&[absent, null]);

        assert_eq!(observations.len(), 2);
        for observation in &observations {
            assert_eq!(observation.value, 0.0);
            assert_eq!(labels(observation), vec!["ReplicationCheck", "error", "nil"]);
        }
    }

    #[test]
    fn test_replication_detail_scalar_message() {
        let number = CheckRecord::new("", REPLICATION_CHECK_NAME, "ERROR").with_keyword("msg", 42.0);
        let boolean = CheckRecord::new("", REPLICATION_CHECK_NAME, "SUCCESS").with_keyword("msg", true);
        let observations = logged(&[number, boolean]);

        assert_eq!(observations.len(), 2);
        assert_eq!(labels(&observations[0]), vec!["ReplicationCheck", "error", "42"]);
        assert_eq!(labels(&observations[1]), vec!["ReplicationCheck", "success", "true"]);
    }

    #[test]
    fn test_replication_detail_structured_message_is_nil() {
        let list = CheckRecord::new("", REPLICATION_CHECK_NAME, "ERROR")
            .with_keyword("msg", KeywordValue::List(vec![KeywordValue::from("a")]));
        let map = CheckRecord::new("", REPLICATION_CHECK_NAME, "ERROR")
            .with_keyword("msg", KeywordValue::Map(BTreeMap::new()));
        let observations = logged(&[list, map]);

        assert_eq!(observations.len(), 2);
        for observation in &observations {
            assert_eq!(observation.descriptor, &REPLICATION_DETAIL);
            assert_eq!(labels(observation), vec!["ReplicationCheck", "error", "nil"]);
        }
    }

    #[test]
    fn test_cert_expiration_warning() {
        let record = CheckRecord::new("ipa.certs", CERT_EXPIRATION_CHECK_NAME, "WARNING")
            .with_keyword("expiration_date", "20251231235900Z")
            .with_keyword("key", "req-42");
        let observations = logged(&[record]);

        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].descriptor, &CERT_EXPIRATION);
        assert_eq!(observations[0].value, 1_767_225_540.0);
        assert_eq!(
            labels(&observations[0]),
            vec!["IPACertmongerExpirationCheck", "req-42", "warning"]
        );
    }

    #[test]
    fn test_cert_expiration_error_with_full_source() {
        let record = CheckRecord::new(CERT_SOURCE, CERT_EXPIRATION_CHECK_NAME, "ERROR")
            .with_keyword("expiration_date", "19700101000100Z")
            .with_keyword("key", "20190101000000");
        let observations = logged(&[record]);

        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].value, 60.0);
        assert_eq!(labels(&observations[0])[2], "error");
    }

    #[test]
    fn test_cert_expiration_ignores_other_results() {
        for result in ["SUCCESS", "CRITICAL", "UNKNOWN"] {
            let record = CheckRecord::new(CERT_SOURCE, CERT_EXPIRATION_CHECK_NAME, result)
                .with_keyword("expiration_date", "20251231235900Z")
                .with_keyword("key", "req-42");
            assert!(logged(&[record]).is_empty(), "{} was projected", result);
        }
    }

    #[test]
    fn test_cert_expiration_requires_cert_source() {
        let record = CheckRecord::new("ipahealthcheck.ipa.other", CERT_EXPIRATION_CHECK_NAME, "WARNING")
            .with_keyword("expiration_date", "20251231235900Z");
        assert!(logged(&[record]).is_empty());
    }

    #[test]
    fn test_cert_expiration_malformed_dates_are_skipped() {
        for date in ["2025-12-31T23:59:00Z", "20251231235900", "20251332235900Z", ""] {
            let record = CheckRecord::new(CERT_SOURCE, CERT_EXPIRATION_CHECK_NAME, "WARNING")
                .with_keyword("expiration_date", date)
                .with_keyword("key", "req-1");
            assert!(logged(&[record]).is_empty(), "{} was projected", date);
        }
        let missing = CheckRecord::new(CERT_SOURCE, CERT_EXPIRATION_CHECK_NAME, "WARNING");
        assert!(logged(&[missing]).is_empty());
    }

    #[test]
    fn test_rules_are_independent() {
        // A scraped table entry that also matches the certificate projection
        // produces both observations.
        let mut rules = default_rules();
        rules.insert(
            CERT_EXPIRATION_CHECK_NAME,
            ScrapedCheckRule {
                scrape: true,
                descriptor: &DOGTAG_CONNECTIVITY_CHECK,
            },
        );
        let record = CheckRecord::new(CERT_SOURCE, CERT_EXPIRATION_CHECK_NAME, "ERROR")
            .with_keyword("expiration_date", "20300101000000Z")
            .with_keyword("key", "req-7");
        let observations = project(&[], &[record], &rules);

        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].descriptor, &DOGTAG_CONNECTIVITY_CHECK);
        assert_eq!(observations[1].descriptor, &CERT_EXPIRATION);
    }

    #[test]
    fn test_parse_expiration_date() {
        assert_eq!(parse_expiration_date("19700101000000Z"), Ok(0));
        assert_eq!(parse_expiration_date("20251231235900Z"), Ok(1_767_225_540));
        assert!(parse_expiration_date("2025123123590Z").is_err());
        assert!(parse_expiration_date("2025123123590aZ").is_err());
        assert!(parse_expiration_date("20250230000000Z").is_err());
        assert!(parse_expiration_date("20251231246000Z").is_err());
    }
}
