//! Prometheus exporter for FreeIPA `ipa-healthcheck`.
//!
//! On every scrape the exporter runs `ipa-healthcheck` against the service
//! checks, reads the report left by the periodic background runs of the tool,
//! and turns both into gauges:
//!
//! - `ipa_service_state{service,state}`
//! - `ipa_replication_check{check,severity}`
//! - `ipa_dogtag_connectivity_check{check,severity}`
//! - `ipa_replication_check_detail{check,severity,message}`
//! - `ipa_cert_expiration{check,certificate_request_id,severity}`
//!
//! # Example
//!
//! ```
//! use ipa_healthcheck_exporter::{project, CheckRecord, SCRAPED_CHECKS};
//!
//! let live = vec![CheckRecord::new("ipahealthcheck.meta.services", "krb5kdc", "SUCCESS")];
//! let observations = project(&live, &[], &SCRAPED_CHECKS);
//!
//! assert_eq!(observations[0].descriptor.name, "ipa_service_state");
//! assert_eq!(observations[0].value, 1.0);
//! assert_eq!(observations[0].labels, vec!["krb5kdc", "success"]);
//! ```

pub mod acquirer;
pub mod check;
pub mod config;
pub mod error;
pub mod metrics;
pub mod projector;
pub mod server;

pub use acquirer::{fetch_live_report, fetch_logged_report, Acquirer};
pub use check::{parse_report, CheckRecord, CheckResult, KeywordValue, Keywords};
pub use config::{Config, ConfigError, ExporterConfig};
pub use error::ExporterError;
pub use metrics::{build_registry, encode, HealthcheckCollector};
pub use projector::{
    default_rules, project, MetricDescriptor, MetricObservation, RuleTable, ScrapedCheckRule,
    SCRAPED_CHECKS,
};
