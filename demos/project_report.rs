//! Projects an ipa-healthcheck report into Prometheus text output.
//!
//! This example decodes a report, runs the projection and prints the metrics
//! a scrape would expose, without running ipa-healthcheck.
//!
//! Run with: cargo run --example project_report [path/to/healthcheck.log]

use ipa_healthcheck_exporter::metrics::observations_to_families;
use ipa_healthcheck_exporter::{parse_report, project, SCRAPED_CHECKS};
use prometheus::{Encoder, TextEncoder};

const SAMPLE: &str = r#"[
  {"source": "ipahealthcheck.ds.replication", "check": "ReplicationCheck",
   "result": "SUCCESS", "kw": {"msg": "in sync"}},
  {"source": "ipahealthcheck.ds.replication", "check": "ReplicationConflictCheck",
   "result": "ERROR", "kw": {}},
  {"source": "ipahealthcheck.ipa.certs", "check": "IPACertmongerExpirationCheck",
   "result": "WARNING", "kw": {"key": "20190101000001", "expiration_date": "20251231235900Z"}}
]"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let content = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(path)?,
        None => SAMPLE.to_string(),
    };

    let logged = parse_report(&content)?;
    println!("=== {} logged checks ===\n", logged.len());

    let observations = project(&[], &logged, &SCRAPED_CHECKS);
    for observation in &observations {
        println!(
            "{} {:?} = {}",
            observation.descriptor.name, observation.labels, observation.value
        );
    }
    println!();

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&observations_to_families(&observations), &mut buffer)?;
    println!("{}", String::from_utf8(buffer)?);

    Ok(())
}
