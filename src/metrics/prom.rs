use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::{BTreeMap, HashMap};
use tracing::{error, info};

use crate::acquirer::Acquirer;
use crate::config::ExporterConfig;
use crate::error::ExporterError;
use crate::projector::{project, MetricObservation, DESCRIPTORS, SCRAPED_CHECKS};

/// Collector running ipa-healthcheck on every scrape.
///
/// Nothing is cached between scrapes: every `collect` call acquires both
/// reports again and builds fresh gauges from them.
pub struct HealthcheckCollector {
    acquirer: Acquirer,
    descs: Vec<Desc>,
}

impl HealthcheckCollector {
    pub fn new(config: &ExporterConfig) -> prometheus::Result<Self> {
        let descs = DESCRIPTORS
            .iter()
            .map(|descriptor| {
                Desc::new(
                    descriptor.name.to_string(),
                    descriptor.help.to_string(),
                    descriptor.labels.iter().map(|l| l.to_string()).collect(),
                    HashMap::new(),
                )
            })
            .collect::<prometheus::Result<Vec<_>>>()?;

        Ok(HealthcheckCollector {
            acquirer: Acquirer::new(config),
            descs,
        })
    }

    /// Acquires both reports and projects them.
    ///
    /// Only a failure on the live report is returned; a missing or broken
    /// logged report is logged and treated as empty.
    pub fn scrape(&self) -> Result<Vec<MetricObservation>, ExporterError> {
        info!("Scraping metrics from {}", self.acquirer.tool_path().display());

        let live = self.acquirer.live_report()?;
        let logged = self.acquirer.logged_report_or_empty();
        Ok(project(&live, &logged, &SCRAPED_CHECKS))
    }
}

impl Collector for HealthcheckCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.descs.iter().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        match self.scrape() {
            Ok(observations) => observations_to_families(&observations),
            Err(err) => {
                error!("{}", err);
                std::process::exit(1);
            }
        }
    }
}

/// Builds one gauge family per descriptor that has observations.
///
/// Observations repeating a label set overwrite the earlier value.
pub fn observations_to_families(observations: &[MetricObservation]) -> Vec<MetricFamily> {
    let mut gauges: BTreeMap<&'static str, GaugeVec> = BTreeMap::new();

    for observation in observations {
        let descriptor = observation.descriptor;
        if !gauges.contains_key(descriptor.name) {
            match GaugeVec::new(Opts::new(descriptor.name, descriptor.help), descriptor.labels) {
                Ok(gauge) => {
                    gauges.insert(descriptor.name, gauge);
                }
                Err(err) => {
                    error!(metric = descriptor.name, "cannot build gauge: {}", err);
                    continue;
                }
            }
        }
        let Some(gauge) = gauges.get(descriptor.name) else {
            continue;
        };

        let labels: Vec<&str> = observation.labels.iter().map(String::as_str).collect();
        match gauge.get_metric_with_label_values(&labels) {
            Ok(metric) => metric.set(observation.value),
            Err(err) => error!(metric = descriptor.name, "cannot set gauge: {}", err),
        }
    }

    gauges.values().flat_map(|gauge| gauge.collect()).collect()
}

/// Creates the registry served on the metrics path.
///
/// The registry holds a [`HealthcheckCollector`] and, on Linux, the process
/// collector for the exporter's own CPU, memory and file descriptor usage.
///
/// # Arguments
///
/// * `config` - Resolved configuration handed to the collector
///
/// # Returns
///
/// * `Ok(Registry)` - Ready to be gathered on every scrape
/// * `Err(prometheus::Error)` - A descriptor is invalid or registered twice
pub fn build_registry(config: &ExporterConfig) -> prometheus::Result<Registry> {
    let registry = Registry::new();
    registry.register(Box::new(HealthcheckCollector::new(config)?))?;

    #[cfg(target_os = "linux")]
    registry.register(Box::new(
        prometheus::process_collector::ProcessCollector::for_self(),
    ))?;

    Ok(registry)
}

/// Gathers `registry` and renders it in the text exposition format.
pub fn encode(registry: &Registry) -> prometheus::Result<String> {
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
