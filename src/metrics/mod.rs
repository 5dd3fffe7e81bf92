//! Metrics collection and export module.
//!
//! This module turns projected check observations into Prometheus metric
//! families and renders them, together with the process self-metrics, in the
//! text exposition format.
//!
//! # Submodules
//!
//! - `prom` - Prometheus registry and collector integration

pub mod prom;

pub use prom::{build_registry, encode, observations_to_families, HealthcheckCollector};
