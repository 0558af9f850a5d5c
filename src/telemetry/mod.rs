//! Telemetry module for logging and metrics.
//!
//! Provides:
//! - Logging configuration and initialization
//! - Counters for frame, ARP and session statistics

mod logging;
mod metrics;

pub(crate) use logging::{parse_level, LogFormat};
pub use logging::{init_logging, LogConfig};
pub use metrics::{Counter, MetricsRegistry, MetricsSummary};
