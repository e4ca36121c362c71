pub mod carbon;
pub mod reporter;

#[cfg(feature = "prometheus")]
pub mod metrics;

#[cfg(feature = "prometheus")]
pub mod prometheus_exporter;

pub use carbon::CarbonClient;
pub use reporter::{MemoryReporter, Reporter, TracingReporter};

#[cfg(feature = "prometheus")]
pub use metrics::{BridgeMetrics, Outcome};
