use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

/// What happened to one inbound record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A data point was handed to the collector connection.
    Emitted,
    /// Status was not 200.
    SkippedStatus,
    /// Method not in the allow-list.
    SkippedMethod,
    /// The record could not be decoded.
    DecodeError,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Emitted => "emitted",
            Outcome::SkippedStatus => "skipped_status",
            Outcome::SkippedMethod => "skipped_method",
            Outcome::DecodeError => "decode_error",
        }
    }
}

/// Bridge counters. When `enabled = false` nothing is allocated and every
/// call is a no-op.
pub struct BridgeMetrics {
    enabled: bool,
    registry: Option<Registry>,
    pub records_total: Option<IntCounterVec>,
    pub template_errors_total: Option<IntCounter>,
    pub transport_errors_total: Option<IntCounter>,
}

impl BridgeMetrics {
    pub fn new(enabled: bool) -> anyhow::Result<Self> {
        if !enabled {
            return Ok(Self::disabled());
        }

        let registry = Registry::new();

        let records_total = IntCounterVec::new(
            Opts::new("records_total", "Log records processed, by outcome and status")
                .namespace("graphlog"),
            &["outcome", "status"],
        )?;
        let template_errors_total = IntCounter::with_opts(
            Opts::new("template_errors_total", "Template parse or render failures")
                .namespace("graphlog"),
        )?;
        let transport_errors_total = IntCounter::with_opts(
            Opts::new("transport_errors_total", "Data points lost to collector errors")
                .namespace("graphlog"),
        )?;

        registry.register(Box::new(records_total.clone()))?;
        registry.register(Box::new(template_errors_total.clone()))?;
        registry.register(Box::new(transport_errors_total.clone()))?;

        Ok(Self {
            enabled: true,
            registry: Some(registry),
            records_total: Some(records_total),
            template_errors_total: Some(template_errors_total),
            transport_errors_total: Some(transport_errors_total),
        })
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            registry: None,
            records_total: None,
            template_errors_total: None,
            transport_errors_total: None,
        }
    }

    /// Count one record (no-op when disabled).
    #[inline]
    pub fn record(&self, outcome: Outcome, status: u16) {
        if !self.enabled {
            return;
        }
        if let Some(ref counter) = self.records_total {
            let mut buf = itoa::Buffer::new();
            let status_str = buf.format(status);
            counter
                .with_label_values(&[outcome.as_str(), status_str])
                .inc();
        }
    }

    #[inline]
    pub fn template_error(&self) {
        if let Some(ref counter) = self.template_errors_total {
            counter.inc();
        }
    }

    #[inline]
    pub fn transport_error(&self) {
        if let Some(ref counter) = self.transport_errors_total {
            counter.inc();
        }
    }

    /// Prometheus text exposition of all counters; empty when disabled.
    pub fn render(&self) -> String {
        match self.registry {
            Some(ref registry) => crate::prometheus_exporter::render_metrics(registry),
            None => String::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
