use super::writer::GraphiteWriter;
use graphlog_core::config::GraphiteConfig;
use graphlog_core::template::{Render, Template};
use graphlog_core::{ErrorKind, GraphlogError, LogRecord};
use graphlog_module::{LogWriter, ModuleContext, WriterOpener};
use graphlog_observability::{BridgeMetrics, CarbonClient, Reporter};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Validated Graphite settings plus everything its writers share.
///
/// Cheap to clone; all clones share one read-only state.
#[derive(Clone)]
pub struct GraphiteLog {
    inner: Arc<Inner>,
}

struct Inner {
    config: GraphiteConfig,
    path: Result<Template, String>,
    value: Result<Template, String>,
    reporter: Arc<dyn Reporter>,
    metrics: Arc<BridgeMetrics>,
}

impl GraphiteLog {
    /// Validate `config` (applying defaults) and parse both templates.
    ///
    /// A template that fails to parse does not fail provisioning: the error is
    /// reported on every write that needs it and the template renders empty.
    pub fn new(mut config: GraphiteConfig, ctx: &ModuleContext) -> Result<Self, GraphlogError> {
        config.validate()?;

        let path = Template::parse("path", &config.path).map_err(|e| e.to_string());
        let value = Template::parse("value", &config.value).map_err(|e| e.to_string());
        for err in [&path, &value].into_iter().filter_map(|t| t.as_ref().err()) {
            debug!(error = %err, "Graphite template failed to parse");
        }

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                path,
                value,
                reporter: ctx.reporter.clone(),
                metrics: ctx.metrics.clone(),
            }),
        })
    }

    pub fn config(&self) -> &GraphiteConfig {
        &self.inner.config
    }

    pub fn reporter(&self) -> &dyn Reporter {
        self.inner.reporter.as_ref()
    }

    pub fn metrics(&self) -> &BridgeMetrics {
        &self.inner.metrics
    }

    /// Open a writer connected to the collector.
    ///
    /// A failed connect is reported as a transport error and the returned
    /// writer reports a transport error on every data point instead.
    pub fn open(&self) -> GraphiteWriter {
        match self.try_open_writer() {
            Ok(writer) => writer,
            Err(err) => {
                self.inner.reporter.report(ErrorKind::Transport, &err.to_string());
                let client = CarbonClient::disconnected(&self.inner.config.address(), self.timeout());
                GraphiteWriter::new(self.clone(), client)
            }
        }
    }

    /// Open a writer, failing when the collector cannot be reached.
    pub fn try_open_writer(&self) -> Result<GraphiteWriter, GraphlogError> {
        let address = self.inner.config.address();
        let client = CarbonClient::connect(&address, self.timeout())?;
        debug!(addr = %address, "Graphite writer opened");
        Ok(GraphiteWriter::new(self.clone(), client))
    }

    /// Whether `method` passes the allow-list. An empty list passes all.
    pub fn allows_method(&self, method: &str) -> bool {
        let methods = &self.inner.config.methods;
        methods.is_empty() || methods.iter().any(|m| m == method)
    }

    pub fn render_path(&self, record: &LogRecord) -> String {
        self.render(&self.inner.path, record)
    }

    pub fn render_value(&self, record: &LogRecord) -> String {
        self.render(&self.inner.value, record)
    }

    fn render(&self, template: &Result<Template, String>, record: &LogRecord) -> String {
        let mut out = String::new();
        let failure = match template {
            Ok(t) => t.render_into(record, &mut out).err().map(|e| e.to_string()),
            Err(parse_err) => Some(parse_err.clone()),
        };
        if let Some(msg) = failure {
            self.inner.reporter.report(ErrorKind::Template, &msg);
            self.inner.metrics.template_error();
        }
        out
    }

    fn timeout(&self) -> Option<Duration> {
        self.inner
            .config
            .timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

impl WriterOpener for GraphiteLog {
    fn module_name(&self) -> &str {
        "graphite"
    }

    fn writer_key(&self) -> String {
        self.inner.config.writer_key()
    }

    fn open_writer(&self) -> Result<Box<dyn LogWriter>, GraphlogError> {
        Ok(Box::new(self.open()))
    }
}

impl fmt::Display for GraphiteLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("graphite")
    }
}

impl fmt::Debug for GraphiteLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphiteLog")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
