use graphlog_core::GraphlogError;
use graphlog_core::directive::Block;
use graphlog_observability::{BridgeMetrics, Reporter, TracingReporter};
use serde_json::Value;
use std::io;
use std::sync::Arc;

/// Namespace every writer module id lives under.
pub const WRITER_NAMESPACE: &str = "logging.writers";

/// Shared services handed to a module when it is provisioned.
#[derive(Clone)]
pub struct ModuleContext {
    pub reporter: Arc<dyn Reporter>,
    pub metrics: Arc<BridgeMetrics>,
}

impl ModuleContext {
    pub fn new(reporter: Arc<dyn Reporter>, metrics: Arc<BridgeMetrics>) -> Self {
        Self { reporter, metrics }
    }
}

impl Default for ModuleContext {
    /// Tracing reporter, metrics disabled.
    fn default() -> Self {
        Self {
            reporter: Arc::new(TracingReporter),
            metrics: Arc::new(BridgeMetrics::disabled()),
        }
    }
}

/// A log writer module (factory of factories).
///
/// Built once at startup and registered by name. The host hands it each
/// configured writer's options; it returns a provisioned [`WriterOpener`].
pub trait Module: Send + Sync {
    /// Short name used in configuration (`module: graphite`).
    fn name(&self) -> &str;

    /// Fully-qualified module id, e.g. `logging.writers.graphite`.
    fn id(&self) -> String {
        format!("{WRITER_NAMESPACE}.{}", self.name())
    }

    /// Turn a directive block into the JSON options accepted by
    /// [`Module::provision`].
    fn unmarshal_block(&self, block: &Block) -> Result<Value, GraphlogError>;

    /// Validate `options` and build an opener for this writer.
    fn provision(
        &self,
        options: &Value,
        ctx: &ModuleContext,
    ) -> Result<Arc<dyn WriterOpener>, GraphlogError>;
}

/// A validated writer configuration that can open live writers.
pub trait WriterOpener: Send + Sync {
    /// Module name this opener came from.
    fn module_name(&self) -> &str;

    /// Writers with equal keys are interchangeable; the host opens one and
    /// shares it.
    fn writer_key(&self) -> String;

    /// Open a writer. Only fails when the opener decides the failure is fatal.
    fn open_writer(&self) -> Result<Box<dyn LogWriter>, GraphlogError>;
}

/// Receives serialized log records through [`io::Write`].
pub trait LogWriter: io::Write + Send {
    /// Release held resources. Writes after close must not panic.
    fn close(&mut self) -> io::Result<()>;
}
