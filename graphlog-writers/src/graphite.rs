//! Graphite writer: turns access-log records into carbon data points.

mod factory;
mod writer;

pub use factory::GraphiteLog;
pub use writer::GraphiteWriter;

use graphlog_core::GraphlogError;
use graphlog_core::config::GraphiteConfig;
use graphlog_core::directive::Block;
use graphlog_module::{Module, ModuleContext, WriterOpener};
use serde_json::Value;
use std::sync::Arc;

/// The `graphite` writer module.
pub struct GraphiteModule;

impl Module for GraphiteModule {
    fn name(&self) -> &str {
        "graphite"
    }

    fn unmarshal_block(&self, block: &Block) -> Result<Value, GraphlogError> {
        let cfg = GraphiteConfig::from_block(block)?;
        serde_json::to_value(&cfg)
            .map_err(|e| GraphlogError::Config(format!("encoding graphite options: {e}")))
    }

    fn provision(
        &self,
        options: &Value,
        ctx: &ModuleContext,
    ) -> Result<Arc<dyn WriterOpener>, GraphlogError> {
        let cfg: GraphiteConfig = serde_json::from_value(options.clone())
            .map_err(|e| GraphlogError::Config(format!("invalid graphite options: {e}")))?;
        Ok(Arc::new(GraphiteLog::new(cfg, ctx)?))
    }
}
