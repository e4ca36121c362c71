use crate::module::{Module, ModuleContext, WriterOpener};
use graphlog_core::GraphlogError;
use graphlog_core::config::WriterConfig;
use graphlog_core::directive::Block;
use std::collections::HashMap;
use std::sync::Arc;

/// Writer module registry.
///
/// Built once at startup, immutable thereafter.
pub struct ModuleRegistry {
    modules: HashMap<String, Arc<dyn Module>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            modules: HashMap::new(),
        }
    }

    /// Register a module under its name.
    pub fn register(&mut self, module: Arc<dyn Module>) {
        let name = module.name().to_string();
        tracing::info!(module = %name, id = %module.id(), "Registered writer module");
        self.modules.insert(name, module);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Module>> {
        self.modules.get(name)
    }

    /// Registered module names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.modules.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Provision one configured writer through its module.
    pub fn provision(
        &self,
        config: &WriterConfig,
        ctx: &ModuleContext,
    ) -> Result<Arc<dyn WriterOpener>, GraphlogError> {
        let module = self
            .get(&config.module)
            .ok_or_else(|| GraphlogError::UnknownModule(config.module.clone()))?;
        module.provision(&config.options_value(), ctx)
    }

    /// Translate a directive block (`graphite { ... }`) into a writer config.
    /// The block name selects the module.
    pub fn writer_config_from_block(&self, block: &Block) -> Result<WriterConfig, GraphlogError> {
        let module = self.get(&block.name).ok_or_else(|| {
            GraphlogError::UnknownModule(format!("{} (line {})", block.name, block.line))
        })?;
        let options = module.unmarshal_block(block)?;
        Ok(WriterConfig::new(block.name.clone(), options))
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
