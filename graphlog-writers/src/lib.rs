pub mod graphite;

use graphlog_module::ModuleRegistry;
use std::sync::Arc;

/// Register all built-in writer modules.
pub fn register_all(registry: &mut ModuleRegistry) {
    registry.register(Arc::new(graphite::GraphiteModule));
}
