pub mod module;
pub mod registry;

pub use module::{LogWriter, Module, ModuleContext, WriterOpener};
pub use registry::ModuleRegistry;
