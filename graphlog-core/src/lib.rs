pub mod config;
pub mod directive;
pub mod error;
pub mod record;
pub mod template;

pub use config::{BridgeConfig, GraphiteConfig};
pub use error::{ErrorKind, GraphlogError};
pub use record::{LogRecord, Request};
pub use template::{Render, Template};
