use thiserror::Error;

/// Failure category, as surfaced to a diagnostic reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or invalid setting. Fatal to startup of that writer.
    Config,
    /// Malformed inbound record. The record is dropped.
    Decode,
    /// Bad template syntax or render failure. Partial output is still sent.
    Template,
    /// Collector unreachable or write failed. The point is dropped.
    Transport,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Config => "config",
            ErrorKind::Decode => "decode",
            ErrorKind::Template => "template",
            ErrorKind::Transport => "transport",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unified error type for graphlog.
#[derive(Error, Debug)]
pub enum GraphlogError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Unknown module: {0}")]
    UnknownModule(String),
}

impl GraphlogError {
    /// Reporting category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GraphlogError::Config(_) | GraphlogError::UnknownModule(_) => ErrorKind::Config,
            GraphlogError::Decode(_) => ErrorKind::Decode,
            GraphlogError::Template(_) => ErrorKind::Template,
            GraphlogError::Transport(_) => ErrorKind::Transport,
        }
    }
}
