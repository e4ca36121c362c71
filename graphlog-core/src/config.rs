use crate::directive::Block;
use crate::error::GraphlogError;
use figment::{
    Figment,
    providers::{Env, Format, Toml, Yaml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub log: LogConfig,
    /// Record source: `-` for stdin, otherwise a file path.
    #[serde(default = "default_input")]
    pub input: String,
    /// Prometheus textfile written on exit. Unset = no metrics file.
    #[serde(default)]
    pub metrics_file: Option<PathBuf>,
    #[serde(default)]
    pub writers: Vec<WriterConfig>,
}

/// Diagnostic logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `info` or `graphlog=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// One configured log writer: the module name plus its module-specific options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WriterConfig {
    pub module: String,
    #[serde(flatten)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

/// Settings of the Graphite writer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraphiteConfig {
    /// IP address or host name of the carbon daemon.
    #[serde(default)]
    pub server: String,

    /// Plaintext protocol port. 0 = default (2003).
    #[serde(default)]
    pub port: u16,

    /// Metric path template.
    #[serde(default)]
    pub path: String,

    /// Metric value template. Empty = default (`"1"`).
    #[serde(default)]
    pub value: String,

    /// Request methods to forward. Empty = all methods.
    #[serde(default)]
    pub methods: Vec<String>,

    /// Connect/write deadline on the collector socket. Unset = block indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

// ── Defaults ──────────────────────────────────────────────────

pub const DEFAULT_CARBON_PORT: u16 = 2003;
pub const DEFAULT_VALUE: &str = "1";

fn default_input() -> String { "-".into() }
fn default_log_level() -> String { "info".into() }

// ── Impls ─────────────────────────────────────────────────────

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            input: default_input(),
            metrics_file: None,
            writers: Vec::new(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a YAML (or `.toml`) file + `GRAPHLOG_` env overrides.
    ///
    /// Nested keys are separated by `__` in env names: `GRAPHLOG_LOG__LEVEL=debug`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Figment::new().merge(Toml::file(path)),
            _ => Figment::new().merge(Yaml::file(path)),
        };
        let config: BridgeConfig = file
            .merge(Env::prefixed("GRAPHLOG_").split("__"))
            .extract()?;
        tracing::debug!(path = %path.display(), writers = config.writers.len(), "Config loaded");
        Ok(config)
    }

    /// True when `path` should be read with [`BridgeConfig::load`] rather than
    /// as block directives.
    pub fn is_structured_file(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml" | "yml" | "toml")
        )
    }
}

impl WriterConfig {
    pub fn new(module: impl Into<String>, options: serde_json::Value) -> Self {
        let options = match options {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Self {
            module: module.into(),
            options,
        }
    }

    pub fn options_value(&self) -> serde_json::Value {
        serde_json::Value::Object(self.options.clone())
    }
}

impl GraphiteConfig {
    /// Check required settings and fill in defaults.
    pub fn validate(&mut self) -> Result<(), GraphlogError> {
        if self.server.is_empty() {
            return Err(GraphlogError::Config("No Server Set".into()));
        }

        if self.port == 0 {
            self.port = DEFAULT_CARBON_PORT;
        }

        if self.path.is_empty() {
            return Err(GraphlogError::Config("No Path Set".into()));
        }

        if self.value.is_empty() {
            self.value = DEFAULT_VALUE.into();
        }

        Ok(())
    }

    /// Identity of this writer: two configurations with equal keys can share
    /// one opened writer. `timeout_ms` is appended only when set.
    pub fn writer_key(&self) -> String {
        let mut key = format!(
            "graphite_log_{}_{}_{}_{}_{}",
            self.server,
            self.port,
            self.path,
            self.value,
            self.methods.join(",")
        );
        if let Some(ms) = self.timeout_ms {
            key.push_str(&format!("_t{ms}"));
        }
        key
    }

    /// `host:port` of the collector.
    pub fn address(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }

    /// Read a `graphite { ... }` directive block.
    ///
    /// Unknown directives are skipped. Does not validate; call
    /// [`GraphiteConfig::validate`] afterwards.
    pub fn from_block(block: &Block) -> Result<Self, GraphlogError> {
        let mut cfg = GraphiteConfig::default();
        for directive in &block.directives {
            match directive.name.as_str() {
                "server" => cfg.server = directive.single_arg()?.to_string(),
                "port" => {
                    let raw = directive.single_arg()?;
                    cfg.port = raw.parse().map_err(|_| {
                        GraphlogError::Config(format!(
                            "line {}: invalid port {raw:?}",
                            directive.line
                        ))
                    })?;
                }
                "path" => cfg.path = directive.single_arg()?.to_string(),
                "value" => cfg.value = directive.single_arg()?.to_string(),
                "methods" => cfg.methods.extend(directive.args.iter().cloned()),
                "timeout_ms" => {
                    let raw = directive.single_arg()?;
                    let ms = raw.parse().map_err(|_| {
                        GraphlogError::Config(format!(
                            "line {}: invalid timeout_ms {raw:?}",
                            directive.line
                        ))
                    })?;
                    cfg.timeout_ms = Some(ms);
                }
                other => {
                    tracing::debug!(directive = %other, line = directive.line, "Skipping unknown directive");
                }
            }
        }
        Ok(cfg)
    }
}
