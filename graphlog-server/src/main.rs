// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  graphlog: JSON access logs in, carbon data points out
//
//  Input:   newline-delimited log records on stdin or from a file
//  Writers: provisioned from YAML/TOML or `graphite { ... }` blocks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

mod bridge;

use anyhow::Context;
use bridge::Bridge;
use clap::Parser;
use graphlog_core::config::LogFormat;
use graphlog_module::{ModuleContext, ModuleRegistry};
use graphlog_observability::{BridgeMetrics, TracingReporter};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "graphlog", version, about = "Forward JSON access logs to Graphite")]
struct Cli {
    /// Path to configuration file (.yaml/.yml/.toml, anything else is read as directive blocks)
    #[arg(short, long, default_value = "graphlog.yaml")]
    config: PathBuf,

    /// Log filter; `RUST_LOG` wins when set. Defaults to `log.level` from config.
    #[arg(long)]
    log_level: Option<String>,

    /// Record source, `-` for stdin. Overrides `input` from config.
    #[arg(short, long)]
    input: Option<String>,

    /// Validate configuration and exit without opening any writer.
    #[arg(long)]
    check: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Modules ──
    let mut registry = ModuleRegistry::new();
    graphlog_writers::register_all(&mut registry);

    // ── Config ──
    let mut config = bridge::load_config(&cli.config, &registry)?;
    if let Some(input) = cli.input {
        config.input = input;
    }

    // ── Tracing ──
    let level = cli.log_level.as_deref().unwrap_or(config.log.level.as_str());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    match config.log.format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(io::stderr)
            .init(),
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        modules = registry.len(),
        "graphlog starting"
    );

    let metrics = Arc::new(BridgeMetrics::new(config.metrics_file.is_some())?);
    let ctx = ModuleContext::new(Arc::new(TracingReporter), metrics.clone());

    if cli.check {
        let unique = bridge::check(&config, &registry, &ctx)?;
        info!(writers = config.writers.len(), unique, "Configuration OK");
        return Ok(());
    }

    let input: Box<dyn BufRead> = if config.input == "-" {
        Box::new(io::stdin().lock())
    } else {
        let file = File::open(&config.input)
            .with_context(|| format!("opening input {}", config.input))?;
        Box::new(BufReader::new(file))
    };

    let mut bridge = Bridge::open(&config, &registry, &ctx)?;
    info!(writers = bridge.len(), input = %config.input, "Writers open, reading records");

    // Writers are closed even when the input source fails.
    let read = bridge.run(input);
    bridge.close();
    let records = read.with_context(|| format!("reading input {}", config.input))?;
    info!(records, "Input exhausted, writers closed");

    if let Some(ref path) = config.metrics_file {
        graphlog_observability::prometheus_exporter::write_textfile(path, &metrics.render())
            .with_context(|| format!("writing metrics file {}", path.display()))?;
        info!(path = %path.display(), "Metrics written");
    }

    Ok(())
}
