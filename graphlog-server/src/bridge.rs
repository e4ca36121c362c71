//! Host side of the writer lifecycle: load, provision, dedupe, fan out, close.

use anyhow::Context;
use graphlog_core::BridgeConfig;
use graphlog_core::directive::parse_blocks;
use graphlog_module::{LogWriter, ModuleContext, ModuleRegistry, WriterOpener};
use std::collections::HashSet;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Load the bridge config from `path`.
///
/// YAML and TOML files go through figment (with `GRAPHLOG_` env overrides);
/// any other file is read as writer directive blocks. A missing file yields
/// the defaults, which configure no writers.
pub fn load_config(path: &Path, registry: &ModuleRegistry) -> anyhow::Result<BridgeConfig> {
    if BridgeConfig::is_structured_file(path) {
        if !path.exists() {
            return Ok(BridgeConfig::default());
        }
        return BridgeConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()));
    }

    let src = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let blocks = parse_blocks(&src).with_context(|| format!("parsing {}", path.display()))?;
    let mut config = BridgeConfig::default();
    for block in &blocks {
        config.writers.push(registry.writer_config_from_block(block)?);
    }
    Ok(config)
}

/// Provision every configured writer, keeping the first of each writer key.
fn provision_unique(
    config: &BridgeConfig,
    registry: &ModuleRegistry,
    ctx: &ModuleContext,
) -> anyhow::Result<Vec<Arc<dyn WriterOpener>>> {
    let mut seen = HashSet::new();
    let mut openers = Vec::new();
    for (i, writer) in config.writers.iter().enumerate() {
        let opener = registry
            .provision(writer, ctx)
            .with_context(|| format!("writer #{i} ({})", writer.module))?;
        let key = opener.writer_key();
        if seen.insert(key.clone()) {
            openers.push(opener);
        } else {
            debug!(key = %key, "Sharing writer with identical configuration");
        }
    }
    Ok(openers)
}

/// Validate every writer without opening any. Returns the number of
/// distinct writers.
pub fn check(
    config: &BridgeConfig,
    registry: &ModuleRegistry,
    ctx: &ModuleContext,
) -> anyhow::Result<usize> {
    Ok(provision_unique(config, registry, ctx)?.len())
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// The set of open writers every record is fanned out to.
pub struct Bridge {
    writers: Vec<(String, Box<dyn LogWriter>)>,
}

impl Bridge {
    pub fn open(
        config: &BridgeConfig,
        registry: &ModuleRegistry,
        ctx: &ModuleContext,
    ) -> anyhow::Result<Self> {
        let mut writers = Vec::new();
        for opener in provision_unique(config, registry, ctx)? {
            let key = opener.writer_key();
            let writer = opener
                .open_writer()
                .with_context(|| format!("opening writer {key}"))?;
            info!(module = opener.module_name(), key = %key, "Writer opened");
            writers.push((key, writer));
        }
        Ok(Self { writers })
    }

    pub fn len(&self) -> usize {
        self.writers.len()
    }

    /// Feed every non-blank line of `input` to each writer. Returns the
    /// number of records read.
    ///
    /// Lines are passed on as raw bytes; a line that is not UTF-8 is the
    /// writers' decode problem, not a reason to stop reading.
    pub fn run<R: BufRead>(&mut self, mut input: R) -> io::Result<u64> {
        let mut records = 0u64;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if input.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let line = strip_line_ending(&buf);
            if line.trim_ascii().is_empty() {
                continue;
            }
            records += 1;
            for (key, writer) in &mut self.writers {
                if let Err(e) = writer.write_all(line) {
                    error!(key = %key, error = %e, "Writer rejected record");
                }
            }
        }
        Ok(records)
    }

    /// Close every writer.
    pub fn close(self) {
        for (key, mut writer) in self.writers {
            if let Err(e) = writer.close() {
                error!(key = %key, error = %e, "Closing writer failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphlog_core::ErrorKind;
    use graphlog_core::config::WriterConfig;
    use graphlog_observability::{BridgeMetrics, MemoryReporter};
    use serde_json::json;
    use std::io::{BufReader, Cursor};
    use std::net::TcpListener;

    fn registry() -> ModuleRegistry {
        let mut reg = ModuleRegistry::new();
        graphlog_writers::register_all(&mut reg);
        reg
    }

    fn config_file(suffix: &str, body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    fn graphite(port: u16, path: &str) -> WriterConfig {
        WriterConfig::new(
            "graphite",
            json!({ "server": "127.0.0.1", "port": port, "path": path }),
        )
    }

    fn memory_ctx() -> (ModuleContext, Arc<MemoryReporter>) {
        let reporter = Arc::new(MemoryReporter::new());
        let ctx = ModuleContext::new(reporter.clone(), Arc::new(BridgeMetrics::disabled()));
        (ctx, reporter)
    }

    // ── load_config ──────────────────────────────────────────────

    #[test]
    fn load_directive_file() {
        let f = config_file(
            ".conf",
            "graphite {\n server 127.0.0.1\n path p\n}\ngraphite {\n server 10.0.0.2\n path q\n methods GET\n}\n",
        );
        let cfg = load_config(f.path(), &registry()).unwrap();
        assert_eq!(cfg.writers.len(), 2);
        assert_eq!(cfg.writers[1].options["methods"][0], "GET");
        assert_eq!(cfg.input, "-");
    }

    #[test]
    fn load_yaml_file() {
        let f = config_file(
            ".yaml",
            "input: access.log\nwriters:\n  - module: graphite\n    server: carbon\n    path: p\n",
        );
        let cfg = load_config(f.path(), &registry()).unwrap();
        assert_eq!(cfg.input, "access.log");
        assert_eq!(cfg.writers[0].module, "graphite");
    }

    #[test]
    fn load_missing_yaml_gives_defaults() {
        let cfg = load_config(Path::new("/nonexistent/graphlog.yaml"), &registry()).unwrap();
        assert!(cfg.writers.is_empty());
    }

    #[test]
    fn load_missing_directive_file_fails() {
        assert!(load_config(Path::new("/nonexistent/Graphlogfile"), &registry()).is_err());
    }

    #[test]
    fn load_directive_file_with_unknown_module_fails() {
        let f = config_file(".conf", "statsd {\n server a\n}\n");
        assert!(load_config(f.path(), &registry()).is_err());
    }

    // ── check / provisioning ─────────────────────────────────────

    #[test]
    fn check_counts_distinct_writers() {
        let cfg = BridgeConfig {
            writers: vec![graphite(2003, "a"), graphite(2003, "a"), graphite(2003, "b")],
            ..Default::default()
        };
        let (ctx, _) = memory_ctx();
        assert_eq!(check(&cfg, &registry(), &ctx).unwrap(), 2);
    }

    #[test]
    fn check_rejects_invalid_writer() {
        let cfg = BridgeConfig {
            writers: vec![
                graphite(2003, "a"),
                WriterConfig::new("graphite", json!({ "path": "p" })),
            ],
            ..Default::default()
        };
        let (ctx, _) = memory_ctx();
        let err = check(&cfg, &registry(), &ctx).unwrap_err();
        assert!(format!("{err:#}").contains("No Server Set"), "got {err:#}");
    }

    // ── Bridge ───────────────────────────────────────────────────

    #[test]
    fn run_fans_out_to_distinct_writers() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let cfg = BridgeConfig {
            writers: vec![
                graphite(port, "a{{.FileName}}"),
                graphite(port, "a{{.FileName}}"),
                graphite(port, "b{{.FileName}}"),
            ],
            ..Default::default()
        };
        let (ctx, reporter) = memory_ctx();

        let mut bridge = Bridge::open(&cfg, &registry(), &ctx).unwrap();
        assert_eq!(bridge.len(), 2);
        let conns = [listener.accept().unwrap().0, listener.accept().unwrap().0];

        let input = concat!(
            r#"{"status":200,"request":{"uri":"/x"}}"#,
            "\n\n",
            r#"{"status":404,"request":{"uri":"/y"}}"#,
            "\n",
            "not json\n",
        );
        assert_eq!(bridge.run(Cursor::new(input)).unwrap(), 3);
        bridge.close();

        let mut firsts: Vec<String> = conns
            .into_iter()
            .map(|c| {
                let lines: Vec<String> = BufReader::new(c).lines().map(|l| l.unwrap()).collect();
                assert_eq!(lines.len(), 1);
                lines[0].split(' ').next().unwrap().to_string()
            })
            .collect();
        firsts.sort();
        assert_eq!(firsts, vec!["ax", "bx"]);
        assert_eq!(reporter.count(ErrorKind::Decode), 2);
    }

    #[test]
    fn run_survives_non_utf8_line() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let cfg = BridgeConfig {
            writers: vec![graphite(port, "p{{.FileName}}")],
            ..Default::default()
        };
        let (ctx, reporter) = memory_ctx();
        let mut bridge = Bridge::open(&cfg, &registry(), &ctx).unwrap();
        let conn = listener.accept().unwrap().0;

        let mut input = Vec::new();
        input.extend_from_slice(br#"{"status":200,"request":{"uri":"/a"}}"#);
        input.extend_from_slice(b"\r\n");
        input.extend_from_slice(b"{\"msg\":\"\xff\xfe\"}\n");
        input.extend_from_slice(br#"{"status":200,"request":{"uri":"/b"}}"#);

        assert_eq!(bridge.run(Cursor::new(input)).unwrap(), 3);
        bridge.close();

        let points: Vec<String> = BufReader::new(conn)
            .lines()
            .map(|l| l.unwrap().split(' ').next().unwrap().to_string())
            .collect();
        assert_eq!(points, vec!["pa", "pb"]);
        assert_eq!(reporter.count(ErrorKind::Decode), 1);
    }

    #[test]
    fn strip_line_ending_handles_lf_and_crlf() {
        assert_eq!(strip_line_ending(b"{}\n"), b"{}");
        assert_eq!(strip_line_ending(b"{}\r\n"), b"{}");
        assert_eq!(strip_line_ending(b"{}"), b"{}");
    }

    #[test]
    fn check_keeps_writers_differing_only_in_timeout() {
        let mut with_timeout = graphite(2003, "a");
        with_timeout.options.insert("timeout_ms".into(), json!(500));
        let cfg = BridgeConfig {
            writers: vec![graphite(2003, "a"), with_timeout],
            ..Default::default()
        };
        let (ctx, _) = memory_ctx();
        assert_eq!(check(&cfg, &registry(), &ctx).unwrap(), 2);
    }

    #[test]
    fn open_without_writers_is_empty() {
        let (ctx, _) = memory_ctx();
        let mut bridge = Bridge::open(&BridgeConfig::default(), &registry(), &ctx).unwrap();
        assert_eq!(bridge.len(), 0);
        assert_eq!(bridge.run(Cursor::new("{}\n")).unwrap(), 1);
        bridge.close();
    }
}
