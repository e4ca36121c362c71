use graphlog_core::ErrorKind;
use graphlog_core::config::WriterConfig;
use graphlog_core::directive::parse_blocks;
use graphlog_module::{ModuleContext, ModuleRegistry};
use graphlog_observability::{BridgeMetrics, MemoryReporter};
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;

fn registry() -> ModuleRegistry {
    let mut reg = ModuleRegistry::new();
    graphlog_writers::register_all(&mut reg);
    reg
}

fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn memory_ctx() -> (ModuleContext, Arc<MemoryReporter>) {
    let reporter = Arc::new(MemoryReporter::new());
    let ctx = ModuleContext::new(reporter.clone(), Arc::new(BridgeMetrics::disabled()));
    (ctx, reporter)
}

// =============================================================================
// Registration
// =============================================================================

#[test]
fn test_register_all_provides_graphite() {
    let reg = registry();
    assert_eq!(reg.list(), vec!["graphite"]);
    assert_eq!(reg.get("graphite").unwrap().id(), "logging.writers.graphite");
}

// =============================================================================
// End to end through the registry
// =============================================================================

#[test]
fn test_end_to_end_from_directive_block() {
    let (listener, port) = listener();
    let reg = registry();
    let src = format!(
        "graphite {{\n server 127.0.0.1\n port {port}\n path \"m{{{{.DirName}}}}.{{{{.FileName}}}}\"\n value 1\n methods GET\n}}"
    );
    let blocks = parse_blocks(&src).unwrap();
    let cfg = reg.writer_config_from_block(&blocks[0]).unwrap();
    let (ctx, reporter) = memory_ctx();
    let opener = reg.provision(&cfg, &ctx).ok().unwrap();

    let before = chrono::Utc::now().timestamp();
    let mut writer = opener.open_writer().ok().unwrap();
    let (conn, _) = listener.accept().unwrap();

    let record = br#"{"status":200,"request":{"method":"GET","uri":"/reports/a.b.csv"}}"#;
    assert_eq!(writer.write(record).unwrap(), record.len());
    writer.close().unwrap();
    let after = chrono::Utc::now().timestamp();

    let lines: Vec<String> = BufReader::new(conn).lines().map(|l| l.unwrap()).collect();
    assert_eq!(lines.len(), 1);
    let (point, ts) = lines[0].rsplit_once(' ').unwrap();
    assert_eq!(point, "meports.a_b_csv 1");
    let ts: i64 = ts.parse().unwrap();
    assert!(ts >= before && ts <= after);
    assert!(reporter.is_empty(), "unexpected reports: {:?}", reporter.entries());
}

#[test]
fn test_value_template_and_request_fields() {
    let (listener, port) = listener();
    let reg = registry();
    let cfg = WriterConfig::new(
        "graphite",
        json!({
            "server": "127.0.0.1",
            "port": port,
            "path": "{{ .Request.Host }}.{{ .Request.Method }}",
            "value": "{{ .Size }}",
        }),
    );
    let (ctx, _) = memory_ctx();
    let mut writer = reg.provision(&cfg, &ctx).ok().unwrap().open_writer().ok().unwrap();
    let (conn, _) = listener.accept().unwrap();

    writer
        .write_all(br#"{"status":200,"size":5120,"request":{"method":"HEAD","host":"dl","uri":"/f"}}"#)
        .unwrap();
    writer.close().unwrap();

    let line = BufReader::new(conn).lines().next().unwrap().unwrap();
    assert!(line.starts_with("dl.HEAD 5120 "), "got {line}");
}

#[test]
fn test_template_error_still_sends_partial_output() {
    let (listener, port) = listener();
    let reg = registry();
    let cfg = WriterConfig::new(
        "graphite",
        json!({
            "server": "127.0.0.1",
            "port": port,
            "path": "downloads{{ .Dirname }}.count",
        }),
    );
    let (ctx, reporter) = memory_ctx();
    let mut writer = reg.provision(&cfg, &ctx).ok().unwrap().open_writer().ok().unwrap();
    let (conn, _) = listener.accept().unwrap();

    writer
        .write_all(br#"{"status":200,"request":{"uri":"/a/b"}}"#)
        .unwrap();
    writer.close().unwrap();

    assert_eq!(reporter.count(ErrorKind::Template), 1);
    let line = BufReader::new(conn).lines().next().unwrap().unwrap();
    assert!(line.starts_with("downloads 1 "), "got {line}");
}

#[test]
fn test_unreachable_collector_never_fails_writes() {
    let (listener, port) = listener();
    drop(listener);
    let reg = registry();
    let cfg = WriterConfig::new(
        "graphite",
        json!({ "server": "127.0.0.1", "port": port, "path": "p", "timeout_ms": 500 }),
    );
    let (ctx, reporter) = memory_ctx();
    let mut writer = reg.provision(&cfg, &ctx).ok().unwrap().open_writer().ok().unwrap();
    assert_eq!(reporter.count(ErrorKind::Transport), 1);

    let record = br#"{"status":200,"request":{"uri":"/a"}}"#;
    for _ in 0..3 {
        assert_eq!(writer.write(record).unwrap(), record.len());
    }
    assert_eq!(reporter.count(ErrorKind::Transport), 4);
    writer.close().unwrap();
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_writers_on_separate_threads() {
    let (listener, port) = listener();
    let reg = registry();
    let cfg = WriterConfig::new(
        "graphite",
        json!({ "server": "127.0.0.1", "port": port, "path": "t{{.FileName}}" }),
    );
    let (ctx, reporter) = memory_ctx();
    let opener = reg.provision(&cfg, &ctx).ok().unwrap();

    let mut handles = Vec::new();
    let mut conns = Vec::new();
    for i in 0..4 {
        let mut writer = opener.open_writer().ok().unwrap();
        conns.push(listener.accept().unwrap().0);
        handles.push(thread::spawn(move || {
            for _ in 0..10 {
                let record = format!(r#"{{"status":200,"request":{{"uri":"/w{i}"}}}}"#);
                writer.write_all(record.as_bytes()).unwrap();
            }
            writer.close().unwrap();
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    for (i, conn) in conns.into_iter().enumerate() {
        let lines: Vec<String> = BufReader::new(conn).lines().map(|l| l.unwrap()).collect();
        assert_eq!(lines.len(), 10);
        let prefix = format!("tw{i} 1 ");
        assert!(lines.iter().all(|l| l.starts_with(&prefix)), "got {lines:?}");
    }
    assert!(reporter.is_empty());
}
