use prometheus::{Encoder, TextEncoder};
use std::path::Path;

/// Render prometheus text exposition format from a registry.
pub fn render_metrics(registry: &prometheus::Registry) -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap_or(());
    String::from_utf8(buffer).unwrap_or_default()
}

/// Write `text` for a node_exporter textfile collector.
///
/// Written to a `.tmp` sibling first and renamed over `path`, so the
/// collector never reads a half-written file.
pub fn write_textfile(path: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, text)?;
    std::fs::rename(&tmp, path)
}
