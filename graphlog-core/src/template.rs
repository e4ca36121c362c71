//! Field-substitution templates for metric paths and values.
//!
//! A template is literal text with `{{ .Field }}` placeholders naming a dotted
//! path into the [`LogRecord`] (`{{ .Request.Method }}`,
//! `{{ .RespHeaders.Content-Type }}`). There is no block logic: anything other
//! than a field path inside braces is a parse error.

use crate::error::GraphlogError;
use crate::record::{FieldValue, LogRecord};
use regex::Regex;
use std::fmt::Write as _;
use std::sync::LazyLock;

static ACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{\{(?P<action>.*?)\}\}").expect("valid action regex"));

static FIELD_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\.[A-Za-z_][A-Za-z0-9_\-]*)+$").expect("valid field path regex")
});

/// Renders text against a log record.
///
/// On failure `out` keeps whatever was produced before the error, so callers
/// can still use the partial result.
pub trait Render: Send + Sync {
    fn render_into(&self, record: &LogRecord, out: &mut String) -> Result<(), GraphlogError>;

    fn render(&self, record: &LogRecord) -> Result<String, GraphlogError> {
        let mut out = String::new();
        self.render_into(record, &mut out)?;
        Ok(out)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Field(Vec<String>),
}

/// A parsed template.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse `source`. `name` only labels error messages.
    pub fn parse(name: &str, source: &str) -> Result<Self, GraphlogError> {
        let mut segments = Vec::new();
        let mut last = 0;

        for caps in ACTION.captures_iter(source) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            if whole.start() > last {
                segments.push(Segment::Literal(source[last..whole.start()].to_string()));
            }

            let action = caps.name("action").map(|m| m.as_str().trim()).unwrap_or("");
            if action.is_empty() {
                return Err(parse_error(name, source, whole.start(), "missing value for command"));
            }
            if !FIELD_PATH.is_match(action) {
                return Err(parse_error(
                    name,
                    source,
                    whole.start(),
                    &format!("unsupported action {action:?}, only field paths are allowed"),
                ));
            }
            let path = action[1..].split('.').map(str::to_string).collect();
            segments.push(Segment::Field(path));
            last = whole.end();
        }

        let tail = &source[last..];
        if let Some(pos) = tail.find("{{") {
            return Err(parse_error(name, source, last + pos, "unclosed action"));
        }
        if !tail.is_empty() {
            segments.push(Segment::Literal(tail.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            segments,
        })
    }
}

impl Render for Template {
    fn render_into(&self, record: &LogRecord, out: &mut String) -> Result<(), GraphlogError> {
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(path) => {
                    let path: Vec<&str> = path.iter().map(String::as_str).collect();
                    let value = record.lookup(&path).map_err(|e| {
                        GraphlogError::Template(format!(
                            "template: {}: executing {{{{.{}}}}}: {e}",
                            self.name,
                            path.join(".")
                        ))
                    })?;
                    write_value(out, value)?;
                }
            }
        }
        Ok(())
    }
}

fn write_value(out: &mut String, value: FieldValue<'_>) -> Result<(), GraphlogError> {
    match value {
        FieldValue::Str(s) => out.push_str(s),
        FieldValue::Int(n) => {
            let _ = write!(out, "{n}");
        }
        FieldValue::Float(f) => {
            let _ = write!(out, "{f}");
        }
        FieldValue::Headers(map) => {
            let json = serde_json::to_string(map)
                .map_err(|e| GraphlogError::Template(format!("rendering header map: {e}")))?;
            out.push_str(&json);
        }
        FieldValue::Values(Some(values)) => out.push_str(&values.join(",")),
        FieldValue::Values(None) => {}
    }
    Ok(())
}

fn parse_error(name: &str, source: &str, offset: usize, msg: &str) -> GraphlogError {
    let line = source[..offset].matches('\n').count() + 1;
    GraphlogError::Template(format!("template: {name}:{line}: {msg}"))
}
