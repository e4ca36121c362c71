//! Structured request-log record, as emitted by the host's access logger.
//!
//! One record is decoded per write. The derived `dir_name` / `file_name`
//! fields never come from the wire: [`LogRecord::derive_names`] computes them
//! from the request URI of the record being processed.

use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

/// Header multimap: unique keys, each mapped to its ordered values.
pub type HeaderMap = BTreeMap<String, Vec<String>>;

/// One access-log entry for a served HTTP request.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LogRecord {
    pub level: String,
    /// Seconds since the Unix epoch.
    #[serde(rename = "ts")]
    pub date: f64,
    pub logger: String,
    pub msg: String,
    pub request: Request,
    pub bytes_read: i64,
    pub user_id: String,
    pub duration: f64,
    pub size: i64,
    pub status: u16,
    #[serde(deserialize_with = "null_as_default")]
    pub resp_headers: HeaderMap,

    #[serde(skip)]
    pub dir_name: String,
    #[serde(skip)]
    pub file_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Request {
    pub remote_ip: String,
    pub remote_port: String,
    pub client_ip: String,
    pub proto: String,
    pub method: String,
    pub host: String,
    pub uri: String,
    #[serde(deserialize_with = "null_as_default")]
    pub headers: HeaderMap,
}

/// A record field resolved from a dotted template path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Str(&'a str),
    Int(i64),
    Float(f64),
    /// A whole header map.
    Headers(&'a HeaderMap),
    /// Values of one header key; `None` when the key is absent.
    Values(Option<&'a [String]>),
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl LogRecord {
    /// Decode one serialized record.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Recompute `dir_name` and `file_name` from `request.uri`.
    pub fn derive_names(&mut self) {
        let (dir_name, file_name) = derive_names(&self.request.uri);
        self.dir_name = dir_name;
        self.file_name = file_name;
    }

    /// Resolve a dotted field path such as `["Request", "Method"]`.
    pub fn lookup(&self, path: &[&str]) -> Result<FieldValue<'_>, String> {
        let (head, rest) = match path.split_first() {
            Some(split) => split,
            None => return Err("empty field path".to_string()),
        };
        let value = match *head {
            "Level" => FieldValue::Str(&self.level),
            "Date" => FieldValue::Float(self.date),
            "Logger" => FieldValue::Str(&self.logger),
            "Msg" => FieldValue::Str(&self.msg),
            "BytesRead" => FieldValue::Int(self.bytes_read),
            "UserID" => FieldValue::Str(&self.user_id),
            "Duration" => FieldValue::Float(self.duration),
            "Size" => FieldValue::Int(self.size),
            "Status" => FieldValue::Int(i64::from(self.status)),
            "DirName" => FieldValue::Str(&self.dir_name),
            "FileName" => FieldValue::Str(&self.file_name),
            "RespHeaders" => return headers_lookup(&self.resp_headers, head, rest),
            "Request" if rest.is_empty() => {
                return Err("Request is a nested record, select one of its fields".to_string());
            }
            "Request" => return self.request.lookup(rest),
            other => return Err(format!("can't evaluate field {other} in log record")),
        };
        scalar(value, head, rest)
    }
}

impl Request {
    pub fn lookup(&self, path: &[&str]) -> Result<FieldValue<'_>, String> {
        let (head, rest) = match path.split_first() {
            Some(split) => split,
            None => return Err("empty field path".to_string()),
        };
        let value = match *head {
            "RemoteIP" => FieldValue::Str(&self.remote_ip),
            "RemotePort" => FieldValue::Str(&self.remote_port),
            "ClientIP" => FieldValue::Str(&self.client_ip),
            "Proto" => FieldValue::Str(&self.proto),
            "Method" => FieldValue::Str(&self.method),
            "Host" => FieldValue::Str(&self.host),
            "URI" => FieldValue::Str(&self.uri),
            "Headers" => return headers_lookup(&self.headers, head, rest),
            other => return Err(format!("can't evaluate field {other} in request")),
        };
        scalar(value, head, rest)
    }
}

fn scalar<'a>(value: FieldValue<'a>, head: &str, rest: &[&str]) -> Result<FieldValue<'a>, String> {
    match rest.first() {
        None => Ok(value),
        Some(next) => Err(format!("can't evaluate field {next}: {head} is not a record")),
    }
}

fn headers_lookup<'a>(
    headers: &'a HeaderMap,
    head: &str,
    rest: &[&str],
) -> Result<FieldValue<'a>, String> {
    match rest {
        [] => Ok(FieldValue::Headers(headers)),
        [key] => Ok(FieldValue::Values(headers.get(*key).map(Vec::as_slice))),
        [key, next, ..] => Err(format!(
            "can't evaluate field {next}: {head}.{key} is a value list"
        )),
    }
}

// ── URI derivation ────────────────────────────────────────────

/// Derive `(dir_name, file_name)` from a request URI.
///
/// Every `.` becomes `_`, the first character is dropped, then the directory
/// part (slashes turned into dots, first character dropped again) and the
/// final segment are taken. Both drops are kept as-is even where they eat a
/// meaningful character: `/a/b/c.txt` gives `(".b", "c_txt")`.
pub fn derive_names(uri: &str) -> (String, String) {
    let replaced = uri.replace('.', "_");
    let sanitized = drop_first_char(&replaced);

    let dir = path_dir(sanitized).replace('/', ".");
    let dir_name = drop_first_char(&dir).to_string();
    let file_name = path_base(sanitized).replace('.', "_");

    (dir_name, file_name)
}

fn drop_first_char(s: &str) -> &str {
    let mut chars = s.chars();
    chars.next();
    chars.as_str()
}

/// Directory part of a slash-separated path, lexically cleaned.
/// A path without a slash has directory `.`.
pub fn path_dir(path: &str) -> String {
    let dir = match path.rfind('/') {
        Some(idx) => &path[..=idx],
        None => "",
    };
    clean_path(dir)
}

/// Final segment of a slash-separated path, ignoring trailing slashes.
pub fn path_base(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    match trimmed.rfind('/') {
        Some(idx) => trimmed[idx + 1..].to_string(),
        None => trimmed.to_string(),
    }
}

/// Lexical cleanup: collapse repeated slashes, resolve `.` and `..`, strip
/// the trailing slash. The empty path cleans to `.`.
pub fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|last| *last != "..") {
                    segments.pop();
                } else if !rooted {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}
