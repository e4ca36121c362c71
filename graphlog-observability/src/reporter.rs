use graphlog_core::ErrorKind;
use std::sync::Mutex;

/// Sink for failures that must not abort the host's write path.
///
/// Injected into the writer factory and every writer it opens, so embedders
/// (and tests) decide where failures go instead of relying on a process-wide
/// logger.
pub trait Reporter: Send + Sync {
    fn report(&self, kind: ErrorKind, message: &str);
}

/// Default reporter: one `tracing` error event per failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, kind: ErrorKind, message: &str) {
        tracing::error!(kind = kind.as_str(), "{message}");
    }
}

/// Keeps every report in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    entries: Mutex<Vec<(ErrorKind, String)>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all reports so far, oldest first.
    pub fn entries(&self) -> Vec<(ErrorKind, String)> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, kind: ErrorKind) -> usize {
        self.entries
            .lock()
            .map(|e| e.iter().filter(|(k, _)| *k == kind).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().map(|e| e.is_empty()).unwrap_or(true)
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, kind: ErrorKind, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((kind, message.to_string()));
        }
    }
}
