//! Log sinks: "a thing that accepts a formatted string".
//!
//! Consumers of sequences use these to report one line per observed value.
//! The library itself never writes to a sink.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Local;

/// Append-only line sink.
pub trait LogSink: Send + Sync {
    fn append(&self, line: String);
}

impl<L: LogSink + ?Sized> LogSink for Arc<L> {
    fn append(&self, line: String) {
        (**self).append(line)
    }
}

/// `[HH:MM:SS][tag]: text`, stamped with local wall-clock time.
pub fn format_log(tag: &str, text: &str) -> String {
    format!("[{}][{}]: {}", Local::now().format("%H:%M:%S"), tag, text)
}

/// Keeps every line in memory, in append order.
#[derive(Default)]
pub struct MemoryLog {
    lines: Mutex<Vec<String>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LogSink for MemoryLog {
    fn append(&self, line: String) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line);
    }
}

/// Forwards lines to `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl LogSink for TracingLog {
    fn append(&self, line: String) {
        tracing::info!(target: "tributary::log", "{line}");
    }
}
