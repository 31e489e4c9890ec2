//! Operator-facing status lines
//!
//! The engine reports what it is doing ("connected", "output muted", ...) to
//! a [`LogSink`]. Appending is fire-and-forget: it never blocks the pumps and
//! never fails the operation it describes.

use chrono::{DateTime, Local};

/// Receiver of human-readable status messages
pub trait LogSink: Send + Sync {
    fn append(&self, timestamp: DateTime<Local>, message: &str);
}

/// Append `message` stamped with the current local time
pub fn status(sink: &dyn LogSink, message: impl AsRef<str>) {
    sink.append(Local::now(), message.as_ref());
}

/// Render a status line the way the console shows it
pub fn format_line(timestamp: DateTime<Local>, message: &str) -> String {
    format!("{} : {}", timestamp.format("%a %b %e %H:%M:%S %Y"), message)
}

/// Forwards status lines to `tracing` under the `status` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn append(&self, timestamp: DateTime<Local>, message: &str) {
        tracing::info!(target: "status", "{}", format_line(timestamp, message));
    }
}

/// Keeps every line in memory
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct MemoryLogSink {
    lines: std::sync::Arc<parking_lot::Mutex<Vec<String>>>,
}

#[cfg(test)]
impl MemoryLogSink {
    pub fn messages(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|l| l.contains(needle))
    }
}

#[cfg(test)]
impl LogSink for MemoryLogSink {
    fn append(&self, _timestamp: DateTime<Local>, message: &str) {
        self.lines.lock().push(message.to_string());
    }
}
