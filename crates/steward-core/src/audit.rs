//! Best-effort audit line delivery.
//!
//! One text line per rank change or bulk sweep. Delivery is never on
//! the critical path: implementations must swallow their own failures.

use std::sync::Mutex;

/// Sink for audit lines.
pub trait AuditSink: Send + Sync {
    fn record(&self, line: &str);
}

/// Emits audit lines through `tracing` under a dedicated target.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, line: &str) {
        tracing::info!(target: "steward::audit", "{line}");
    }
}

/// Discards every line.
#[derive(Debug, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _line: &str) {}
}

/// Captures lines in memory; test helper.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    lines: Mutex<Vec<String>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}
