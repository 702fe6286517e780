use std::path::Path;
use std::sync::Arc;

use critter_logging::{JsonLogger, LogLevel, LogRecord};

/// Telemetry handle for the mind.
///
/// Holds an optional sink so every call site stays unconditional; with no
/// sink attached, events are dropped. Log failures are swallowed: losing a
/// telemetry line must never disturb a tick.
#[derive(Debug, Clone, Default)]
pub struct MindTelemetry {
    sink: Option<Arc<JsonLogger>>,
}

impl MindTelemetry {
    /// Telemetry that drops every event.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { sink: None }
    }

    /// Telemetry writing JSON lines to the given file.
    pub fn to_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Ok(Self {
            sink: Some(Arc::new(JsonLogger::new(path)?)),
        })
    }

    /// Whether a sink is attached.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Emits one record, if a sink is attached.
    pub fn emit(&self, record: &LogRecord) {
        if let Some(sink) = &self.sink {
            let _ = sink.log(record);
        }
    }

    /// Informational event from a component.
    pub fn info(&self, component: &str, message: impl Into<String>) {
        self.emit(&LogRecord::new(component, LogLevel::Info, message));
    }

    /// Recoverable anomaly tied to a tick (skipped learning, fallback).
    pub fn warn_at(&self, component: &str, tick: u64, message: impl Into<String>) {
        self.emit(&LogRecord::new(component, LogLevel::Warn, message).at_tick(tick));
    }

    /// Recoverable anomaly outside a tick.
    pub fn warn(&self, component: &str, message: impl Into<String>) {
        self.emit(&LogRecord::new(component, LogLevel::Warn, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn disabled_telemetry_swallows_events() {
        let telemetry = MindTelemetry::disabled();
        assert!(!telemetry.is_enabled());
        telemetry.info("coordinator", "nothing happens");
    }

    #[test]
    fn file_telemetry_writes_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mind.log");
        let telemetry = MindTelemetry::to_file(&path).unwrap();
        telemetry.warn_at("coordinator", 12, "learning deferred");
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("learning deferred"));
        assert!(content.contains("\"tick\":12"));
    }
}
