//! Runtime configuration
//!
//! One process-wide slot, installed explicitly. Nothing is read from the
//! environment or from disk.

use std::sync::{OnceLock, PoisonError, RwLock};

use crate::observability::Severity;

/// Where log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSink {
    /// stdout for TRACE..WARN, stderr for ERROR and FATAL
    Stdio,
    /// In-memory buffer, drained with `observability::drain_captured`
    Memory,
    /// Dropped
    Silent,
}

/// Configuration for the record runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Lines below this severity are not emitted.
    pub log_threshold: Severity,
    /// Output destination.
    pub log_sink: LogSink,
    /// Collect every construction error (true) or stop at the first.
    pub collect_errors: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_threshold: Severity::Warn,
            log_sink: LogSink::Stdio,
            collect_errors: true,
        }
    }
}

impl RuntimeConfig {
    /// No log output at all.
    pub fn quiet() -> Self {
        Self {
            log_sink: LogSink::Silent,
            ..Self::default()
        }
    }

    /// Everything down to TRACE.
    pub fn verbose() -> Self {
        Self {
            log_threshold: Severity::Trace,
            ..Self::default()
        }
    }

    pub fn with_threshold(mut self, threshold: Severity) -> Self {
        self.log_threshold = threshold;
        self
    }

    pub fn with_sink(mut self, sink: LogSink) -> Self {
        self.log_sink = sink;
        self
    }

    pub fn with_collect_errors(mut self, collect: bool) -> Self {
        self.collect_errors = collect;
        self
    }

    /// Whether a line at `severity` should be written.
    pub fn should_log(&self, severity: Severity) -> bool {
        self.log_sink != LogSink::Silent && severity >= self.log_threshold
    }
}

fn slot() -> &'static RwLock<RuntimeConfig> {
    static SLOT: OnceLock<RwLock<RuntimeConfig>> = OnceLock::new();
    SLOT.get_or_init(|| RwLock::new(RuntimeConfig::default()))
}

/// Replaces the process-wide configuration.
pub fn install(config: RuntimeConfig) {
    *slot().write().unwrap_or_else(PoisonError::into_inner) = config;
}

/// Snapshot of the process-wide configuration.
pub fn current() -> RuntimeConfig {
    slot().read().unwrap_or_else(PoisonError::into_inner).clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert_eq!(config.log_threshold, Severity::Warn);
        assert_eq!(config.log_sink, LogSink::Stdio);
        assert!(config.collect_errors);
    }

    #[test]
    fn test_quiet_never_logs() {
        let config = RuntimeConfig::quiet();
        assert!(!config.should_log(Severity::Fatal));
    }

    #[test]
    fn test_threshold_gates() {
        let config = RuntimeConfig::verbose();
        assert!(config.should_log(Severity::Trace));
        let config = config.with_threshold(Severity::Error);
        assert!(!config.should_log(Severity::Warn));
        assert!(config.should_log(Severity::Error));
    }

    #[test]
    fn test_builder_setters() {
        let config = RuntimeConfig::default()
            .with_sink(LogSink::Memory)
            .with_collect_errors(false);
        assert_eq!(config.log_sink, LogSink::Memory);
        assert!(!config.collect_errors);
    }
}
