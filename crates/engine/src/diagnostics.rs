//! Failure reporting – severities, loggers, and the messages the engine
//! hands to them.

use crate::gate::Transition;
use crate::traits::Logger;
use crate::version::{InstalledVersion, Version};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Critical,
}

/// Forwards engine diagnostics to `tracing`.
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, message: &str, severity: Severity, cause: Option<&dyn std::error::Error>) {
        let cause = cause.map(|c| c.to_string()).unwrap_or_default();
        match severity {
            Severity::Info => tracing::info!(cause = %cause, "{}", message),
            Severity::Critical => tracing::error!(cause = %cause, "{}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub message: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

/// Keeps every entry in memory; used by scenarios and tests.
#[derive(Default)]
pub struct RecordingLogger {
    entries: Mutex<Vec<LogEntry>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.severity == severity)
            .count()
    }
}

impl Logger for RecordingLogger {
    fn log(&self, message: &str, severity: Severity, cause: Option<&dyn std::error::Error>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(LogEntry {
                message: message.to_string(),
                severity,
                cause: cause.map(|c| c.to_string()),
            });
    }
}

/// Message logged when a whole install/upgrade/downgrade run fails.
pub fn run_failure_message(
    transition: Transition,
    installed: &InstalledVersion,
    current: &Version,
    detail: &str,
) -> String {
    match transition {
        Transition::Install => format!(
            "Install procedure failed (version {}): {}",
            current, detail
        ),
        Transition::Upgrade => format!(
            "Upgrade procedure failed (updating from version {} to {}): {}",
            installed, current, detail
        ),
        Transition::Downgrade => format!(
            "Downgrade procedure failed (downgrading from version {} to {}): {}",
            installed, current, detail
        ),
        Transition::NoOp => format!("Version check failed (version {}): {}", current, detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_logger_keeps_cause() {
        let logger = RecordingLogger::new();
        let err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        logger.log("write failed", Severity::Critical, Some(&err));
        logger.log("ok", Severity::Info, None);

        let entries = logger.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].cause.as_deref(), Some("disk full"));
        assert_eq!(logger.count(Severity::Critical), 1);
        assert_eq!(logger.count(Severity::Info), 1);
    }

    #[test]
    fn test_failure_message_names_versions() {
        let msg = run_failure_message(
            Transition::Upgrade,
            &InstalledVersion::Release(Version::from("3.5.0")),
            &Version::from("4.2.0"),
            "boom",
        );
        assert_eq!(
            msg,
            "Upgrade procedure failed (updating from version 3.5.0 to 4.2.0): boom"
        );

        let msg = run_failure_message(
            Transition::Downgrade,
            &InstalledVersion::Release(Version::from("4.0.0")),
            &Version::from("1.9.0"),
            "boom",
        );
        assert!(msg.starts_with("Downgrade procedure failed (downgrading from version 4.0.0 to 1.9.0)"));
    }
}
