//! Configuration for tracing and log output

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main instrumentation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentationConfig {
    /// Log level filter (e.g., "info", "debug", "tellerdesk_session=trace")
    pub log_level: String,
    /// Optional log file written in addition to the console
    #[serde(default)]
    pub log_file: Option<LogFileConfig>,
    /// Whether to write logs to stderr
    pub console_enabled: bool,
}

/// File-based logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogFileConfig {
    /// Directory where the log file is written
    pub directory: PathBuf,
    /// Prefix for the log file name ("cli" creates "cli.log")
    pub file_prefix: String,
}

impl LogFileConfig {
    pub fn new(directory: impl Into<PathBuf>, file_prefix: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            file_prefix: file_prefix.into(),
        }
    }

    /// Full path of the log file
    pub fn path(&self) -> PathBuf {
        self.directory.join(format!("{}.log", self.file_prefix))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: None,
            console_enabled: true,
        }
    }
}

impl InstrumentationConfig {
    /// Filter directive enabling `level` for every Tellerdesk crate
    pub fn crate_filter(level: &str) -> String {
        [
            "tellerdesk",
            "tellerdesk_core",
            "tellerdesk_http",
            "tellerdesk_session",
        ]
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
    }

    #[must_use]
    pub fn with_log_file(mut self, log_file: LogFileConfig) -> Self {
        self.log_file = Some(log_file);
        self
    }
}
