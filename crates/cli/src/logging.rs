use anyhow::Result;
use std::path::Path;
use tellerdesk_core::tracing::{InstrumentationConfig, LogFileConfig, init_tracing};
use tracing::Level;

/// Initialize logging for the CLI
///
/// Logs go to stderr and, unless disabled, to `cli.log` in the data directory.
pub fn init_logging(level: Level, data_dir: &Path, no_file_log: bool) -> Result<()> {
    let level_str = level.as_str().to_lowercase();
    let config = InstrumentationConfig {
        log_level: InstrumentationConfig::crate_filter(&level_str),
        ..InstrumentationConfig::default()
    };

    let config = if no_file_log {
        config
    } else {
        config.with_log_file(LogFileConfig::new(data_dir, "cli"))
    };

    init_tracing(&config)
}
