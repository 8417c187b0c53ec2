//! Client settings
//!
//! Settings are layered: built-in defaults, then an optional TOML/JSON file,
//! then `TELLERDESK_*` environment variables. Nested keys use a double
//! underscore, e.g. `TELLERDESK_SESSION__WARNING_THRESHOLD_SECS=120`.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "TELLERDESK";

/// Environment variable overriding the default data directory
pub const STATE_DIR_ENV: &str = "TELLERDESK_STATE_DIR";

/// File holding the persisted session inside the data directory
pub const SESSION_FILE_NAME: &str = "session.json";

/// Top-level client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Root of the REST API, e.g. `https://api.example.com/api`
    pub api_root: String,
    /// Per-request timeout for the HTTP client
    pub request_timeout_secs: u64,
    /// Where the persisted session and log files live
    pub data_dir: PathBuf,
    /// Session lifecycle timings
    pub session: SessionSettings,
}

/// Timings of the expiry monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// How often the monitor inspects the stored token
    pub monitor_interval_secs: u64,
    /// Remaining lifetime below which the expiry warning is shown
    pub warning_threshold_secs: u64,
    /// Delay between showing the warning and the automatic refresh
    pub refresh_delay_secs: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_root: "http://localhost:5000/api".to_string(),
            request_timeout_secs: 30,
            data_dir: default_data_dir(),
            session: SessionSettings::default(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            monitor_interval_secs: 3,
            warning_threshold_secs: 60,
            refresh_delay_secs: 3,
        }
    }
}

impl SessionSettings {
    pub const fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    pub const fn warning_threshold(&self) -> Duration {
        Duration::from_secs(self.warning_threshold_secs)
    }

    pub const fn refresh_delay(&self) -> Duration {
        Duration::from_secs(self.refresh_delay_secs)
    }
}

impl ClientSettings {
    /// Load settings from defaults, an optional file and the environment
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting settings fail validation
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Self::default();

        let mut builder = config::Config::builder()
            .set_default("api_root", defaults.api_root.clone())?
            .set_default("request_timeout_secs", defaults.request_timeout_secs)?
            .set_default(
                "data_dir",
                defaults.data_dir.to_string_lossy().to_string(),
            )?
            .set_default(
                "session.monitor_interval_secs",
                defaults.session.monitor_interval_secs,
            )?
            .set_default(
                "session.warning_threshold_secs",
                defaults.session.warning_threshold_secs,
            )?
            .set_default(
                "session.refresh_delay_secs",
                defaults.session.refresh_delay_secs,
            )?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let settings: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Check the invariants the session manager relies on
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field
    pub fn validate(&self) -> Result<()> {
        let api_root = self.api_root.trim();
        if api_root.is_empty() {
            return Err(ConfigError::Invalid {
                field: "api_root",
                reason: "must not be empty".to_string(),
            });
        }
        match url::Url::parse(api_root) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(ConfigError::Invalid {
                    field: "api_root",
                    reason: format!("unsupported scheme `{}`", url.scheme()),
                });
            }
            Err(e) => {
                return Err(ConfigError::Invalid {
                    field: "api_root",
                    reason: e.to_string(),
                });
            }
        }
        if self.session.monitor_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "session.monitor_interval_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.session.warning_threshold_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "session.warning_threshold_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Path of the persisted session file
    pub fn session_file(&self) -> PathBuf {
        self.data_dir.join(SESSION_FILE_NAME)
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var(STATE_DIR_ENV).map_or_else(
        |_| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("tellerdesk")
        },
        PathBuf::from,
    )
}
