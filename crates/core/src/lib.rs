//! Tellerdesk core types and utilities
//!
//! Settings loading, tracing initialisation and the time source shared by the
//! HTTP client, the session manager and the command-line front end.

pub mod clock;
pub mod config;
pub mod error;
pub mod tracing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ClientSettings, SessionSettings};
pub use error::{ConfigError, Result};
