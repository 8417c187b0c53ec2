//! Tracing setup shared by Tellerdesk binaries

pub mod config;
pub mod init;

pub use config::{InstrumentationConfig, LogFileConfig};
pub use init::init_tracing;
