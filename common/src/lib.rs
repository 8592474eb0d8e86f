//! Shared helpers used by every `yascheduler` crate: config-file loading and
//! logging setup. Kept deliberately small — each component crate owns its own
//! domain types and its own `thiserror::Error` enum.

mod config;
mod logging;

pub use config::{load_config, CloudConfig, Config, ConfigError, DbConfig, LocalConfig, RemoteConfig};
pub use logging::init_logging;
