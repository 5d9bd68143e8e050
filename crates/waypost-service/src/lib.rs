//! Waypost service library: configuration and producer intake.
//!
//! The `waypost` binary wires the store, identity, client, coordinator,
//! and scheduler crates together; this library holds the pieces worth
//! testing in isolation.

pub mod config;
pub mod intake;

pub use config::{
    CollectorConfig, Config, ConfigError, StorageConfig, SyncConfig, ValidationError,
    default_config_path,
};
pub use intake::{IntakeError, parse_fix_line};
