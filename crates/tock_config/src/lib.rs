//! Parsing and validation of `tock.toml` simulation configuration files.
//!
//! This crate reads the configuration file and produces a strongly-typed
//! [`ProjectConfig`] that the simulation kernel turns into run settings.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE_NAME};
pub use types::*;
