//! # talon-config
//!
//! `talon.toml` schema and loader: defaults, env-var overrides, validation.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{BatchConfig, LoggingConfig, RegistryConfig, RepairConfig, TalonConfig, ValidatorConfig};
