//! Configuration management
//!
//! Hierarchical configuration loading using figment:
//! - Programmatic defaults
//! - Project config (.plancell/config.yaml)
//! - Local overrides (.plancell/local.yaml)
//! - Environment variables (PLANCELL_* prefix)

pub mod loader;

pub use loader::{ConfigError, ConfigLoader};
