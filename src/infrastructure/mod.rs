//! Infrastructure layer module
//!
//! Configuration loading and logging setup. The adapters that satisfy the
//! domain ports live in `crate::adapters`.

pub mod config;
pub mod logging;
