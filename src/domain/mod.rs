//! Domain layer for plancell
//!
//! Core models (steps, plans, operation tags, checklist, events), the error
//! type and the ports external collaborators implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
