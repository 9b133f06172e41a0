//! # talon-registry
//!
//! The persisted skill registry: one JSON document of skill records with
//! health status, plus the fast exact-name lookup path.

pub mod lookup;
pub mod store;

pub use lookup::{LookupResult, build_command, quick_lookup};
pub use store::{Registry, SharedRegistry};
