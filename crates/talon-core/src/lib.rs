//! # talon-core
//!
//! Core types and errors for the Talon skill lifecycle manager.
//! This crate defines the shared vocabulary used by every other crate in the workspace:
//! the skill record / health model and the validation outcome model.

pub mod error;
pub mod outcome;
pub mod record;

pub use error::{Result, TalonError};
pub use outcome::{OverallStatus, Stage, StageStatus, TestOutcome, ValidationReport};
pub use record::{ArgFormat, Health, HealthStatus, Invocation, SkillRecord};
