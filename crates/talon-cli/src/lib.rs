//! # talon-cli
//!
//! Command-line interface for the Talon skill lifecycle manager.
//!
//! ## Commands
//!
//! - `talon validate-skill` — Run the staged validator over one skill script
//! - `talon orchestrate` — Validate and plan a repair iteration
//! - `talon batch-test` — Validate every registered skill, optionally updating health
//! - `talon enforce-discovery` — Check a skill name / decision trace for admission violations
//! - `talon quick-lookup` — Resolve a known skill name to its invocation command
//! - `talon skill` — Browse the registry

pub mod commands;

pub use commands::Cli;
