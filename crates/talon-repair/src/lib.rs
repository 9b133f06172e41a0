//! # talon-repair
//!
//! Turns a failing validation report into typed, severity-ranked repair
//! instructions and a consolidated natural-language prompt for an external
//! code generator, then drives the bounded validate → repair loop.
//!
//! The generator is a black box behind the [`Generator`] trait: this crate's
//! job ends at producing the prompt and resumes at re-validating whatever
//! source text comes back.

pub mod classify;
pub mod generator;
pub mod orchestrate;
pub mod prompt;

pub use classify::{IssueType, RepairInstruction, Severity, classify_report};
pub use generator::{Generator, MockGenerator};
pub use orchestrate::{OrchestrationResult, Orchestrator, RepairState};
