//! # talon-validator
//!
//! The staged validator answers "can this skill run, and does it look
//! correct?" with the minimum work needed to answer. Five ordered stages,
//! each gating the next: parse, load, execute, inspect-output, inspect-shape.
//!
//! All stages that touch skill code run in a child process via the
//! [`SkillHost`] capability, so a hostile or merely broken script can at
//! worst fail its own stage.

pub mod host;
pub mod pipeline;
pub mod rules;

pub use host::{HostOutput, ProcessHost, SkillHost};
pub use pipeline::Validator;
