use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use talon_core::{Result, ValidationReport};
use talon_validator::{SkillHost, Validator};

use crate::classify::{RepairInstruction, classify_report};
use crate::generator::Generator;
use crate::prompt::build_repair_prompt;

/// Terminal and non-terminal states of the repair loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairState {
    /// Validation passed; nothing to do.
    Passed,
    /// Failing, with iterations left: a prompt was produced for the generator.
    RepairableFailure,
    /// Failing at or past the bound: instructions but no prompt. The caller
    /// must stop looping and surface this.
    Escalate,
}

/// One repair-loop iteration: the report, its classification, and the
/// control signal for the caller.
#[derive(Debug, Serialize)]
pub struct OrchestrationResult {
    pub skill_name: String,
    pub iteration: u32,
    pub max_iterations: u32,
    pub report: ValidationReport,
    pub needs_repair: bool,
    pub instructions: Vec<RepairInstruction>,
    /// Populated iff `needs_repair` and `iteration < max_iterations`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repair_prompt: Option<String>,
}

impl OrchestrationResult {
    pub fn state(&self) -> RepairState {
        if !self.needs_repair {
            RepairState::Passed
        } else if self.repair_prompt.is_some() {
            RepairState::RepairableFailure
        } else {
            RepairState::Escalate
        }
    }
}

/// Pure planner over validation reports: report in, instructions + optional
/// prompt out. Makes no assumptions about whether the generator succeeds —
/// only the iteration-bound contract matters here.
pub struct Orchestrator {
    max_iterations: u32,
    excerpt_bytes: usize,
}

impl Orchestrator {
    pub fn new(max_iterations: u32, excerpt_bytes: usize) -> Self {
        Self { max_iterations, excerpt_bytes }
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Evaluate one iteration's report against the termination policy.
    pub fn evaluate(&self, report: ValidationReport, iteration: u32) -> OrchestrationResult {
        let needs_repair = !report.passed();
        let instructions = if needs_repair { classify_report(&report) } else { Vec::new() };

        let repair_prompt = if needs_repair && iteration < self.max_iterations {
            Some(build_repair_prompt(
                &report,
                &instructions,
                iteration,
                self.max_iterations,
                self.excerpt_bytes,
            ))
        } else {
            None
        };

        if needs_repair && repair_prompt.is_none() {
            warn!(
                skill = %report.skill_name,
                iteration,
                max_iterations = self.max_iterations,
                "repair bound exhausted, escalating"
            );
        }

        OrchestrationResult {
            skill_name: report.skill_name.clone(),
            iteration,
            max_iterations: self.max_iterations,
            report,
            needs_repair,
            instructions,
            repair_prompt,
        }
    }

    /// Drive the full validate → repair loop: validate, and while iterations
    /// remain, hand the prompt to the generator, write its replacement
    /// source over the script, and re-validate. Returns the terminal
    /// iteration (`Passed` or `Escalate`).
    pub async fn repair_loop<H: SkillHost, G: Generator>(
        &self,
        validator: &Validator<H>,
        generator: &G,
        skill_name: &str,
        script_path: &Path,
        category: &str,
        args: &[String],
    ) -> Result<OrchestrationResult> {
        let mut iteration = 0;
        loop {
            let report = validator.validate(skill_name, script_path, category, args).await;
            let result = self.evaluate(report, iteration);

            match result.state() {
                RepairState::Passed | RepairState::Escalate => return Ok(result),
                RepairState::RepairableFailure => {
                    let prompt = result.repair_prompt.as_deref().unwrap_or_default();
                    info!(skill = skill_name, iteration, "requesting repair from generator");
                    let source = generator.generate(prompt).await?;
                    std::fs::write(script_path, source)?;
                    iteration += 1;
                }
            }
        }
    }
}
