use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One ordered step of the staged validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Parse,
    Load,
    Execute,
    InspectOutput,
    InspectShape,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Parse => "parse",
            Stage::Load => "load",
            Stage::Execute => "execute",
            Stage::InspectOutput => "inspect_output",
            Stage::InspectShape => "inspect_shape",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Passed,
    /// A real defect in the skill under test.
    Failed,
    /// The stage could not run to a verdict (unreadable file, timeout, spawn failure).
    Errored,
    Skipped,
}

/// Derived verdict for a whole validation run. Never stored — always
/// recomputed from the outcome list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Passed,
    Failed,
    Errored,
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OverallStatus::Passed => "passed",
            OverallStatus::Failed => "failed",
            OverallStatus::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// Result of one validation stage for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestOutcome {
    pub stage: Stage,
    pub status: StageStatus,
    pub message: String,
    /// Free-form structured detail (matched phrases, exit codes, token lists).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
    /// Wall-clock duration. Only populated for the execute stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

impl TestOutcome {
    pub fn passed(stage: Stage, message: impl Into<String>) -> Self {
        Self::with_status(stage, StageStatus::Passed, message)
    }

    pub fn failed(stage: Stage, message: impl Into<String>) -> Self {
        Self::with_status(stage, StageStatus::Failed, message)
    }

    pub fn errored(stage: Stage, message: impl Into<String>) -> Self {
        Self::with_status(stage, StageStatus::Errored, message)
    }

    pub fn skipped(stage: Stage, message: impl Into<String>) -> Self {
        Self::with_status(stage, StageStatus::Skipped, message)
    }

    fn with_status(stage: Stage, status: StageStatus, message: impl Into<String>) -> Self {
        Self {
            stage,
            status,
            message: message.into(),
            details: BTreeMap::new(),
            duration_secs: None,
        }
    }

    /// Attach a detail entry (builder style).
    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = Some(secs);
        self
    }
}

/// Immutable aggregate of one skill's validation run. Built once by the
/// validator, then handed to the repair planner and the batch coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub skill_name: String,
    pub script_path: String,
    pub outcomes: Vec<TestOutcome>,
    /// Captured from the execute stage only; empty before that stage runs.
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
}

impl ValidationReport {
    /// Single source of truth for "is this skill healthy": errored if any
    /// outcome errored, else failed if any outcome failed, else passed.
    pub fn overall_status(&self) -> OverallStatus {
        if self.outcomes.iter().any(|o| o.status == StageStatus::Errored) {
            OverallStatus::Errored
        } else if self.outcomes.iter().any(|o| o.status == StageStatus::Failed) {
            OverallStatus::Failed
        } else {
            OverallStatus::Passed
        }
    }

    pub fn passed(&self) -> bool {
        self.overall_status() == OverallStatus::Passed
    }

    /// All non-passed, non-skipped outcomes, in stage order.
    pub fn failing_outcomes(&self) -> Vec<&TestOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, StageStatus::Failed | StageStatus::Errored))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcomes: Vec<TestOutcome>) -> ValidationReport {
        ValidationReport {
            skill_name: "t".into(),
            script_path: "/t.py".into(),
            outcomes,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    #[test]
    fn overall_errored_wins_over_failed() {
        let r = report(vec![
            TestOutcome::passed(Stage::Parse, "ok"),
            TestOutcome::failed(Stage::InspectOutput, "empty"),
            TestOutcome::errored(Stage::Execute, "timeout"),
        ]);
        assert_eq!(r.overall_status(), OverallStatus::Errored);
    }

    #[test]
    fn overall_failed_when_no_error() {
        let r = report(vec![
            TestOutcome::passed(Stage::Parse, "ok"),
            TestOutcome::failed(Stage::Load, "missing module"),
        ]);
        assert_eq!(r.overall_status(), OverallStatus::Failed);
    }

    #[test]
    fn overall_passed_ignores_skipped() {
        let r = report(vec![
            TestOutcome::passed(Stage::Parse, "ok"),
            TestOutcome::skipped(Stage::InspectShape, "not reached"),
        ]);
        assert_eq!(r.overall_status(), OverallStatus::Passed);
        assert!(r.passed());
    }

    #[test]
    fn derivation_is_order_independent() {
        let a = report(vec![
            TestOutcome::failed(Stage::InspectOutput, "x"),
            TestOutcome::errored(Stage::Execute, "y"),
        ]);
        let b = report(vec![
            TestOutcome::errored(Stage::Execute, "y"),
            TestOutcome::failed(Stage::InspectOutput, "x"),
        ]);
        assert_eq!(a.overall_status(), b.overall_status());
    }

    #[test]
    fn failing_outcomes_excludes_skipped() {
        let r = report(vec![
            TestOutcome::passed(Stage::Parse, "ok"),
            TestOutcome::failed(Stage::Execute, "exit 1"),
            TestOutcome::skipped(Stage::InspectOutput, "not reached"),
        ]);
        let failing = r.failing_outcomes();
        assert_eq!(failing.len(), 1);
        assert_eq!(failing[0].stage, Stage::Execute);
    }

    #[test]
    fn outcome_details_and_duration_serialize() {
        let o = TestOutcome::errored(Stage::Execute, "timed out")
            .with_detail("exit_code", serde_json::Value::Null)
            .with_duration(60.0);
        let json = serde_json::to_string(&o).unwrap();
        assert!(json.contains("\"duration_secs\":60.0"));
        assert!(json.contains("\"execute\""));
        let passed = TestOutcome::passed(Stage::Parse, "ok");
        let json2 = serde_json::to_string(&passed).unwrap();
        // No duration field outside the execute stage.
        assert!(!json2.contains("duration_secs"));
    }
}
