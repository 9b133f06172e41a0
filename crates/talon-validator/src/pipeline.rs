use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use talon_core::{Result, Stage, StageStatus, TestOutcome, ValidationReport};

use crate::host::{HostOutput, SkillHost};
use crate::rules;

/// Runs one skill through the ordered stage sequence and produces a
/// [`ValidationReport`]. A failing stage in {parse, load, execute} is fatal
/// to the run: later stages are never attempted. The validator itself never
/// errors out of a single-skill run — every stage fault is downgraded to an
/// `errored` outcome on the report.
pub struct Validator<H> {
    host: H,
    timeout: Duration,
}

impl<H: SkillHost> Validator<H> {
    pub fn new(host: H, timeout: Duration) -> Self {
        Self { host, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn validate(
        &self,
        skill_name: &str,
        script_path: &Path,
        category: &str,
        args: &[String],
    ) -> ValidationReport {
        let mut report = ValidationReport {
            skill_name: skill_name.to_string(),
            script_path: script_path.to_string_lossy().into_owned(),
            outcomes: Vec::new(),
            stdout: String::new(),
            stderr: String::new(),
        };

        // ── parse ──────────────────────────────────────────────
        let parse = self.parse_stage(script_path).await;
        let parse_ok = parse.status == StageStatus::Passed;
        report.outcomes.push(parse);
        if !parse_ok {
            return report;
        }

        // ── load ───────────────────────────────────────────────
        let load = self.load_stage(script_path).await;
        let load_ok = load.status == StageStatus::Passed;
        report.outcomes.push(load);
        if !load_ok {
            return report;
        }

        // ── execute ────────────────────────────────────────────
        let execute = self.execute_stage(script_path, args, &mut report).await;
        let execute_ok = execute.status == StageStatus::Passed;
        report.outcomes.push(execute);
        if !execute_ok {
            return report;
        }

        // ── inspect output ─────────────────────────────────────
        let inspect = inspect_output_stage(&report.stdout);
        let inspect_ok = inspect.status == StageStatus::Passed;
        report.outcomes.push(inspect);
        if !inspect_ok {
            report
                .outcomes
                .push(TestOutcome::skipped(Stage::InspectShape, "output inspection failed"));
            return report;
        }

        // ── inspect shape ──────────────────────────────────────
        report.outcomes.push(inspect_shape_stage(category, &report.stdout));

        info!(
            skill = skill_name,
            status = %report.overall_status(),
            "validation run complete"
        );
        report
    }

    async fn parse_stage(&self, script: &Path) -> TestOutcome {
        if !script.exists() {
            return TestOutcome::errored(
                Stage::Parse,
                format!("cannot read script: {}", script.display()),
            );
        }
        match self.host.parse_check(script).await {
            Ok(out) if out.success() => TestOutcome::passed(Stage::Parse, "syntax check passed"),
            Ok(out) => TestOutcome::failed(Stage::Parse, stage_failure_message("syntax check failed", &out))
                .with_detail("exit_code", out.exit_code)
                .with_detail("stderr", out.stderr),
            Err(e) => TestOutcome::errored(Stage::Parse, e.to_string()),
        }
    }

    async fn load_stage(&self, script: &Path) -> TestOutcome {
        match self.host.load_check(script).await {
            Ok(out) if out.success() => {
                TestOutcome::passed(Stage::Load, "module dependencies resolved")
            }
            Ok(out) => TestOutcome::failed(Stage::Load, stage_failure_message("module load failed", &out))
                .with_detail("exit_code", out.exit_code)
                .with_detail("stderr", out.stderr),
            Err(e) => TestOutcome::errored(Stage::Load, e.to_string()),
        }
    }

    /// Run the skill with a hard wall-clock bound. On expiry the stage is
    /// `errored` with `duration_secs` equal to the bound; whatever stdout
    /// and stderr were captured before that point stay on the report.
    async fn execute_stage(
        &self,
        script: &Path,
        args: &[String],
        report: &mut ValidationReport,
    ) -> TestOutcome {
        let bound = self.timeout.as_secs_f64();
        let started = std::time::Instant::now();

        let result: std::result::Result<Result<HostOutput>, _> =
            tokio::time::timeout(self.timeout, self.host.run_isolated(script, args)).await;

        match result {
            Err(_) => {
                debug!(script = ?script, bound, "execute stage timed out");
                TestOutcome::errored(
                    Stage::Execute,
                    format!("execution timed out after {bound:.0}s"),
                )
                .with_detail("timeout_secs", bound)
                .with_duration(bound)
            }
            Ok(Err(e)) => TestOutcome::errored(Stage::Execute, e.to_string())
                .with_duration(started.elapsed().as_secs_f64()),
            Ok(Ok(out)) => {
                report.stdout = out.stdout.clone();
                report.stderr = out.stderr.clone();
                let elapsed = started.elapsed().as_secs_f64();
                if out.success() {
                    TestOutcome::passed(Stage::Execute, "exited 0").with_duration(elapsed)
                } else {
                    TestOutcome::failed(
                        Stage::Execute,
                        stage_failure_message("execution failed", &out),
                    )
                    .with_detail("exit_code", out.exit_code)
                    .with_duration(elapsed)
                }
            }
        }
    }
}

/// Content heuristics over captured stdout: empty output fails, known
/// zero-result phrases fail with the matched phrase recorded.
fn inspect_output_stage(stdout: &str) -> TestOutcome {
    if stdout.trim().is_empty() {
        return TestOutcome::failed(Stage::InspectOutput, "skill produced no output")
            .with_detail("ruleset_version", rules::RULESET_VERSION);
    }
    match rules::zero_result_match(stdout) {
        Some((rule, phrase)) => TestOutcome::failed(
            Stage::InspectOutput,
            format!("output indicates zero results (\"{phrase}\")"),
        )
        .with_detail("rule", rule)
        .with_detail("matched_phrase", phrase)
        .with_detail("ruleset_version", rules::RULESET_VERSION),
        None => TestOutcome::passed(Stage::InspectOutput, "output looks substantive"),
    }
}

/// Category-driven shape check: at least one expected token class must
/// appear in stdout. Unmatched categories fall back to a generic shape.
fn inspect_shape_stage(category: &str, stdout: &str) -> TestOutcome {
    let shape = rules::shape_for_category(category);
    let matched = rules::matched_tokens(shape, stdout);
    let expected: Vec<&str> = shape.expected_tokens.to_vec();

    if matched.is_empty() {
        TestOutcome::failed(
            Stage::InspectShape,
            format!(
                "output does not look like {} data (expected one of: {})",
                shape.category,
                expected.join(", ")
            ),
        )
        .with_detail("shape", shape.category)
        .with_detail("expected_tokens", expected)
        .with_detail("matched_tokens", matched)
        .with_detail("ruleset_version", rules::RULESET_VERSION)
    } else {
        TestOutcome::passed(
            Stage::InspectShape,
            format!("output matches the {} shape", shape.category),
        )
        .with_detail("shape", shape.category)
        .with_detail("matched_tokens", matched)
    }
}

fn stage_failure_message(prefix: &str, out: &HostOutput) -> String {
    let detail = out
        .stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim();
    match (out.exit_code, detail.is_empty()) {
        (Some(code), false) => format!("{prefix} (exit {code}): {detail}"),
        (Some(code), true) => format!("{prefix} (exit {code})"),
        (None, false) => format!("{prefix} (killed by signal): {detail}"),
        (None, true) => format!("{prefix} (killed by signal)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use talon_core::{OverallStatus, TalonError};

    /// Scripted host: each stage returns a canned result.
    struct FakeHost {
        parse: Result<HostOutput>,
        load: Result<HostOutput>,
        run: Result<HostOutput>,
        run_delay: Option<Duration>,
    }

    fn ok(stdout: &str) -> Result<HostOutput> {
        Ok(HostOutput {
            exit_code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        })
    }

    fn fail(code: i32, stderr: &str) -> Result<HostOutput> {
        Ok(HostOutput {
            exit_code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
        })
    }

    impl FakeHost {
        fn all_passing(stdout: &str) -> Self {
            Self {
                parse: ok(""),
                load: ok(""),
                run: ok(stdout),
                run_delay: None,
            }
        }
    }

    fn clone_result(r: &Result<HostOutput>) -> Result<HostOutput> {
        match r {
            Ok(o) => Ok(o.clone()),
            Err(e) => Err(TalonError::Validator(e.to_string())),
        }
    }

    #[async_trait]
    impl SkillHost for FakeHost {
        async fn parse_check(&self, _script: &Path) -> Result<HostOutput> {
            clone_result(&self.parse)
        }
        async fn load_check(&self, _script: &Path) -> Result<HostOutput> {
            clone_result(&self.load)
        }
        async fn run_isolated(&self, _script: &Path, _args: &[String]) -> Result<HostOutput> {
            if let Some(delay) = self.run_delay {
                tokio::time::sleep(delay).await;
            }
            clone_result(&self.run)
        }
    }

    fn script_on_disk() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skill.py");
        std::fs::write(&path, "print('hi')\n").unwrap();
        (dir, path)
    }

    async fn run(host: FakeHost, category: &str) -> ValidationReport {
        let (_dir, path) = script_on_disk();
        Validator::new(host, Duration::from_secs(60))
            .validate("demo", &path, category, &[])
            .await
    }

    #[tokio::test]
    async fn all_stages_pass() {
        let report = run(
            FakeHost::all_passing("Found 3 trials\nNCT123 Phase 2 Recruiting\n"),
            "trials",
        )
        .await;
        assert_eq!(report.overall_status(), OverallStatus::Passed);
        assert_eq!(report.outcomes.len(), 5);
        assert!(report.outcomes.iter().all(|o| o.status == StageStatus::Passed));
    }

    #[tokio::test]
    async fn parse_failure_short_circuits() {
        let host = FakeHost {
            parse: fail(1, "SyntaxError: invalid syntax (line 3)"),
            load: ok(""),
            run: ok("unused"),
            run_delay: None,
        };
        let report = run(host, "trials").await;
        // Exactly one outcome: nothing after a failed parse is attempted.
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].stage, Stage::Parse);
        assert_eq!(report.outcomes[0].status, StageStatus::Failed);
        assert!(report.outcomes[0].message.contains("SyntaxError"));
        assert_eq!(report.overall_status(), OverallStatus::Failed);
    }

    #[tokio::test]
    async fn missing_script_errors_parse() {
        let host = FakeHost::all_passing("unused");
        let report = Validator::new(host, Duration::from_secs(60))
            .validate("gone", Path::new("/nonexistent/skill.py"), "trials", &[])
            .await;
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].status, StageStatus::Errored);
        assert_eq!(report.overall_status(), OverallStatus::Errored);
    }

    #[tokio::test]
    async fn load_failure_stops_before_execute() {
        let host = FakeHost {
            parse: ok(""),
            load: fail(1, "ModuleNotFoundError: No module named 'requests'"),
            run: ok("unused"),
            run_delay: None,
        };
        let report = run(host, "trials").await;
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.outcomes[1].stage, Stage::Load);
        assert_eq!(report.outcomes[1].status, StageStatus::Failed);
        assert!(report.stdout.is_empty());
    }

    #[tokio::test]
    async fn execute_failure_still_records_output() {
        let host = FakeHost {
            parse: ok(""),
            load: ok(""),
            run: Ok(HostOutput {
                exit_code: Some(1),
                stdout: "partial output".into(),
                stderr: "KeyError: 'NCTId'".into(),
            }),
            run_delay: None,
        };
        let report = run(host, "trials").await;
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.outcomes[2].status, StageStatus::Failed);
        assert_eq!(report.stdout, "partial output");
        assert!(report.stderr.contains("KeyError"));
    }

    #[tokio::test(start_paused = true)]
    async fn execute_timeout_is_errored_with_bound_duration() {
        let host = FakeHost {
            parse: ok(""),
            load: ok(""),
            run: ok("would have printed this"),
            run_delay: Some(Duration::from_secs(300)),
        };
        let (_dir, path) = script_on_disk();
        let report = Validator::new(host, Duration::from_secs(60))
            .validate("slow", &path, "trials", &[])
            .await;
        let execute = &report.outcomes[2];
        assert_eq!(execute.status, StageStatus::Errored);
        assert_eq!(execute.duration_secs, Some(60.0));
        assert_eq!(report.overall_status(), OverallStatus::Errored);
        // Nothing the process would eventually have printed leaks in.
        assert!(report.stdout.is_empty());
    }

    #[tokio::test]
    async fn empty_output_fails_inspection() {
        let report = run(FakeHost::all_passing("   \n"), "trials").await;
        let inspect = &report.outcomes[3];
        assert_eq!(inspect.stage, Stage::InspectOutput);
        assert_eq!(inspect.status, StageStatus::Failed);
        assert!(inspect.message.contains("no output"));
    }

    #[tokio::test]
    async fn zero_result_output_fails_and_skips_shape() {
        let report = run(FakeHost::all_passing("Total trials: 0\n"), "trials").await;
        assert_eq!(report.outcomes.len(), 5);
        let inspect = &report.outcomes[3];
        assert_eq!(inspect.status, StageStatus::Failed);
        assert_eq!(inspect.details["matched_phrase"], "Total trials: 0");
        assert_eq!(report.outcomes[4].status, StageStatus::Skipped);
        assert_eq!(report.overall_status(), OverallStatus::Failed);
    }

    #[tokio::test]
    async fn shape_mismatch_fails_with_token_lists() {
        let report = run(FakeHost::all_passing("some text with substance\n"), "trials").await;
        let shape = &report.outcomes[4];
        assert_eq!(shape.stage, Stage::InspectShape);
        assert_eq!(shape.status, StageStatus::Failed);
        assert!(shape.details.contains_key("expected_tokens"));
        assert_eq!(shape.details["matched_tokens"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn unknown_category_uses_generic_shape() {
        let report = run(FakeHost::all_passing("Found 7 entries, total 7\n"), "weather").await;
        assert_eq!(report.overall_status(), OverallStatus::Passed);
        assert_eq!(report.outcomes[4].details["shape"], "generic");
    }

    #[tokio::test]
    async fn idempotent_for_unchanged_input() {
        let stdout = "NCT1 Phase 1\n";
        let first = run(FakeHost::all_passing(stdout), "trials").await;
        let second = run(FakeHost::all_passing(stdout), "trials").await;
        assert_eq!(first.overall_status(), second.overall_status());
        let statuses = |r: &ValidationReport| r.outcomes.iter().map(|o| o.status).collect::<Vec<_>>();
        assert_eq!(statuses(&first), statuses(&second));
    }
}
