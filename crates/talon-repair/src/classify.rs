use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use talon_core::{Stage, TestOutcome, ValidationReport};

/// Typed issue taxonomy. One variant per failure class the pipeline can see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IssueType {
    SyntaxError,
    ImportError,
    ExecutionError,
    DataValidationError,
    SchemaValidationError,
}

/// Severity ranks, declared in sort order: critical first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

/// One classified issue, derived deterministically from a failing outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairInstruction {
    pub issue_type: IssueType,
    pub severity: Severity,
    pub description: String,
    /// Templated guidance for the code generator.
    pub suggested_fix: String,
    /// Line reference extracted from the error text, when one is present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_location: Option<String>,
}

/// A recognized defect signature: a named pattern and its fix template.
struct Signature {
    name: &'static str,
    pattern: Regex,
    fix: &'static str,
}

fn sig(name: &'static str, pattern: &str, fix: &'static str) -> Signature {
    Signature {
        name,
        pattern: Regex::new(pattern).expect("invalid defect signature"),
        fix,
    }
}

static LOAD_SIGNATURES: Lazy<Vec<Signature>> = Lazy::new(|| {
    vec![
        sig(
            "missing-dependency",
            r"(?i)ModuleNotFoundError|ImportError: No module named",
            "Replace the missing third-party dependency with one available in the runtime, \
             or inline the needed functionality using the standard library.",
        ),
        sig(
            "bad-reference",
            r"(?i)cannot import name|FileNotFoundError|No such file or directory",
            "Fix the import or file reference: the skill must only reference modules and \
             paths that exist relative to its own location.",
        ),
    ]
});

static EXECUTE_SIGNATURES: Lazy<Vec<Signature>> = Lazy::new(|| {
    vec![
        sig(
            "data-access-fault",
            r"KeyError|AttributeError|IndexError|TypeError",
            "Add defensive access for response fields: use .get() with defaults, check for \
             None, and guard list indexing before use.",
        ),
        sig(
            "network-fault",
            r"(?i)timed?\s?-?out|ConnectionError|ConnectionRefused|ConnectionReset|getaddrinfo|unreachable|Temporary failure in name resolution",
            "Add a request timeout and retry-with-backoff around the network call, and \
             print a clear message when the data source is unreachable.",
        ),
        sig(
            "upstream-api-fault",
            r"(?i)\b(?:429|500|502|503)\b|rate.?limit|quota exceeded|API error|server error",
            "Handle upstream API errors explicitly: back off on rate limits, surface the \
             HTTP status, and avoid retry storms.",
        ),
    ]
});

/// Map every failing outcome of a report to one instruction, sorted
/// critical → low. A passing report yields an empty list.
pub fn classify_report(report: &ValidationReport) -> Vec<RepairInstruction> {
    let mut instructions: Vec<RepairInstruction> = report
        .failing_outcomes()
        .into_iter()
        .map(|outcome| classify_outcome(outcome, report))
        .collect();
    instructions.sort_by_key(|i| i.severity);
    instructions
}

fn classify_outcome(outcome: &TestOutcome, report: &ValidationReport) -> RepairInstruction {
    match outcome.stage {
        Stage::Parse => parse_instruction(outcome),
        Stage::Load => load_instruction(outcome),
        Stage::Execute => execute_instruction(outcome, report),
        Stage::InspectOutput => output_instruction(outcome),
        Stage::InspectShape => shape_instruction(outcome),
    }
}

fn parse_instruction(outcome: &TestOutcome) -> RepairInstruction {
    let error_text = detail_str(outcome, "stderr").unwrap_or(&outcome.message);
    RepairInstruction {
        issue_type: IssueType::SyntaxError,
        severity: Severity::Critical,
        description: format!("The script does not parse: {}", outcome.message),
        suggested_fix: "Rewrite the invalid construct so the file compiles cleanly; \
                        check brackets, indentation, and string quoting near the reported line."
            .into(),
        code_location: extract_line(error_text),
    }
}

fn load_instruction(outcome: &TestOutcome) -> RepairInstruction {
    let stderr = detail_str(outcome, "stderr").unwrap_or(&outcome.message);
    let (description, fix) = match LOAD_SIGNATURES.iter().find(|s| s.pattern.is_match(stderr)) {
        Some(s) => (
            format!("Module-level load failed ({}): {}", s.name, outcome.message),
            s.fix.to_string(),
        ),
        None => (
            format!("Module-level load failed: {}", outcome.message),
            "Make every top-level import and statement succeed without invoking the \
             entry point; move side effects under the main guard."
                .into(),
        ),
    };
    RepairInstruction {
        issue_type: IssueType::ImportError,
        severity: Severity::Critical,
        description,
        suggested_fix: fix,
        code_location: extract_line(stderr),
    }
}

fn execute_instruction(outcome: &TestOutcome, report: &ValidationReport) -> RepairInstruction {
    // Runtime faults surface on stderr; some APIs print errors to stdout.
    let error_text = format!("{}\n{}", report.stderr, report.stdout);
    let (description, fix) = match EXECUTE_SIGNATURES.iter().find(|s| s.pattern.is_match(&error_text)) {
        Some(s) => (
            format!("Execution failed ({}): {}", s.name, outcome.message),
            s.fix.to_string(),
        ),
        None => (
            format!("Execution failed: {}", outcome.message),
            format!(
                "Add defensive handling around the failing operation. Captured error: {}",
                first_nonempty_line(&error_text).unwrap_or("(no error text captured)")
            ),
        ),
    };
    RepairInstruction {
        issue_type: IssueType::ExecutionError,
        severity: Severity::High,
        description,
        suggested_fix: fix,
        code_location: extract_line(&error_text),
    }
}

fn output_instruction(outcome: &TestOutcome) -> RepairInstruction {
    // Empty output is a code defect; a zero-result phrase usually means the
    // query parameters need tuning, not the code.
    let zero_result = outcome.details.contains_key("matched_phrase");
    let suggested_fix = if zero_result {
        "The skill ran but its query matched nothing. Broaden or correct the default \
         query parameters (spelling, date ranges, filters) so a plain invocation \
         returns at least one result."
            .to_string()
    } else {
        "The skill exited cleanly but printed nothing. Make sure results are written \
         to standard output, including a summary line when the fetch succeeds."
            .to_string()
    };
    RepairInstruction {
        issue_type: IssueType::DataValidationError,
        severity: Severity::High,
        description: format!("Output inspection failed: {}", outcome.message),
        suggested_fix,
        code_location: None,
    }
}

fn shape_instruction(outcome: &TestOutcome) -> RepairInstruction {
    let expected = detail_list(outcome, "expected_tokens");
    let matched = detail_list(outcome, "matched_tokens");
    RepairInstruction {
        issue_type: IssueType::SchemaValidationError,
        severity: Severity::Medium,
        description: format!("Output shape check failed: {}", outcome.message),
        suggested_fix: format!(
            "Include the fields callers expect for this category. Expected any of [{}]; output contained [{}].",
            expected.join(", "),
            matched.join(", ")
        ),
        code_location: None,
    }
}

fn detail_str<'a>(outcome: &'a TestOutcome, key: &str) -> Option<&'a str> {
    outcome.details.get(key).and_then(|v| v.as_str())
}

fn detail_list(outcome: &TestOutcome, key: &str) -> Vec<String> {
    outcome
        .details
        .get(key)
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

static LINE_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)line (\d+)").expect("line pattern"));

fn extract_line(text: &str) -> Option<String> {
    LINE_REF
        .captures(text)
        .map(|c| format!("line {}", &c[1]))
}

fn first_nonempty_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|l| !l.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use talon_core::StageStatus;

    fn report_with(outcomes: Vec<TestOutcome>, stdout: &str, stderr: &str) -> ValidationReport {
        ValidationReport {
            skill_name: "demo".into(),
            script_path: "/skills/demo.py".into(),
            outcomes,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    #[test]
    fn passing_report_yields_nothing() {
        let r = report_with(vec![TestOutcome::passed(Stage::Parse, "ok")], "", "");
        assert!(classify_report(&r).is_empty());
    }

    #[test]
    fn parse_failure_is_critical_syntax_error_with_line() {
        let outcome = TestOutcome::failed(Stage::Parse, "syntax check failed (exit 1)")
            .with_detail("stderr", "  File \"demo.py\", line 14\nSyntaxError: invalid syntax");
        let r = report_with(vec![outcome], "", "");
        let instr = classify_report(&r);
        assert_eq!(instr.len(), 1);
        assert_eq!(instr[0].issue_type, IssueType::SyntaxError);
        assert_eq!(instr[0].severity, Severity::Critical);
        assert_eq!(instr[0].code_location.as_deref(), Some("line 14"));
    }

    #[test]
    fn missing_module_subclassified() {
        let outcome = TestOutcome::failed(Stage::Load, "module load failed (exit 1)")
            .with_detail("stderr", "ModuleNotFoundError: No module named 'pandas'");
        let r = report_with(vec![outcome], "", "");
        let instr = &classify_report(&r)[0];
        assert_eq!(instr.issue_type, IssueType::ImportError);
        assert!(instr.description.contains("missing-dependency"));
        assert!(instr.suggested_fix.contains("standard library"));
    }

    #[test]
    fn bad_path_subclassified() {
        let outcome = TestOutcome::failed(Stage::Load, "module load failed (exit 1)")
            .with_detail("stderr", "FileNotFoundError: No such file or directory: 'cache.json'");
        let r = report_with(vec![outcome], "", "");
        assert!(classify_report(&r)[0].description.contains("bad-reference"));
    }

    #[test]
    fn key_error_maps_to_data_access_fault() {
        let outcome = TestOutcome::failed(Stage::Execute, "execution failed (exit 1)");
        let r = report_with(vec![outcome], "", "Traceback...\nKeyError: 'NCTId'");
        let instr = &classify_report(&r)[0];
        assert_eq!(instr.issue_type, IssueType::ExecutionError);
        assert_eq!(instr.severity, Severity::High);
        assert!(instr.description.contains("data-access-fault"));
        assert!(instr.suggested_fix.contains(".get()"));
    }

    #[test]
    fn timeout_maps_to_network_fault() {
        let outcome = TestOutcome::errored(Stage::Execute, "execution timed out after 60s");
        let r = report_with(vec![outcome], "", "requests.exceptions.ConnectTimeout: timed out");
        assert!(classify_report(&r)[0].description.contains("network-fault"));
    }

    #[test]
    fn rate_limit_maps_to_upstream_fault() {
        let outcome = TestOutcome::failed(Stage::Execute, "execution failed (exit 1)");
        let r = report_with(vec![outcome], "HTTP 429 Too Many Requests", "");
        assert!(classify_report(&r)[0].description.contains("upstream-api-fault"));
    }

    #[test]
    fn unrecognized_fault_gets_generic_fix_with_error_text() {
        let outcome = TestOutcome::failed(Stage::Execute, "execution failed (exit 7)");
        let r = report_with(vec![outcome], "", "bizarre self-inflicted failure");
        let instr = &classify_report(&r)[0];
        assert!(instr.suggested_fix.contains("defensive handling"));
        assert!(instr.suggested_fix.contains("bizarre self-inflicted failure"));
    }

    #[test]
    fn zero_result_vs_empty_output_fixes_differ() {
        let zero = TestOutcome::failed(Stage::InspectOutput, "output indicates zero results")
            .with_detail("matched_phrase", "0 trials found");
        let empty = TestOutcome::failed(Stage::InspectOutput, "skill produced no output");

        let zero_instr = &classify_report(&report_with(vec![zero], "", ""))[0];
        let empty_instr = &classify_report(&report_with(vec![empty], "", ""))[0];

        assert_eq!(zero_instr.issue_type, IssueType::DataValidationError);
        assert_eq!(zero_instr.severity, Severity::High);
        assert!(zero_instr.suggested_fix.contains("query parameters"));
        assert!(empty_instr.suggested_fix.contains("standard output"));
    }

    #[test]
    fn shape_failure_lists_expected_vs_matched() {
        let outcome = TestOutcome::failed(Stage::InspectShape, "output does not look like trials data")
            .with_detail("expected_tokens", vec!["nct", "phase"])
            .with_detail("matched_tokens", Vec::<&str>::new());
        let instr = &classify_report(&report_with(vec![outcome], "", ""))[0];
        assert_eq!(instr.issue_type, IssueType::SchemaValidationError);
        assert_eq!(instr.severity, Severity::Medium);
        assert!(instr.suggested_fix.contains("nct, phase"));
    }

    #[test]
    fn instructions_sorted_by_severity() {
        let outcomes = vec![
            TestOutcome::failed(Stage::InspectShape, "shape"),
            TestOutcome::failed(Stage::Execute, "exec"),
            TestOutcome::failed(Stage::Parse, "parse"),
        ];
        // A report like this can't come out of the pipeline (short-circuit),
        // but the classifier must not depend on that.
        let instr = classify_report(&report_with(outcomes, "", ""));
        let severities: Vec<Severity> = instr.iter().map(|i| i.severity).collect();
        assert_eq!(severities, vec![Severity::Critical, Severity::High, Severity::Medium]);
    }

    #[test]
    fn skipped_outcomes_are_not_classified() {
        let outcomes = vec![
            TestOutcome::failed(Stage::InspectOutput, "zero"),
            TestOutcome::skipped(Stage::InspectShape, "not reached"),
        ];
        assert_eq!(classify_report(&report_with(outcomes, "", "")).len(), 1);
    }

    #[test]
    fn issue_type_serializes_camel_case() {
        let json = serde_json::to_string(&IssueType::DataValidationError).unwrap();
        assert_eq!(json, "\"dataValidationError\"");
        // StageStatus untouched by this: sanity-pin the boundary.
        assert_eq!(serde_json::to_string(&StageStatus::Failed).unwrap(), "\"failed\"");
    }
}
