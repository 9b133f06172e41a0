//! # talon-guard
//!
//! Admission checks that keep two independent code paths from producing two
//! registry records for the same capability. Violations are data, not errors:
//! callers inspect the returned list, and admission is all-or-nothing.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use talon_core::{Result, SkillRecord};
use talon_registry::Registry;

/// One admission check that did not hold.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum GuardViolation {
    /// A record with this name already exists. Execute it instead of
    /// regenerating it.
    DuplicateSkill {
        existing: SkillRecord,
        suggestion: String,
    },
    /// The decision trace carries no evidence that a reuse/adapt/create
    /// decision procedure ran.
    MissingStrategy { detail: String },
    /// The trace decided "reuse an existing skill" but also contains
    /// fresh-code markers: the decision was computed but not honored.
    ReuseViolation { markers: Vec<String> },
}

impl GuardViolation {
    pub fn describe(&self) -> String {
        match self {
            GuardViolation::DuplicateSkill { existing, suggestion } => {
                format!("duplicate skill '{}': {}", existing.name, suggestion)
            }
            GuardViolation::MissingStrategy { detail } => {
                format!("missing discovery strategy: {detail}")
            }
            GuardViolation::ReuseViolation { markers } => {
                format!(
                    "reuse decision bypassed: fresh-code markers present ({})",
                    markers.join(", ")
                )
            }
        }
    }
}

/// Outcome of an admission attempt.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Admission {
    Admitted,
    Rejected { violations: Vec<GuardViolation> },
}

/// Evidence that a reuse/adapt/create decision procedure ran over the trace.
static STRATEGY_EVIDENCE: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)\b(decision|strategy)\s*:\s*(reuse|adapt|create)\b")
            .unwrap(),
        Regex::new(r"(?i)\b(reusing|adapting|creating)\b[^\n]*\bskill\b").unwrap(),
        Regex::new(r"(?i)\b(reuse|adapt|create)\b[^\n]*\b(existing|new)\s+skill\b").unwrap(),
    ]
});

/// The trace committed to reusing an existing skill.
static REUSE_DECISION: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)\b(decision|strategy)\s*:\s*reuse\b").unwrap(),
        Regex::new(r"(?i)\breusing\b[^\n]*\b(existing|registered)\b").unwrap(),
        Regex::new(r"(?i)\breuse\b[^\n]*\bexisting\s+skill\b").unwrap(),
    ]
});

/// Markers of fresh code generation inside free-text agent output. Heuristic
/// by design; the checks name what matched so a human can judge.
static FRESH_CODE_MARKERS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        (
            "function-definition",
            Regex::new(r"(?m)^\s*(async\s+)?def\s+\w+\s*\(").unwrap(),
        ),
        ("class-definition", Regex::new(r"(?m)^\s*class\s+\w+\s*[:(]").unwrap()),
        ("doc-scaffolding", Regex::new(r#"("""|''')"#).unwrap()),
        ("code-fence", Regex::new(r"(?m)^\s*```").unwrap()),
        ("shebang", Regex::new(r"(?m)^#!/").unwrap()),
    ]
});

/// Runs the admission checks. Stateless; holds only the knobs for which
/// checks apply.
pub struct DiscoveryGuard {
    check_duplicate: bool,
}

impl Default for DiscoveryGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoveryGuard {
    pub fn new() -> Self {
        Self { check_duplicate: true }
    }

    pub fn with_duplicate_check(mut self, enabled: bool) -> Self {
        self.check_duplicate = enabled;
        self
    }

    /// Run every check and return all violations found. Never fails: an
    /// admissible skill is an empty list.
    ///
    /// `trace` is the upstream decision trace (agent output). When absent the
    /// trace checks are skipped, since there is nothing to scan.
    pub fn check(
        &self,
        registry: &Registry,
        name: &str,
        trace: Option<&str>,
    ) -> Vec<GuardViolation> {
        let mut violations = Vec::new();

        if self.check_duplicate {
            if let Some(existing) = registry.lookup(name) {
                warn!(skill = name, "duplicate skill name in registry");
                violations.push(GuardViolation::DuplicateSkill {
                    existing: existing.clone(),
                    suggestion: format!(
                        "skill '{}' already exists at {}; execute it instead of generating a new one",
                        existing.name, existing.script_path
                    ),
                });
            }
        }

        if let Some(trace) = trace {
            if !STRATEGY_EVIDENCE.iter().any(|re| re.is_match(trace)) {
                violations.push(GuardViolation::MissingStrategy {
                    detail: "no reuse/adapt/create decision found in the trace".into(),
                });
            } else if REUSE_DECISION.iter().any(|re| re.is_match(trace)) {
                let markers: Vec<String> = FRESH_CODE_MARKERS
                    .iter()
                    .filter(|(_, re)| re.is_match(trace))
                    .map(|(marker, _)| (*marker).to_string())
                    .collect();
                if !markers.is_empty() {
                    warn!(skill = name, ?markers, "reuse decision bypassed by fresh code");
                    violations.push(GuardViolation::ReuseViolation { markers });
                }
            }
        }

        violations
    }

    /// All-or-nothing admission: any violation blocks the insert and the
    /// registry is left untouched. On success the record is inserted and
    /// committed.
    pub fn admit(
        &self,
        registry: &mut Registry,
        record: SkillRecord,
        trace: Option<&str>,
    ) -> Result<Admission> {
        let violations = self.check(registry, &record.name, trace);
        if !violations.is_empty() {
            return Ok(Admission::Rejected { violations });
        }

        info!(skill = %record.name, "admitting skill to registry");
        registry.insert(record)?;
        registry.commit()?;
        Ok(Admission::Admitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_registry(dir: &tempfile::TempDir) -> Registry {
        Registry::open(&dir.path().join("skills.json")).unwrap()
    }

    fn registry_with(dir: &tempfile::TempDir, name: &str) -> Registry {
        let mut reg = empty_registry(dir);
        reg.insert(SkillRecord::new(name, format!("/skills/{name}.py"), "trials"))
            .unwrap();
        reg
    }

    const CREATE_TRACE: &str =
        "Searched the registry for a matching capability. Decision: create a new skill.";
    const REUSE_TRACE_CLEAN: &str =
        "Found trials-search in the registry. Decision: reuse the existing skill and invoke it.";
    const REUSE_TRACE_BYPASSED: &str = r#"Decision: reuse the existing skill.
def search_trials(condition):
    """Fetch matching trials."""
    return fetch(condition)
"#;

    #[test]
    fn duplicate_name_attaches_existing_record() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry_with(&dir, "trials-search");

        let violations = DiscoveryGuard::new().check(&reg, "trials-search", None);
        assert_eq!(violations.len(), 1);
        match &violations[0] {
            GuardViolation::DuplicateSkill { existing, suggestion } => {
                assert_eq!(existing.name, "trials-search");
                assert!(suggestion.contains("execute it"));
            }
            other => panic!("expected DuplicateSkill, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_check_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry_with(&dir, "trials-search");

        let guard = DiscoveryGuard::new().with_duplicate_check(false);
        assert!(guard.check(&reg, "trials-search", None).is_empty());
    }

    #[test]
    fn trace_without_decision_is_missing_strategy() {
        let dir = tempfile::tempdir().unwrap();
        let reg = empty_registry(&dir);

        let violations =
            DiscoveryGuard::new().check(&reg, "new-skill", Some("wrote some code and moved on"));
        assert_eq!(violations.len(), 1);
        assert!(matches!(violations[0], GuardViolation::MissingStrategy { .. }));
    }

    #[test]
    fn create_decision_with_code_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let reg = empty_registry(&dir);

        let trace = format!("{CREATE_TRACE}\ndef search(c):\n    pass\n");
        assert!(DiscoveryGuard::new().check(&reg, "new-skill", Some(&trace)).is_empty());
    }

    #[test]
    fn reuse_decision_without_code_passes() {
        let dir = tempfile::tempdir().unwrap();
        let reg = empty_registry(&dir);

        assert!(
            DiscoveryGuard::new()
                .check(&reg, "trials-search", Some(REUSE_TRACE_CLEAN))
                .is_empty()
        );
    }

    #[test]
    fn reuse_decision_with_fresh_code_is_a_violation() {
        let dir = tempfile::tempdir().unwrap();
        let reg = empty_registry(&dir);

        let violations =
            DiscoveryGuard::new().check(&reg, "trials-search", Some(REUSE_TRACE_BYPASSED));
        assert_eq!(violations.len(), 1);
        match &violations[0] {
            GuardViolation::ReuseViolation { markers } => {
                assert!(markers.contains(&"function-definition".to_string()));
                assert!(markers.contains(&"doc-scaffolding".to_string()));
            }
            other => panic!("expected ReuseViolation, got {other:?}"),
        }
    }

    #[test]
    fn violations_accumulate_independently() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry_with(&dir, "dup");

        // Duplicate name and reuse bypass reported together.
        let violations = DiscoveryGuard::new().check(&reg, "dup", Some(REUSE_TRACE_BYPASSED));
        assert_eq!(violations.len(), 2);
    }

    #[test]
    fn admit_blocks_on_any_violation() {
        let dir = tempfile::tempdir().unwrap();
        let mut reg = registry_with(&dir, "dup");

        let record = SkillRecord::new("dup", "/skills/other.py", "trials");
        let admission = DiscoveryGuard::new().admit(&mut reg, record, None).unwrap();
        assert!(matches!(admission, Admission::Rejected { .. }));
        // The existing record is untouched.
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.lookup("dup").unwrap().script_path, "/skills/dup.py");
    }

    #[test]
    fn admit_inserts_and_commits_clean_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skills.json");
        let mut reg = Registry::open(&path).unwrap();

        let record = SkillRecord::new("fresh", "/skills/fresh.py", "publications");
        let admission = DiscoveryGuard::new()
            .admit(&mut reg, record, Some(CREATE_TRACE))
            .unwrap();
        assert!(matches!(admission, Admission::Admitted));

        let reloaded = Registry::open(&path).unwrap();
        assert!(reloaded.lookup("fresh").is_some());
    }

    #[test]
    fn violation_json_shape() {
        let v = GuardViolation::MissingStrategy {
            detail: "no decision".into(),
        };
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["kind"], "missingStrategy");
    }
}
