//! Heuristic rule sets for output inspection.
//!
//! These are best-effort classifiers over free text, not contracts. They are
//! named and versioned so they can be tested and evolved independently of
//! the pipeline that applies them.

use once_cell::sync::Lazy;
use regex::Regex;

/// Bump when rules are added or changed; recorded in outcome details so old
/// reports stay interpretable.
pub const RULESET_VERSION: &str = "2026.08";

// ── Zero-result detection ──────────────────────────────────────

/// One named zero-result signature.
pub struct ZeroResultRule {
    pub name: &'static str,
    pub pattern: Regex,
}

static ZERO_RESULT_RULES: Lazy<Vec<ZeroResultRule>> = Lazy::new(|| {
    let rule = |name, pat: &str| ZeroResultRule {
        name,
        pattern: Regex::new(pat).expect("invalid zero-result pattern"),
    };
    vec![
        // "0 trials found", "0 results found", "Found 0 studies"
        rule("zero-found", r"(?i)\b(?:found\s+)?0\s+(?:trials?|results?|records?|studies|matches|items?|publications?)(?:\s+found)?\b"),
        // "No results", "no trials found", "No matching studies"
        rule("no-results", r"(?i)\bno\s+(?:matching\s+)?(?:trials?|results?|records?|studies|matches|data|publications?)(?:\s+found)?\b"),
        // "Total: 0", "Total trials: 0"
        rule("total-zero", r"(?i)\btotal[^:\n]*:\s*0\b"),
        // "Nothing found"
        rule("nothing-found", r"(?i)\bnothing\s+found\b"),
    ]
});

/// Match captured stdout against the zero-result rule set. Returns the rule
/// name and the matched phrase.
pub fn zero_result_match(stdout: &str) -> Option<(&'static str, String)> {
    for rule in ZERO_RESULT_RULES.iter() {
        if let Some(m) = rule.pattern.find(stdout) {
            return Some((rule.name, m.as_str().to_string()));
        }
    }
    None
}

// ── Output-shape inference ─────────────────────────────────────

/// Token classes a category's output is expected to mention. The check
/// passes when at least one expected token appears in stdout.
pub struct OutputShape {
    pub category: &'static str,
    pub expected_tokens: &'static [&'static str],
}

static SHAPES: &[OutputShape] = &[
    OutputShape {
        category: "trials",
        expected_tokens: &["nct", "phase", "status", "sponsor", "enrollment", "condition"],
    },
    OutputShape {
        category: "publications",
        expected_tokens: &["pmid", "doi", "journal", "author", "title", "abstract"],
    },
    OutputShape {
        category: "safety",
        expected_tokens: &["adverse", "event", "reaction", "serious", "outcome"],
    },
    OutputShape {
        category: "approvals",
        expected_tokens: &["approval", "approved", "indication", "submission", "label"],
    },
];

static GENERIC_SHAPE: OutputShape = OutputShape {
    category: "generic",
    expected_tokens: &["total", "found", "result", "count", "name"],
};

/// Shape for a skill category; unmatched categories fall back to a generic shape.
pub fn shape_for_category(category: &str) -> &'static OutputShape {
    let category = category.to_ascii_lowercase();
    SHAPES
        .iter()
        .find(|s| s.category == category)
        .unwrap_or(&GENERIC_SHAPE)
}

/// Expected tokens actually present in stdout (case-insensitive).
pub fn matched_tokens(shape: &OutputShape, stdout: &str) -> Vec<&'static str> {
    let haystack = stdout.to_ascii_lowercase();
    shape
        .expected_tokens
        .iter()
        .filter(|t| haystack.contains(**t))
        .copied()
        .collect()
}
