use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One registry entry: a named, independently executable skill script
/// plus its invocation metadata and last known health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillRecord {
    /// Skill name — the unique key across the registry.
    pub name: String,
    /// Path to the executable skill script.
    pub script_path: String,
    /// Domain category (e.g. "trials", "publications"). Drives output-shape checks.
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub invocation: Invocation,
    #[serde(default)]
    pub health: Health,
}

impl SkillRecord {
    /// Minimal record with unknown health, for newly admitted skills.
    pub fn new(name: impl Into<String>, script_path: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script_path: script_path.into(),
            category: category.into(),
            invocation: Invocation::default(),
            health: Health::default(),
        }
    }
}

/// How a skill expects to be called.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Invocation {
    /// Whether the skill may be invoked at all.
    pub enabled: bool,
    pub arg_format: ArgFormat,
    /// Human-readable argument signature, e.g. "<condition> [--max N]".
    pub signature: Option<String>,
    /// Example invocation shown to callers.
    pub example: Option<String>,
}

impl Default for Invocation {
    fn default() -> Self {
        Self {
            enabled: true,
            arg_format: ArgFormat::Unknown,
            signature: None,
            example: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArgFormat {
    /// Arguments are passed in order, space-joined.
    Positional,
    /// Arguments are passed as `--key value` pairs.
    Named,
    #[default]
    Unknown,
}

/// Last known health of a skill. Mutated only by the batch coordinator
/// (or the equivalent single-skill test-and-update path).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Health {
    pub status: HealthStatus,
    /// Flattened issue descriptions from the most recent failing run.
    pub issues: Vec<String>,
    /// When the skill was last validated (ISO-8601 in the registry file).
    pub last_tested: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Broken,
    #[default]
    Unknown,
}
