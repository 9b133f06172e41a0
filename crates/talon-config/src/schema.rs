use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration — maps to `talon.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TalonConfig {
    pub registry: RegistryConfig,
    pub validator: ValidatorConfig,
    pub repair: RepairConfig,
    pub batch: BatchConfig,
    pub logging: LoggingConfig,
}

impl Default for TalonConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            validator: ValidatorConfig::default(),
            repair: RepairConfig::default(),
            batch: BatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl TalonConfig {
    /// Validate the config. Returns warnings for suspicious-but-workable
    /// values; errors only for values that cannot work at all.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        let mut warnings = Vec::new();

        if self.validator.timeout_secs == 0 {
            return Err("validator.timeout_secs must be greater than 0".into());
        }
        if self.validator.timeout_secs > 600 {
            warnings.push(format!(
                "validator.timeout_secs = {} is very high; skills should answer within a minute",
                self.validator.timeout_secs
            ));
        }
        if self.repair.max_iterations == 0 {
            return Err("repair.max_iterations must be at least 1".into());
        }
        if self.repair.max_iterations > 10 {
            warnings.push(format!(
                "repair.max_iterations = {} will burn generator budget; 3-5 is typical",
                self.repair.max_iterations
            ));
        }
        if self.batch.parallelism == 0 {
            return Err("batch.parallelism must be at least 1".into());
        }
        if self.validator.interpreter.trim().is_empty() {
            return Err("validator.interpreter must not be empty".into());
        }

        Ok(warnings)
    }
}

// ── Registry ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Path to the registry JSON file.
    pub path: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("skills.json"),
        }
    }
}

// ── Validator ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Hard wall-clock bound for the execute stage, in seconds.
    pub timeout_secs: u64,
    /// Interpreter used to host skill scripts.
    pub interpreter: String,
    /// Captured stdout/stderr are truncated to this many bytes.
    pub max_capture_bytes: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            interpreter: "python3".into(),
            max_capture_bytes: 64 * 1024,
        }
    }
}

// ── Repair ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// Maximum validate → repair iterations before escalation.
    pub max_iterations: u32,
    /// Bound on stdout/stderr excerpts embedded in repair prompts.
    pub excerpt_bytes: usize,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            excerpt_bytes: 2_000,
        }
    }
}

// ── Batch ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Concurrent skill validations during a batch run.
    pub parallelism: usize,
    /// Write health back to the registry after each batch run.
    pub update_health: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            update_health: false,
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter: trace, debug, info, warn, error.
    pub level: String,
    /// "pretty" or "json".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}
