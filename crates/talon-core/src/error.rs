use thiserror::Error;

/// Unified error type for the entire Talon workspace.
#[derive(Error, Debug)]
pub enum TalonError {
    // ── Registry errors ────────────────────────────────────────
    #[error("registry error: {0}")]
    Registry(String),

    #[error("skill not found: {0}")]
    SkillNotFound(String),

    #[error("duplicate skill name: {0}")]
    DuplicateName(String),

    #[error("registry commit conflict: loaded version {loaded}, on-disk version {on_disk}")]
    RegistryConflict { loaded: u64, on_disk: u64 },

    // ── Validator / host errors ────────────────────────────────
    #[error("skill host error: {stage}: {reason}")]
    Host { stage: String, reason: String },

    #[error("validator error: {0}")]
    Validator(String),

    // ── Repair / generator errors ──────────────────────────────
    #[error("generator error: {0}")]
    Generator(String),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TalonError>;
