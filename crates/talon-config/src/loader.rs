use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::schema::TalonConfig;

/// Loads the Talon configuration from disk with env-var overrides.
#[derive(Debug)]
pub struct ConfigLoader {
    config: TalonConfig,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > TALON_CONFIG env > ~/.talon/talon.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("TALON_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".talon")
            .join("talon.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> talon_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            toml::from_str::<TalonConfig>(&raw).map_err(|e| {
                talon_core::TalonError::Config(format!(
                    "failed to parse {}: {}",
                    config_path.display(),
                    e
                ))
            })?
        } else {
            TalonConfig::default()
        };

        let config = Self::apply_env_overrides(config);

        // Validate — log warnings, fail on errors
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(talon_core::TalonError::Config(e));
            }
        }

        Ok(Self { config, config_path })
    }

    /// Get a snapshot of the loaded config.
    pub fn get(&self) -> TalonConfig {
        self.config.clone()
    }

    /// Path the config was loaded from (or would be loaded from).
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply env var overrides (TALON_REGISTRY, TALON_TIMEOUT_SECS, etc.)
    fn apply_env_overrides(mut config: TalonConfig) -> TalonConfig {
        if let Ok(v) = std::env::var("TALON_REGISTRY") {
            config.registry.path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("TALON_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse::<u64>() {
                config.validator.timeout_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("TALON_INTERPRETER") {
            config.validator.interpreter = v;
        }
        if let Ok(v) = std::env::var("TALON_MAX_ITERATIONS") {
            if let Ok(n) = v.parse::<u32>() {
                config.repair.max_iterations = n;
            }
        }
        if let Ok(v) = std::env::var("TALON_PARALLELISM") {
            if let Ok(n) = v.parse::<usize>() {
                config.batch.parallelism = n;
            }
        }
        if let Ok(v) = std::env::var("TALON_LOG_LEVEL") {
            config.logging.level = v;
        }
        config
    }
}
