use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use talon_core::{HealthStatus, Result, SkillRecord, TalonError};

/// Shared handle for components that write the registry concurrently
/// (a parallel batch run funnels all health write-backs through one of these).
pub type SharedRegistry = Arc<Mutex<Registry>>;

/// On-disk shape: `{version, skills: [...]}`. The version counts commits and
/// backs the optimistic conflict check.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryDoc {
    version: u64,
    skills: Vec<SkillRecord>,
}

impl Default for RegistryDoc {
    fn default() -> Self {
        Self { version: 0, skills: Vec::new() }
    }
}

/// The skill registry — a persisted collection of skill records.
///
/// Reads are free-form; mutations accumulate in memory and land on disk via
/// [`Registry::commit`], which serializes concurrent read-modify-write
/// sequences with a version check: if another writer committed since this
/// handle loaded the file, the commit fails instead of clobbering it.
pub struct Registry {
    path: PathBuf,
    doc: RegistryDoc,
    loaded_version: u64,
}

impl Registry {
    /// Open the registry file, or start an empty registry if it doesn't exist yet.
    pub fn open(path: &Path) -> Result<Self> {
        let doc = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str::<RegistryDoc>(&raw).map_err(|e| {
                TalonError::Registry(format!("failed to parse {}: {}", path.display(), e))
            })?
        } else {
            debug!(?path, "registry file not found, starting empty");
            RegistryDoc::default()
        };

        let loaded_version = doc.version;
        Ok(Self {
            path: path.to_path_buf(),
            doc,
            loaded_version,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up a record by exact name.
    pub fn lookup(&self, name: &str) -> Option<&SkillRecord> {
        self.doc.skills.iter().find(|s| s.name == name)
    }

    /// All records, in file order.
    pub fn all(&self) -> &[SkillRecord] {
        &self.doc.skills
    }

    pub fn len(&self) -> usize {
        self.doc.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc.skills.is_empty()
    }

    /// Insert a new record. Rejects duplicates before anything is written;
    /// the existing record is never touched.
    pub fn insert(&mut self, record: SkillRecord) -> Result<()> {
        if self.lookup(&record.name).is_some() {
            return Err(TalonError::DuplicateName(record.name));
        }
        info!(skill = %record.name, "inserting skill record");
        self.doc.skills.push(record);
        Ok(())
    }

    /// Update a skill's health fields and stamp `last_tested`.
    pub fn upsert_health(&mut self, name: &str, status: HealthStatus, issues: Vec<String>) -> Result<()> {
        let record = self
            .doc
            .skills
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| TalonError::SkillNotFound(name.to_string()))?;
        record.health.status = status;
        record.health.issues = issues;
        record.health.last_tested = Some(Utc::now());
        Ok(())
    }

    /// Persist in-memory state. Fails with [`TalonError::RegistryConflict`]
    /// when another writer advanced the file since this handle loaded it;
    /// otherwise writes version+1 atomically (temp file + rename).
    pub fn commit(&mut self) -> Result<()> {
        if self.path.exists() {
            let raw = std::fs::read_to_string(&self.path)?;
            let on_disk = serde_json::from_str::<RegistryDoc>(&raw).map_err(|e| {
                TalonError::Registry(format!("failed to re-read {}: {}", self.path.display(), e))
            })?;
            if on_disk.version != self.loaded_version {
                return Err(TalonError::RegistryConflict {
                    loaded: self.loaded_version,
                    on_disk: on_disk.version,
                });
            }
        }

        self.doc.version = self.loaded_version + 1;
        let dir = self.path.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, &self.doc)?;
        tmp.persist(&self.path)
            .map_err(|e| TalonError::Registry(format!("failed to persist registry: {}", e)))?;

        self.loaded_version = self.doc.version;
        debug!(version = self.doc.version, path = ?self.path, "registry committed");
        Ok(())
    }
}
