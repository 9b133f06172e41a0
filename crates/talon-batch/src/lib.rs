//! # talon-batch
//!
//! Runs the staged validator over every record in the registry with bounded
//! parallelism, aggregates the results, and optionally writes health back.

use std::path::Path;
use std::sync::Arc;

use futures::{StreamExt, stream};
use serde::Serialize;
use tracing::{info, warn};

use talon_core::{HealthStatus, Result, SkillRecord};
use talon_registry::SharedRegistry;
use talon_repair::classify_report;
use talon_validator::{SkillHost, Validator};

/// Verdict for one skill in a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillTestStatus {
    Healthy,
    Broken,
    /// The script file is missing; validation was not attempted.
    Untested,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerSkillResult {
    pub skill_name: String,
    pub status: SkillTestStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
}

/// Aggregate across the whole registry.
#[derive(Debug, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub healthy_count: usize,
    pub broken_count: usize,
    pub untested_count: usize,
    pub per_skill: Vec<PerSkillResult>,
}

impl BatchSummary {
    pub fn healthy_percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.healthy_count as f64 / self.total as f64 * 100.0
        }
    }

    /// Aggregate health tier for shell automation:
    /// 0 all healthy, 1 mixed, 2 mostly broken.
    pub fn exit_tier(&self) -> u8 {
        if self.healthy_count == self.total {
            0
        } else if self.broken_count > self.healthy_count {
            2
        } else {
            1
        }
    }
}

/// Runs the validator once per registry record. Skills are independent units
/// of work, so they run on a bounded worker pool; the per-skill timeout is
/// per worker.
pub struct BatchCoordinator<H> {
    validator: Arc<Validator<H>>,
    parallelism: usize,
    update_health: bool,
}

impl<H: SkillHost + 'static> BatchCoordinator<H> {
    pub fn new(validator: Validator<H>, parallelism: usize, update_health: bool) -> Self {
        Self {
            validator: Arc::new(validator),
            parallelism: parallelism.max(1),
            update_health,
        }
    }

    pub async fn run(&self, registry: &SharedRegistry) -> Result<BatchSummary> {
        let records: Vec<SkillRecord> = registry.lock().all().to_vec();
        info!(total = records.len(), parallelism = self.parallelism, "starting batch validation");

        let mut per_skill: Vec<PerSkillResult> = stream::iter(records)
            .map(|record| {
                let validator = Arc::clone(&self.validator);
                async move { test_one(&validator, &record).await }
            })
            .buffer_unordered(self.parallelism)
            .collect()
            .await;

        // Deterministic output regardless of completion order.
        per_skill.sort_by(|a, b| a.skill_name.cmp(&b.skill_name));

        if self.update_health {
            let mut reg = registry.lock();
            for result in &per_skill {
                let (status, issues) = match result.status {
                    SkillTestStatus::Healthy => (HealthStatus::Healthy, Vec::new()),
                    SkillTestStatus::Broken => (HealthStatus::Broken, result.issues.clone()),
                    SkillTestStatus::Untested => (HealthStatus::Unknown, result.issues.clone()),
                };
                reg.upsert_health(&result.skill_name, status, issues)?;
            }
            reg.commit()?;
        }

        let healthy_count = per_skill.iter().filter(|r| r.status == SkillTestStatus::Healthy).count();
        let broken_count = per_skill.iter().filter(|r| r.status == SkillTestStatus::Broken).count();
        let untested_count = per_skill.iter().filter(|r| r.status == SkillTestStatus::Untested).count();

        let summary = BatchSummary {
            total: per_skill.len(),
            healthy_count,
            broken_count,
            untested_count,
            per_skill,
        };
        info!(
            healthy = summary.healthy_count,
            broken = summary.broken_count,
            untested = summary.untested_count,
            "batch validation complete"
        );
        Ok(summary)
    }
}

async fn test_one<H: SkillHost>(validator: &Validator<H>, record: &SkillRecord) -> PerSkillResult {
    let script = Path::new(&record.script_path);
    if !script.exists() {
        warn!(skill = %record.name, path = %record.script_path, "script file missing, skipping validation");
        return PerSkillResult {
            skill_name: record.name.clone(),
            status: SkillTestStatus::Untested,
            issues: vec!["file not found".into()],
        };
    }

    let report = validator.validate(&record.name, script, &record.category, &[]).await;
    if report.passed() {
        PerSkillResult {
            skill_name: record.name.clone(),
            status: SkillTestStatus::Healthy,
            issues: Vec::new(),
        }
    } else {
        let issues = classify_report(&report)
            .into_iter()
            .map(|i| i.description)
            .collect();
        PerSkillResult {
            skill_name: record.name.clone(),
            status: SkillTestStatus::Broken,
            issues,
        }
    }
}
