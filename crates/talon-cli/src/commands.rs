use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use parking_lot::Mutex;

use talon_batch::{BatchCoordinator, BatchSummary, SkillTestStatus};
use talon_config::{ConfigLoader, TalonConfig};
use talon_core::{HealthStatus, StageStatus, ValidationReport};
use talon_guard::DiscoveryGuard;
use talon_registry::{Registry, SharedRegistry, quick_lookup};
use talon_repair::{OrchestrationResult, Orchestrator, RepairState};
use talon_validator::{ProcessHost, Validator};

/// Talon — lifecycle manager for executable data-fetching skills
#[derive(Parser)]
#[command(name = "talon", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to talon.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the staged validator over one skill script
    ValidateSkill {
        /// Path to the skill script
        script: PathBuf,
        /// Skill name (defaults to the script file stem)
        #[arg(short, long)]
        name: Option<String>,
        /// Domain category driving output-shape checks (trials, publications, ...)
        #[arg(long)]
        category: Option<String>,
        /// Arguments forwarded to the skill's execute stage
        #[arg(long = "args", value_name = "ARG")]
        args: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate a skill and plan a repair iteration on failure
    Orchestrate {
        /// Path to the skill script
        script: PathBuf,
        /// Skill name (defaults to the script file stem)
        #[arg(short, long)]
        name: Option<String>,
        /// Domain category driving output-shape checks
        #[arg(long)]
        category: Option<String>,
        /// Arguments forwarded to the skill's execute stage
        #[arg(long = "args", value_name = "ARG")]
        args: Vec<String>,
        /// Current repair iteration (0 on the first attempt)
        #[arg(long, default_value = "0")]
        iteration: u32,
        /// Override the configured iteration bound
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the staged validator over every skill in the registry
    BatchTest {
        /// Write health results back to the registry
        #[arg(long)]
        update_health: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Write the JSON summary to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check a skill name and discovery trace for admission violations
    EnforceDiscovery {
        /// Name of the skill being admitted
        name: String,
        /// Upstream decision trace (agent output) to scan
        #[arg(long)]
        agent_output: Option<String>,
        /// Also check the name against the registry
        #[arg(long)]
        check_duplicate: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve a known skill name to its record and invocation command
    QuickLookup {
        /// Exact skill name
        name: String,
        /// Invocation arguments (key=value pairs for named-format skills)
        args: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Browse the skill registry
    Skill {
        #[command(subcommand)]
        action: SkillAction,
    },
}

#[derive(Subcommand)]
enum SkillAction {
    /// List registered skills with health status
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show details of one registered skill
    Show {
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Run the selected command and return the process exit code.
    pub async fn run(self) -> talon_core::Result<i32> {
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();

        // Resolve log level: --verbose > --quiet > --log-level > config default
        let log_level = if self.verbose {
            "debug".to_string()
        } else if self.quiet {
            "error".to_string()
        } else {
            self.log_level.clone().unwrap_or_else(|| config.logging.level.clone())
        };

        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
        if config.logging.format == "json" {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .json()
                .with_target(true)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        tracing::debug!(config = ?config_loader.path(), "configuration loaded");

        match self.command {
            Commands::ValidateSkill { script, name, category, args, json } => {
                Self::cmd_validate(&config, &script, name, category, args, json).await
            }
            Commands::Orchestrate {
                script,
                name,
                category,
                args,
                iteration,
                max_iterations,
                json,
            } => {
                Self::cmd_orchestrate(&config, &script, name, category, args, iteration, max_iterations, json)
                    .await
            }
            Commands::BatchTest { update_health, json, output } => {
                Self::cmd_batch(&config, update_health, json, output).await
            }
            Commands::EnforceDiscovery { name, agent_output, check_duplicate, json } => {
                Self::cmd_enforce(&config, &name, agent_output.as_deref(), check_duplicate, json)
            }
            Commands::QuickLookup { name, args, json } => {
                Self::cmd_quick_lookup(&config, &name, &args, json)
            }
            Commands::Skill { action } => Self::cmd_skill(&config, action),
        }
    }

    fn build_validator(config: &TalonConfig) -> Validator<ProcessHost> {
        let host = ProcessHost::python(&config.validator.interpreter)
            .with_max_capture_bytes(config.validator.max_capture_bytes);
        Validator::new(host, Duration::from_secs(config.validator.timeout_secs))
    }

    fn skill_name(explicit: Option<String>, script: &Path) -> String {
        explicit.unwrap_or_else(|| {
            script
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| script.to_string_lossy().into_owned())
        })
    }

    async fn cmd_validate(
        config: &TalonConfig,
        script: &Path,
        name: Option<String>,
        category: Option<String>,
        args: Vec<String>,
        json: bool,
    ) -> talon_core::Result<i32> {
        let name = Self::skill_name(name, script);
        let category = category.unwrap_or_default();
        let validator = Self::build_validator(config);

        let report = validator.validate(&name, script, &category, &args).await;

        if json {
            println!("{}", serde_json::to_string_pretty(&report_json(&report)?)?);
        } else {
            print_report(&report);
        }

        Ok(if report.passed() { 0 } else { 1 })
    }

    #[allow(clippy::too_many_arguments)]
    async fn cmd_orchestrate(
        config: &TalonConfig,
        script: &Path,
        name: Option<String>,
        category: Option<String>,
        args: Vec<String>,
        iteration: u32,
        max_iterations: Option<u32>,
        json: bool,
    ) -> talon_core::Result<i32> {
        let name = Self::skill_name(name, script);
        let category = category.unwrap_or_default();
        let validator = Self::build_validator(config);
        let orchestrator = Orchestrator::new(
            max_iterations.unwrap_or(config.repair.max_iterations),
            config.repair.excerpt_bytes,
        );

        let report = validator.validate(&name, script, &category, &args).await;
        let result = orchestrator.evaluate(report, iteration);

        if json {
            println!("{}", serde_json::to_string_pretty(&orchestration_json(&result)?)?);
        } else {
            print_orchestration(&result);
        }

        Ok(match result.state() {
            RepairState::Passed => 0,
            RepairState::RepairableFailure => 1,
            RepairState::Escalate => 2,
        })
    }

    async fn cmd_batch(
        config: &TalonConfig,
        update_health: bool,
        json: bool,
        output: Option<PathBuf>,
    ) -> talon_core::Result<i32> {
        let registry = Registry::open(&config.registry.path)?;
        let registry: SharedRegistry = Arc::new(Mutex::new(registry));

        let coordinator = BatchCoordinator::new(
            Self::build_validator(config),
            config.batch.parallelism,
            update_health || config.batch.update_health,
        );
        let summary = coordinator.run(&registry).await?;

        if let Some(path) = output {
            std::fs::write(&path, serde_json::to_string_pretty(&summary)?)?;
            println!("Wrote batch summary to {}", path.display());
        } else if json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            print_batch_summary(&summary);
        }

        Ok(summary.exit_tier() as i32)
    }

    fn cmd_enforce(
        config: &TalonConfig,
        name: &str,
        agent_output: Option<&str>,
        check_duplicate: bool,
        json: bool,
    ) -> talon_core::Result<i32> {
        let registry = Registry::open(&config.registry.path)?;
        let guard = DiscoveryGuard::new().with_duplicate_check(check_duplicate);
        let violations = guard.check(&registry, name, agent_output);

        if json {
            let value = serde_json::json!({
                "skill_name": name,
                "admissible": violations.is_empty(),
                "violations": violations,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        } else if violations.is_empty() {
            println!("✅ '{}' is admissible", name);
        } else {
            println!("❌ '{}' has {} violation(s):", name, violations.len());
            for v in &violations {
                println!("   • {}", v.describe());
            }
        }

        Ok(if violations.is_empty() { 0 } else { 1 })
    }

    fn cmd_quick_lookup(
        config: &TalonConfig,
        name: &str,
        args: &[String],
        json: bool,
    ) -> talon_core::Result<i32> {
        let registry = Registry::open(&config.registry.path)?;

        match quick_lookup(&registry, name, &config.validator.interpreter, args) {
            Some(result) => {
                if json {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                } else {
                    let health = if result.healthy { "✅ callable" } else { "❌ broken" };
                    println!("{} — {}", result.record.name, health);
                    println!("   Script: {}", result.record.script_path);
                    match &result.command {
                        Some(cmd) => println!("   Run: {}", cmd),
                        None => println!("   No invocation command available"),
                    }
                }
            }
            None => {
                if json {
                    println!("{}", serde_json::json!({ "found": false, "skill_name": name }));
                } else {
                    println!("Skill '{}' not found in {}", name, config.registry.path.display());
                }
            }
        }

        // Informational: the exit code carries no health signal.
        Ok(0)
    }

    fn cmd_skill(config: &TalonConfig, action: SkillAction) -> talon_core::Result<i32> {
        let registry = Registry::open(&config.registry.path)?;

        match action {
            SkillAction::List { json } => {
                if json {
                    println!("{}", serde_json::to_string_pretty(registry.all())?);
                } else if registry.is_empty() {
                    println!("No skills registered in {}", config.registry.path.display());
                } else {
                    println!("Registered skills ({}):\n", registry.len());
                    for rec in registry.all() {
                        println!(
                            "  {} {} [{}]",
                            health_symbol(rec.health.status),
                            rec.name,
                            rec.category
                        );
                        if let Some(ts) = rec.health.last_tested {
                            println!("     last tested: {}", ts.to_rfc3339());
                        }
                    }
                }
                Ok(0)
            }
            SkillAction::Show { name, json } => match registry.lookup(&name) {
                Some(rec) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(rec)?);
                    } else {
                        println!("{} {}", health_symbol(rec.health.status), rec.name);
                        println!("   Script:   {}", rec.script_path);
                        println!("   Category: {}", rec.category);
                        println!("   Format:   {:?}", rec.invocation.arg_format);
                        if let Some(ref sig) = rec.invocation.signature {
                            println!("   Signature: {}", sig);
                        }
                        if let Some(ref ex) = rec.invocation.example {
                            println!("   Example:  {}", ex);
                        }
                        if !rec.health.issues.is_empty() {
                            println!("   Issues:");
                            for issue in &rec.health.issues {
                                println!("     • {}", issue);
                            }
                        }
                        if let Some(ts) = rec.health.last_tested {
                            println!("   Last tested: {}", ts.to_rfc3339());
                        }
                    }
                    Ok(0)
                }
                None => {
                    println!("Skill '{}' not found.", name);
                    Ok(1)
                }
            },
        }
    }
}

// ── Output rendering ───────────────────────────────────────────

fn status_symbol(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Passed => "✅",
        StageStatus::Failed => "❌",
        StageStatus::Errored => "💥",
        StageStatus::Skipped => "⏭️ ",
    }
}

fn health_symbol(status: HealthStatus) -> &'static str {
    match status {
        HealthStatus::Healthy => "✅",
        HealthStatus::Broken => "❌",
        HealthStatus::Unknown => "❔",
    }
}

/// Full report as JSON, with the derived overall status attached.
fn report_json(report: &ValidationReport) -> talon_core::Result<serde_json::Value> {
    let mut value = serde_json::to_value(report)?;
    value["overall_status"] = serde_json::Value::String(report.overall_status().to_string());
    Ok(value)
}

fn orchestration_json(result: &OrchestrationResult) -> talon_core::Result<serde_json::Value> {
    let mut value = serde_json::to_value(result)?;
    value["state"] = serde_json::to_value(result.state())?;
    value["report"]["overall_status"] =
        serde_json::Value::String(result.report.overall_status().to_string());
    Ok(value)
}

fn print_report(report: &ValidationReport) {
    println!("Validating '{}' ({})\n", report.skill_name, report.script_path);

    for outcome in &report.outcomes {
        println!("  {} {} — {}", status_symbol(outcome.status), outcome.stage, outcome.message);
        if outcome.status != StageStatus::Passed && !outcome.details.is_empty() {
            for (key, value) in &outcome.details {
                println!("       {}: {}", key, value);
            }
        }
        if let Some(secs) = outcome.duration_secs {
            println!("       duration: {:.1}s", secs);
        }
    }

    println!("\nOverall: {}", report.overall_status());
}

fn print_orchestration(result: &OrchestrationResult) {
    print_report(&result.report);

    if !result.needs_repair {
        return;
    }

    println!(
        "\nRepair iteration {} of {} for '{}':",
        result.iteration, result.max_iterations, result.skill_name
    );
    for instruction in &result.instructions {
        println!(
            "  [{:?}/{:?}] {}",
            instruction.severity, instruction.issue_type, instruction.description
        );
        if let Some(ref loc) = instruction.code_location {
            println!("      Location: {}", loc);
        }
        println!("      Fix: {}", instruction.suggested_fix);
    }

    match result.repair_prompt {
        Some(ref prompt) => {
            println!("\nRepair prompt ({} bytes) ready for the code generator:", prompt.len());
            println!("{}", prompt);
        }
        None => {
            println!("\n⚠️  Iteration bound exhausted — escalate to a human.");
        }
    }
}

fn print_batch_summary(summary: &BatchSummary) {
    println!("Batch validation: {} skill(s)\n", summary.total);

    for result in &summary.per_skill {
        let symbol = match result.status {
            SkillTestStatus::Healthy => "✅",
            SkillTestStatus::Broken => "❌",
            SkillTestStatus::Untested => "❔",
        };
        println!("  {} {}", symbol, result.skill_name);
        for issue in &result.issues {
            println!("      {}", issue);
        }
    }

    println!(
        "\n{} healthy, {} broken, {} untested ({:.0}% healthy)",
        summary.healthy_count,
        summary.broken_count,
        summary.untested_count,
        summary.healthy_percent()
    );
}
