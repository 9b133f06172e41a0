use serde::Serialize;

use talon_core::{ArgFormat, HealthStatus, SkillRecord};

use crate::store::Registry;

/// What a caller with an exact skill name gets back without paying for
/// full discovery: the record, a health boolean, and (when invocation
/// metadata allows) a ready-to-run command string.
#[derive(Debug, Clone, Serialize)]
pub struct LookupResult {
    pub record: SkillRecord,
    /// Derived: anything not known-broken counts as callable.
    pub healthy: bool,
    pub command: Option<String>,
}

/// Exact-name scan over the registry. Linear, and fine: registries hold
/// dozens of skills, not thousands.
pub fn quick_lookup(
    registry: &Registry,
    name: &str,
    interpreter: &str,
    args: &[String],
) -> Option<LookupResult> {
    let record = registry.lookup(name)?.clone();
    let healthy = record.health.status != HealthStatus::Broken;
    let command = build_command(&record, interpreter, args);
    Some(LookupResult { record, healthy, command })
}

/// Build an invocation command from the record's arg format and the
/// caller-supplied arguments. Named-format arguments are given as
/// `key=value` items and rendered as `--key value` pairs.
pub fn build_command(record: &SkillRecord, interpreter: &str, args: &[String]) -> Option<String> {
    if !record.invocation.enabled {
        return None;
    }

    let mut parts = vec![interpreter.to_string(), record.script_path.clone()];
    match record.invocation.arg_format {
        ArgFormat::Positional => {
            parts.extend(args.iter().cloned());
        }
        ArgFormat::Named => {
            for arg in args {
                match arg.split_once('=') {
                    Some((key, value)) => {
                        parts.push(format!("--{key}"));
                        parts.push(value.to_string());
                    }
                    None => parts.push(arg.clone()),
                }
            }
        }
        ArgFormat::Unknown => {
            // No safe way to pass arguments; offer the bare invocation.
            if !args.is_empty() {
                return None;
            }
        }
    }
    Some(parts.join(" "))
}
