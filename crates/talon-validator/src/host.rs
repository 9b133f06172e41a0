use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use talon_core::{Result, TalonError};

/// Captured result of one child-process check.
#[derive(Debug, Clone)]
pub struct HostOutput {
    /// Process exit code; `None` when killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl HostOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Capability boundary for running skill code in isolation.
///
/// Three checks, one per code-touching stage: a static parse check, a
/// module-load check that must not invoke the entry point, and a full
/// isolated run. Implementations must never execute skill code in-process.
#[async_trait]
pub trait SkillHost: Send + Sync {
    /// Static syntax/structure check of the script source.
    async fn parse_check(&self, script: &Path) -> Result<HostOutput>;

    /// Resolve and execute the script's module-level dependencies without
    /// invoking its entry point.
    async fn load_check(&self, script: &Path) -> Result<HostOutput>;

    /// Run the script as an independent child process with the given
    /// arguments. Timeout enforcement is the caller's job.
    async fn run_isolated(&self, script: &Path, args: &[String]) -> Result<HostOutput>;
}

/// Loads a Python module without running its `__main__` block.
const PY_LOAD_SNIPPET: &str = "import runpy, sys\nrunpy.run_path(sys.argv[1], run_name='talon_load')";

/// Child-process skill host. Each stage is a command template with a
/// `{script}` placeholder, so the same host shape serves other runtimes
/// (and the tests, which drive it with `sh`).
pub struct ProcessHost {
    parse_cmd: Vec<String>,
    load_cmd: Vec<String>,
    run_cmd: Vec<String>,
    /// Captured stdout/stderr are truncated to this many bytes.
    max_capture_bytes: usize,
}

impl ProcessHost {
    /// Host for Python skills: `py_compile` for parse, a `runpy` module load
    /// for load, a plain interpreter run for execute.
    pub fn python(interpreter: &str) -> Self {
        Self::new(
            vec![interpreter.into(), "-m".into(), "py_compile".into(), "{script}".into()],
            vec![interpreter.into(), "-c".into(), PY_LOAD_SNIPPET.into(), "{script}".into()],
            vec![interpreter.into(), "{script}".into()],
        )
    }

    pub fn new(parse_cmd: Vec<String>, load_cmd: Vec<String>, run_cmd: Vec<String>) -> Self {
        Self {
            parse_cmd,
            load_cmd,
            run_cmd,
            max_capture_bytes: 64 * 1024,
        }
    }

    pub fn with_max_capture_bytes(mut self, bytes: usize) -> Self {
        self.max_capture_bytes = bytes;
        self
    }

    async fn run_template(&self, stage: &str, template: &[String], script: &Path, args: &[String]) -> Result<HostOutput> {
        let script_str = script.to_string_lossy();
        let mut argv: Vec<String> = template
            .iter()
            .map(|part| part.replace("{script}", &script_str))
            .collect();
        argv.extend(args.iter().cloned());

        if argv.is_empty() {
            return Err(TalonError::Host {
                stage: stage.to_string(),
                reason: "empty command template".into(),
            });
        }

        debug!(stage, command = ?argv, "spawning skill host process");

        let mut cmd = tokio::process::Command::new(&argv[0]);
        cmd.args(&argv[1..]);
        // Pipe stdin to /dev/null so interactive scripts fail fast instead of hanging
        cmd.stdin(std::process::Stdio::null());
        cmd.kill_on_drop(true);

        let output = cmd.output().await.map_err(|e| TalonError::Host {
            stage: stage.to_string(),
            reason: format!("failed to spawn {}: {}", argv[0], e),
        })?;

        Ok(HostOutput {
            exit_code: output.status.code(),
            stdout: truncate_lossy(&output.stdout, self.max_capture_bytes),
            stderr: truncate_lossy(&output.stderr, self.max_capture_bytes),
        })
    }
}

fn truncate_lossy(bytes: &[u8], max: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= max {
        text.into_owned()
    } else {
        let mut cut = max;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}\n[truncated]", &text[..cut])
    }
}

#[async_trait]
impl SkillHost for ProcessHost {
    async fn parse_check(&self, script: &Path) -> Result<HostOutput> {
        self.run_template("parse", &self.parse_cmd, script, &[]).await
    }

    async fn load_check(&self, script: &Path) -> Result<HostOutput> {
        self.run_template("load", &self.load_cmd, script, &[]).await
    }

    async fn run_isolated(&self, script: &Path, args: &[String]) -> Result<HostOutput> {
        self.run_template("execute", &self.run_cmd, script, args).await
    }
}
