//! Script steps
//!
//! Runs user-supplied Python in a child interpreter:
//! - a fresh scratch directory under `<tmp>/procflow_scripts/<uuid>` holds a
//!   runner plus the user code, and is removed afterwards
//! - the interpreter starts isolated (`-I -S`) with a cleared environment
//! - a read-only context projection arrives as JSON on stdin
//! - the script reports through a `result` variable, printed back after a
//!   marker line
//! - wall-clock time and combined output size are capped
//!
//! Inside the script `entity`, `entity_type`, `entity_id`, `entity_name`,
//! `user_email` and `step_results` are bound. `result` may be a boolean or
//! `{"passed": bool, "message": str, "data": dict}`; it defaults to
//! `{"passed": True}`.

use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, warn};
use serde_json::Value;
use uuid::Uuid;

use super::{config_str, config_u64, StepHandler};
use crate::config::ScriptConfig;
use crate::execution::context::ExecutionContext;
use crate::execution::outcome::{StepError, StepOutcome};
use crate::workflow::StepConfig;

const RESULT_MARKER: &str = "__PROCFLOW_RESULT__";
const RUNNER_FILE: &str = "runner.py";
const USER_CODE_FILE: &str = "user_code.py";
const POLL_INTERVAL: Duration = Duration::from_millis(20);
const STDERR_TAIL_LINES: usize = 5;

const RUNNER: &str = r#"import json
import sys

MARKER = "__PROCFLOW_RESULT__"

context = json.load(sys.stdin)
namespace = {
    "__name__": "__procflow__",
    "entity": context.get("entity") or {},
    "entity_type": context.get("entity_type"),
    "entity_id": context.get("entity_id"),
    "entity_name": context.get("entity_name"),
    "user_email": context.get("user_email"),
    "step_results": context.get("step_results") or {},
    "result": {"passed": True},
}
with open("user_code.py", encoding="utf-8") as source:
    code = compile(source.read(), "user_code.py", "exec")
exec(code, namespace)
sys.stdout.write("\n" + MARKER + json.dumps(namespace.get("result"), default=str) + "\n")
sys.stdout.flush()
"#;

pub struct ScriptHandler<'a> {
    config: &'a StepConfig,
    settings: &'a ScriptConfig,
}

impl<'a> ScriptHandler<'a> {
    pub fn new(config: &'a StepConfig, settings: &'a ScriptConfig) -> Self {
        Self { config, settings }
    }
}

impl StepHandler for ScriptHandler<'_> {
    fn execute(&self, ctx: &mut ExecutionContext) -> Result<StepOutcome, StepError> {
        // Untrimmed: leading indentation is significant in Python.
        let code = self
            .config
            .get("code")
            .and_then(Value::as_str)
            .filter(|code| !code.trim().is_empty())
            .ok_or(StepError::MissingConfig("No code configured"))?;

        let language = config_str(self.config, "language").unwrap_or("python");
        match language.to_ascii_lowercase().as_str() {
            "python" => {}
            "sql" => return Ok(StepOutcome::error("SQL execution is not implemented")),
            other => return Ok(StepOutcome::error(format!("Unsupported language: {}", other))),
        }

        let timeout = Duration::from_secs(config_u64(
            self.config,
            "timeout_seconds",
            self.settings.timeout_seconds,
        )?);

        let sandbox = Sandbox::create()?;
        let output = sandbox.run(self.settings, code, &ctx.script_projection(), timeout)?;
        parse_output(&output)
    }
}

struct ScriptOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

/// Scratch directory for one script run, removed on drop.
struct Sandbox {
    dir: PathBuf,
}

impl Sandbox {
    fn create() -> Result<Self, StepError> {
        let dir = std::env::temp_dir()
            .join("procflow_scripts")
            .join(Uuid::new_v4().to_string());
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    // TODO: run under a namespace/seccomp jail on Linux; today isolation is
    // limited to interpreter flags, a scrubbed environment and resource caps.
    fn run(
        &self,
        settings: &ScriptConfig,
        code: &str,
        context: &Value,
        timeout: Duration,
    ) -> Result<ScriptOutput, StepError> {
        fs::write(self.dir.join(RUNNER_FILE), RUNNER)?;
        fs::write(self.dir.join(USER_CODE_FILE), code)?;

        let mut cmd = Command::new(&settings.python_path);
        cmd.arg("-I")
            .arg("-S")
            .arg(RUNNER_FILE)
            .current_dir(&self.dir)
            .env_clear()
            .env("LANG", "C.UTF-8")
            .env("PYTHONIOENCODING", "utf-8")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(path) = std::env::var_os("PATH") {
            cmd.env("PATH", path);
        }

        debug!(
            "Running script with {} in {}",
            settings.python_path,
            self.dir.display()
        );
        let mut child = cmd.spawn().map_err(|e| {
            StepError::Script(format!("failed to start {}: {}", settings.python_path, e))
        })?;

        let input = serde_json::to_vec(context).map_err(|e| StepError::Script(e.to_string()))?;
        let stdin = child.stdin.take();
        let writer = thread::spawn(move || {
            if let Some(mut stdin) = stdin {
                // The script may exit before consuming its input.
                if let Err(e) = stdin.write_all(&input) {
                    debug!("Script stdin closed early: {}", e);
                }
            }
        });

        let total = Arc::new(AtomicUsize::new(0));
        let limit = settings.max_output_bytes;
        let stdout = spawn_reader(child.stdout.take(), limit, Arc::clone(&total));
        let stderr = spawn_reader(child.stderr.take(), limit, Arc::clone(&total));

        let started = Instant::now();
        let waited = loop {
            if total.load(Ordering::SeqCst) > limit {
                kill(&mut child);
                break Err(StepError::Script(format!("output exceeded {} bytes", limit)));
            }
            match child.try_wait() {
                Ok(Some(status)) => break Ok(status),
                Ok(None) => {}
                Err(e) => {
                    kill(&mut child);
                    break Err(StepError::Io(e));
                }
            }
            if started.elapsed() >= timeout {
                kill(&mut child);
                break Err(StepError::Script(format!(
                    "timed out after {}s",
                    timeout.as_secs()
                )));
            }
            thread::sleep(POLL_INTERVAL);
        };

        if writer.join().is_err() {
            warn!("Script input writer panicked");
        }
        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        let status = waited?;
        if total.load(Ordering::SeqCst) > limit {
            return Err(StepError::Script(format!("output exceeded {} bytes", limit)));
        }

        Ok(ScriptOutput {
            status,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            warn!(
                "Failed to clean up script directory {}: {}",
                self.dir.display(),
                e
            );
        }
    }
}

/// Drains a pipe, keeping at most `limit` bytes. `total` counts bytes read
/// across all pipes of the child.
fn spawn_reader<R>(source: Option<R>, limit: usize, total: Arc<AtomicUsize>) -> JoinHandle<Vec<u8>>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut captured = Vec::new();
        let Some(mut source) = source else {
            return captured;
        };
        let mut buf = [0u8; 8192];
        loop {
            match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let seen = total.fetch_add(n, Ordering::SeqCst) + n;
                    if seen <= limit {
                        captured.extend_from_slice(&buf[..n]);
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        captured
    })
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!("Script process already gone: {}", e);
    }
    if let Err(e) = child.wait() {
        warn!("Failed to reap script process: {}", e);
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

fn parse_output(output: &ScriptOutput) -> Result<StepOutcome, StepError> {
    if !output.status.success() {
        let tail = stderr_tail(&output.stderr);
        return Err(StepError::Script(if tail.is_empty() {
            output.status.to_string()
        } else {
            format!("{} ({})", tail, output.status)
        }));
    }

    let (user_output, payload) = match output.stdout.rfind(RESULT_MARKER) {
        Some(at) => (
            &output.stdout[..at],
            output.stdout[at + RESULT_MARKER.len()..].trim(),
        ),
        None => return Err(StepError::Script("script produced no result".to_string())),
    };
    if !user_output.trim().is_empty() {
        debug!("Script output:\n{}", user_output.trim_end());
    }

    let value: Value = serde_json::from_str(payload)
        .map_err(|e| StepError::Script(format!("invalid result: {}", e)))?;
    outcome_from_result(value)
}

fn verdict_message(passed: bool) -> &'static str {
    if passed {
        "Script passed"
    } else {
        "Script failed"
    }
}

/// Interprets the script's `result` value.
fn outcome_from_result(value: Value) -> Result<StepOutcome, StepError> {
    let invalid = || {
        StepError::Script(
            "result must be a boolean or an object with a boolean 'passed'".to_string(),
        )
    };

    match value {
        Value::Bool(passed) => Ok(StepOutcome::from_verdict(passed, verdict_message(passed))),
        Value::Object(mut map) => {
            let passed = match map.remove("passed") {
                None | Some(Value::Null) => true,
                Some(Value::Bool(b)) => b,
                Some(_) => return Err(invalid()),
            };
            let message = match map.remove("message") {
                Some(Value::String(s)) => s,
                _ => verdict_message(passed).to_string(),
            };
            let outcome = StepOutcome::from_verdict(passed, message);
            Ok(match map.remove("data") {
                Some(Value::Object(data)) => outcome.with_data(data),
                _ => outcome,
            })
        }
        _ => Err(invalid()),
    }
}
