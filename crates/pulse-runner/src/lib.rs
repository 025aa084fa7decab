//! External script execution with stdout/stderr classification.
//!
//! A run never returns an error: launch failures, timeouts and script errors
//! all become a failed [`ScriptOutcome`] carrying a description.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::{process::Command, time::timeout};

/// Stderr marker emitted by the Oracle client stack that is not a failure.
pub const DEFAULT_BENIGN_STDERR_MARKER: &str = "CryptographyDeprecationWarning";
pub const DEFAULT_SCRIPT_TIMEOUT_MS: u64 = 120_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutcome {
    pub succeeded: bool,
    /// Stdout on success, an error description on failure. Never truncated.
    pub output: String,
}

impl ScriptOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            output: output.into(),
        }
    }

    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            output: output.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRunnerConfig {
    /// Stderr made up only of warnings carrying this marker is not a failure.
    pub benign_stderr_marker: Option<String>,
    /// Zero disables the bound.
    pub timeout_ms: u64,
}

impl Default for ProcessRunnerConfig {
    fn default() -> Self {
        Self {
            benign_stderr_marker: Some(DEFAULT_BENIGN_STDERR_MARKER.to_string()),
            timeout_ms: DEFAULT_SCRIPT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    config: ProcessRunnerConfig,
}

impl ProcessRunner {
    pub fn new(config: ProcessRunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProcessRunnerConfig {
        &self.config
    }

    /// Runs `executable` once with `args` passed as argv (no shell).
    pub async fn run(&self, executable: &Path, args: &[String]) -> ScriptOutcome {
        let started = Instant::now();
        let mut command = Command::new(executable);
        command.args(args);
        command.kill_on_drop(true);
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let output = if self.config.timeout_ms == 0 {
            command.output().await
        } else {
            let bound = Duration::from_millis(self.config.timeout_ms);
            match timeout(bound, command.output()).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        executable = %executable.display(),
                        timeout_ms = self.config.timeout_ms,
                        "script timed out and was killed"
                    );
                    return ScriptOutcome::failure(format!(
                        "{} timed out after {} ms",
                        executable.display(),
                        self.config.timeout_ms
                    ));
                }
            }
        };

        let output = match output {
            Ok(output) => output,
            Err(error) => {
                tracing::warn!(
                    executable = %executable.display(),
                    error = %error,
                    "failed to launch script"
                );
                return ScriptOutcome::failure(format!(
                    "failed to launch {}: {error}",
                    executable.display()
                ));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let outcome = classify_output(
            &stdout,
            &stderr,
            output.status.code(),
            self.config.benign_stderr_marker.as_deref(),
        );
        tracing::debug!(
            executable = %executable.display(),
            exit_code = ?output.status.code(),
            succeeded = outcome.succeeded,
            duration_ms = started.elapsed().as_millis() as u64,
            "script finished"
        );
        outcome
    }
}

/// Classifies captured output.
///
/// Stderr is a failure carrying the stderr text unless every non-blank line
/// belongs to a benign warning: a line containing the marker plus the indented
/// source lines Python prints after it. A non-zero (or signal) exit is a
/// failure even with clean stderr. Everything else succeeds with stdout.
pub fn classify_output(
    stdout: &str,
    stderr: &str,
    exit_code: Option<i32>,
    benign_marker: Option<&str>,
) -> ScriptOutcome {
    let stderr_trimmed = stderr.trim();
    if !stderr_trimmed.is_empty() && !is_benign_stderr(stderr_trimmed, benign_marker) {
        return ScriptOutcome::failure(stderr_trimmed);
    }

    match exit_code {
        Some(0) => ScriptOutcome::success(stdout),
        Some(code) => {
            let stdout_trimmed = stdout.trim();
            if stdout_trimmed.is_empty() {
                ScriptOutcome::failure(format!("script exited with status {code} without output"))
            } else {
                ScriptOutcome::failure(format!(
                    "script exited with status {code}:\n{stdout_trimmed}"
                ))
            }
        }
        None => ScriptOutcome::failure("script was terminated by a signal"),
    }
}

fn is_benign_stderr(stderr: &str, benign_marker: Option<&str>) -> bool {
    let Some(marker) = benign_marker
        .map(str::trim)
        .filter(|marker| !marker.is_empty())
    else {
        return false;
    };

    let mut in_warning = false;
    for line in stderr.lines() {
        if line.contains(marker) {
            in_warning = true;
            continue;
        }
        if in_warning && line.starts_with(char::is_whitespace) {
            continue;
        }
        in_warning = false;
        if !line.trim().is_empty() {
            return false;
        }
    }
    true
}
