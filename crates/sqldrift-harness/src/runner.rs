//! Subprocess execution of one approach.

use crate::approach::ApproachConfig;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;

/// Captured result of an approach subprocess.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Approach name.
    pub approach: String,

    /// Exit code (0 = success, -1 when killed by a signal).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    /// Whether execution succeeded.
    pub success: bool,
}

impl RunOutput {
    /// Whether this run passed (exit code 0).
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }
}

/// Runs approach commands to completion, one at a time.
pub struct ApproachRunner;

impl ApproachRunner {
    /// Spawn the approach command and wait for it, capturing both streams.
    pub async fn execute(config: &ApproachConfig) -> anyhow::Result<RunOutput> {
        let start = Instant::now();

        if config.command.is_empty() {
            anyhow::bail!("Approach {} has empty command", config.name);
        }

        let exe = &config.command[0];
        let args = &config.command[1..];

        let output = Command::new(exe)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?
            .wait_with_output()
            .await?;

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        Ok(RunOutput {
            approach: config.name.clone(),
            exit_code,
            stdout,
            stderr,
            duration_ms,
            success: output.status.success(),
        })
    }
}
