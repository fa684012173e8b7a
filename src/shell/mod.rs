mod file_info;

use std::time::Duration;

use async_trait::async_trait;
use tokio::{process::Command, time::timeout};
use tracing::{debug, instrument, trace, warn};

pub use file_info::{FileInfo, FileType, unescape_ls_name};

use crate::{
    config::Config,
    error::{ActionError, ShellError},
};

/// Captured outcome of one privileged shell command.
#[derive(Debug, Clone, Default)]
pub struct ShellResult {
    pub exit_code: i32,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl ShellResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    /// Best diagnostic line: last stderr line, falling back to stdout.
    pub fn error_message(&self) -> String {
        let lines = if self.stderr.is_empty() { &self.stdout } else { &self.stderr };
        lines.last().cloned().unwrap_or_else(|| "unknown error".to_string())
    }
}

/// A privileged shell session.
///
/// One session belongs to exactly one orchestration run; sessions are never
/// shared across concurrent runs, and commands within a run are issued
/// strictly sequentially.
#[async_trait]
pub trait ShellExecutor: Send + Sync {
    /// Runs a command, capturing stdout and stderr. A non-zero exit code is
    /// reported through the returned [`ShellResult`], not as an error.
    async fn run(&self, command: &str) -> Result<ShellResult, ShellError>;

    /// Runs a command and fails with [`ShellError::CommandFailed`] on a
    /// non-zero exit code.
    async fn run_checked(&self, command: &str) -> Result<ShellResult, ShellError> {
        let result = self.run(command).await?;
        if !result.succeeded() {
            return Err(ShellError::CommandFailed {
                command: command.to_string(),
                exit_code: result.exit_code,
                stderr: result.error_message(),
            });
        }
        Ok(result)
    }
}

/// Shell session backed by the device's `su` binary.
#[derive(Debug)]
pub struct RootShell {
    su_binary: String,
    timeout: Duration,
}

impl RootShell {
    /// Opens a fresh privileged session and probes it for root access.
    #[instrument(skip(config), err)]
    pub async fn open(config: &Config) -> Result<Self, ShellError> {
        let shell = Self { su_binary: config.su_binary.clone(), timeout: config.shell_timeout() };
        let probe = shell.run("id").await?;
        if !probe.succeeded() {
            return Err(ShellError::Unavailable(format!(
                "'{} -c id' failed: {}",
                shell.su_binary,
                probe.error_message()
            )));
        }
        if !probe.stdout.iter().any(|line| line.contains("uid=0")) {
            return Err(ShellError::Unavailable(format!(
                "'{} -c id' did not report uid 0: {}",
                shell.su_binary,
                probe.stdout.join(" ")
            )));
        }
        debug!(su_binary = %shell.su_binary, "Privileged shell session opened");
        Ok(shell)
    }
}

#[async_trait]
impl ShellExecutor for RootShell {
    #[instrument(level = "debug", skip(self), err)]
    async fn run(&self, command: &str) -> Result<ShellResult, ShellError> {
        let output = timeout(
            self.timeout,
            Command::new(&self.su_binary).arg("-c").arg(command).output(),
        )
        .await
        .map_err(|_| ShellError::Timeout { command: command.to_string(), timeout: self.timeout })?
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ShellError::Unavailable(format!("su binary '{}' not found", self.su_binary))
            } else {
                ShellError::Io(e)
            }
        })?;

        let result = ShellResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: lines_of(&output.stdout),
            stderr: lines_of(&output.stderr),
        };
        trace!(
            exit_code = result.exit_code,
            stdout_lines = result.stdout.len(),
            stderr_lines = result.stderr.len(),
            "Shell command finished"
        );
        Ok(result)
    }
}

fn lines_of(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes).lines().map(|line| line.to_string()).collect()
}

/// Single-quotes an argument for inclusion in a shell command string.
pub fn quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// Enumerates a directory with `ls -bAll` (escaped names, numeric-friendly
/// long listing) and parses every entry line.
#[instrument(level = "debug", skip(shell), err)]
pub async fn list_dir(
    shell: &dyn ShellExecutor,
    path: &str,
) -> Result<Vec<FileInfo>, ActionError> {
    let result = shell.run_checked(&format!("ls -bAll {}", quote(path))).await?;
    let mut entries = Vec::with_capacity(result.stdout.len());
    for line in &result.stdout {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with("total ") {
            continue;
        }
        entries.push(FileInfo::from_ls_output(line, path)?);
    }
    Ok(entries)
}

/// Checks whether a directory exists on the device.
pub async fn dir_exists(shell: &dyn ShellExecutor, path: &str) -> Result<bool, ShellError> {
    Ok(shell.run(&format!("[ -d {} ]", quote(path))).await?.succeeded())
}

/// Runs a command whose failure should not fail the caller; logs instead.
pub(crate) async fn run_best_effort(shell: &dyn ShellExecutor, command: &str) {
    match shell.run(command).await {
        Ok(result) if !result.succeeded() => {
            warn!(command, stderr = %result.error_message(), "Best-effort command failed");
        }
        Err(e) => warn!(command, error = %e, "Best-effort command errored"),
        Ok(_) => {}
    }
}
