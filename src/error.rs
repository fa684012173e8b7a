use std::time::Duration;

use thiserror::Error;

/// Malformed privileged shell output.
///
/// Non-retryable: the device's `ls` output no longer matches the layout this
/// crate was written against, so retrying the same command cannot help.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unparseable listing line ({reason}): {line:?}")]
pub struct ParseError {
    pub line: String,
    pub reason: String,
}

impl ParseError {
    pub fn new(line: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { line: line.into(), reason: reason.into() }
    }
}

/// Failures of the privileged shell channel.
#[derive(Debug, Error)]
pub enum ShellError {
    /// No privileged session could be obtained. Fatal for the whole run.
    #[error("no privileged shell session available: {0}")]
    Unavailable(String),

    /// The command exceeded the configured deadline. Retryable by the caller.
    #[error("shell command timed out after {timeout:?}: {command}")]
    Timeout { command: String, timeout: Duration },

    /// The command ran but exited non-zero.
    #[error("shell command exited with code {exit_code}: {stderr}")]
    CommandFailed { command: String, exit_code: i32, stderr: String },

    #[error("shell i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the backup storage location.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The location cannot be used at all. Surfaced before any shell work.
    #[error("storage location unreachable: {0}")]
    Unreachable(String),

    #[error("not found in storage location: {0}")]
    NotFound(String),

    /// Entry names must be plain names, not paths.
    #[error("invalid entry name: {0:?}")]
    InvalidName(String),

    #[error("storage i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Any error a backup/restore stage can fail with.
///
/// These never escape the orchestrator: each one is folded into the terminal
/// `Failed` state and rendered into the [`ActionResult`] message.
///
/// [`ActionResult`]: crate::models::ActionResult
#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Shell(#[from] ShellError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Precondition(String),
}

impl ActionError {
    /// Whether re-invoking the same run could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ActionError::Shell(ShellError::Timeout { .. }) => true,
            ActionError::Shell(ShellError::CommandFailed { .. }) => true,
            ActionError::Parse(_) => false,
            ActionError::Shell(ShellError::Unavailable(_)) => false,
            ActionError::Shell(ShellError::Io(_)) => false,
            ActionError::Storage(_) => false,
            ActionError::Precondition(_) => false,
        }
    }
}
