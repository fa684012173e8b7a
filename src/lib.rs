//! Root-shell backup and restore of installed Android applications.
//!
//! A privileged `su` session stages APKs and data directories into a
//! process-writable location, from where they are streamed into an abstract
//! [`StorageLocation`]. Each backup commits atomically by writing its
//! properties file last; restores replay the staged artifacts and reapply
//! ownership, permissions and SELinux labels.
//!
//! [`StorageLocation`]: storage::StorageLocation

pub mod backup;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod shell;
pub mod storage;
pub mod task;

#[cfg(test)]
pub(crate) mod testing;

pub use backup::{
    BackupEntry, BackupMode, BackupRestoreOrchestrator, BackupStage, RestoreStage, delete_backup,
    list_backups,
};
pub use config::Config;
pub use error::{ActionError, ParseError, ShellError, StorageError};
pub use models::{ActionResult, BackupProperties, TaskProgress, TaskStatus};
pub use shell::{FileInfo, FileType, RootShell, ShellExecutor};
pub use storage::{DirectoryLocation, StorageLocation};
pub use task::{ActionTask, TaskTarget};
