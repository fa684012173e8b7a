//! One-shot backup/restore actions with progress reporting to a weakly held
//! UI target.

use std::sync::{
    Arc, Weak,
    atomic::{AtomicU64, Ordering},
};

use tracing::{debug, info, instrument, warn};

use crate::{
    backup::{BackupMode, BackupRestoreOrchestrator},
    config::Config,
    logging::ReportLog,
    models::{ActionResult, BackupProperties, TaskProgress, TaskStatus},
    shell::ShellExecutor,
    storage::StorageLocation,
};

/// Monotonic source of notification ids; never reused within a process.
static NEXT_NOTIFICATION_ID: AtomicU64 = AtomicU64::new(1);

/// Receiver of task progress and the terminal result, typically a UI screen.
///
/// Tasks hold their target weakly so a dismissed screen is dropped instead of
/// being kept alive by a long-running action.
pub trait TaskTarget: Send + Sync {
    /// Whether the target still wants this task's work at all.
    fn is_live(&self) -> bool;

    fn progress(&self, progress: &TaskProgress);

    /// Terminal delivery; called at most once per task.
    fn deliver(&self, result: &ActionResult);
}

enum ActionKind {
    Backup,
    Restore { properties: BackupProperties },
}

/// A single backup or restore action bound to one package, one shell session
/// and one storage location.
pub struct ActionTask {
    kind: ActionKind,
    package_name: String,
    mode: BackupMode,
    shell: Arc<dyn ShellExecutor>,
    config: Config,
    location: Arc<dyn StorageLocation>,
    report: Option<Arc<ReportLog>>,
    target: Weak<dyn TaskTarget>,
    notification_id: u64,
}

impl ActionTask {
    /// A backup action; `destination` is the backup location root.
    pub fn backup(
        package_name: impl Into<String>,
        mode: BackupMode,
        shell: Arc<dyn ShellExecutor>,
        config: Config,
        destination: Arc<dyn StorageLocation>,
        target: Weak<dyn TaskTarget>,
    ) -> Self {
        Self {
            kind: ActionKind::Backup,
            package_name: package_name.into(),
            mode,
            shell,
            config,
            location: destination,
            report: None,
            target,
            notification_id: NEXT_NOTIFICATION_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// A restore action; `source` is the per-package backup location the
    /// given properties were read from.
    pub fn restore(
        package_name: impl Into<String>,
        mode: BackupMode,
        properties: BackupProperties,
        shell: Arc<dyn ShellExecutor>,
        config: Config,
        source: Arc<dyn StorageLocation>,
        target: Weak<dyn TaskTarget>,
    ) -> Self {
        Self {
            kind: ActionKind::Restore { properties },
            package_name: package_name.into(),
            mode,
            shell,
            config,
            location: source,
            report: None,
            target,
            notification_id: NEXT_NOTIFICATION_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn with_report(mut self, report: Arc<ReportLog>) -> Self {
        self.report = Some(report);
        self
    }

    pub fn notification_id(&self) -> u64 {
        self.notification_id
    }

    fn emit_progress(&self, status: TaskStatus, message: impl Into<String>) {
        if let Some(target) = self.target.upgrade() {
            target.progress(&TaskProgress {
                notification_id: self.notification_id,
                package_name: self.package_name.clone(),
                status,
                message: message.into(),
            });
        }
    }

    /// Runs the action to completion and returns the single terminal result,
    /// delivering it to the target if that is still alive.
    ///
    /// If the target is already gone when the task starts, no privileged work
    /// is done at all and a failed result is returned.
    #[instrument(skip(self), fields(package = %self.package_name, id = self.notification_id))]
    pub async fn run(self) -> ActionResult {
        let live_at_start = self.target.upgrade().is_some_and(|target| target.is_live());
        if !live_at_start {
            warn!("Action target is gone, skipping the run");
            return ActionResult::failure(
                &self.package_name,
                None,
                "action target is gone, nothing was done",
            );
        }

        let verb = match self.kind {
            ActionKind::Backup => "Backing up",
            ActionKind::Restore { .. } => "Restoring",
        };
        self.emit_progress(TaskStatus::Started, format!("{verb} {}", self.package_name));
        debug!(mode = ?self.mode, "Action task started");

        let mut orchestrator = BackupRestoreOrchestrator::new(self.shell.as_ref(), &self.config);
        if let Some(report) = self.report.as_deref() {
            orchestrator = orchestrator.with_report(report);
        }

        self.emit_progress(TaskStatus::Running, format!("{verb} {}", self.package_name));
        let result = match &self.kind {
            ActionKind::Backup => {
                orchestrator.backup(&self.package_name, self.mode, self.location.as_ref()).await
            }
            ActionKind::Restore { properties } => {
                orchestrator
                    .restore(&self.package_name, self.mode, properties, self.location.as_ref())
                    .await
            }
        };

        let status = if result.succeeded { TaskStatus::Completed } else { TaskStatus::Failed };
        self.emit_progress(status, result.message.clone());
        if let Some(target) = self.target.upgrade() {
            target.deliver(&result);
        } else {
            info!("Action target went away mid-run, result not delivered");
        }
        result
    }
}
