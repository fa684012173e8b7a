use derive_more::Display;
use tokio::fs;
use tracing::{debug, error, info, instrument};

use crate::{
    backup::{
        APK_FILE_NAME, BackupMode, BackupRestoreOrchestrator, DataArtifact, ensure_valid_package,
    },
    error::{ActionError, StorageError},
    models::{ActionResult, BackupProperties, ContentsManifest},
    shell::{FileType, dir_exists, list_dir, quote, run_best_effort, unescape_ls_name},
    storage::{self, StorageLocation},
};

/// Stages of a restore run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RestoreStage {
    #[display("initializing")]
    Initializing,
    #[display("enumerating backup contents")]
    EnumeratingBackupContents,
    #[display("restoring APK")]
    RestoringApk,
    #[display("restoring data")]
    RestoringData,
    #[display("fixing ownership and permissions")]
    FixingOwnershipAndPermissions,
    #[display("verifying")]
    Verifying,
    #[display("completed")]
    Completed,
    #[display("failed")]
    Failed,
}

impl RestoreStage {
    fn successor(self) -> RestoreStage {
        match self {
            RestoreStage::Initializing => RestoreStage::EnumeratingBackupContents,
            RestoreStage::EnumeratingBackupContents => RestoreStage::RestoringApk,
            RestoreStage::RestoringApk => RestoreStage::RestoringData,
            RestoreStage::RestoringData => RestoreStage::FixingOwnershipAndPermissions,
            RestoreStage::FixingOwnershipAndPermissions => RestoreStage::Verifying,
            RestoreStage::Verifying => RestoreStage::Completed,
            RestoreStage::Completed | RestoreStage::Failed => self,
        }
    }

    /// Whether the given mode selects this stage at all. Ownership fixing and
    /// verification only make sense for private data directories.
    fn selected(self, mode: BackupMode) -> bool {
        match self {
            RestoreStage::RestoringApk => mode.contains(BackupMode::APK),
            RestoreStage::RestoringData => mode.any_data(),
            RestoreStage::FixingOwnershipAndPermissions | RestoreStage::Verifying => {
                mode.intersects(BackupMode::DATA | BackupMode::DEVICE_PROTECTED_DATA)
            }
            _ => true,
        }
    }

    /// The next stage to run for `mode`, skipping unselected artifact stages.
    pub fn next(self, mode: BackupMode) -> RestoreStage {
        let mut stage = self.successor();
        while !stage.selected(mode) {
            stage = stage.successor();
        }
        stage
    }
}

/// Mutable state threaded through the stages of one restore run.
struct RestoreRun<'r> {
    package: &'r str,
    mode: BackupMode,
    properties: &'r BackupProperties,
    source: &'r dyn StorageLocation,
    revision_location: Option<Box<dyn StorageLocation>>,
    manifest: Option<ContentsManifest>,
    staging: String,
    restored: Vec<DataArtifact>,
    stopped: bool,
}

impl<'a> BackupRestoreOrchestrator<'a> {
    /// Restores the selected artifact classes of one application from
    /// `source` (the per-package backup location holding the properties file
    /// and the revision directory). Always returns a terminal
    /// [`ActionResult`]; stage errors never escape.
    #[instrument(skip(self, properties, source), fields(package = package_name, mode = ?mode))]
    pub async fn restore(
        &self,
        package_name: &str,
        mode: BackupMode,
        properties: &BackupProperties,
        source: &dyn StorageLocation,
    ) -> ActionResult {
        if mode.is_empty() {
            return ActionResult::failure(
                package_name,
                Some(properties.clone()),
                "no artifact classes selected for restore",
            );
        }

        let mut run = RestoreRun {
            package: package_name,
            mode,
            properties,
            source,
            revision_location: None,
            manifest: None,
            staging: self.staging_dir(package_name),
            restored: Vec::new(),
            stopped: false,
        };

        let mut stage = RestoreStage::Initializing;
        while stage != RestoreStage::Completed {
            debug!(%stage, "Entering restore stage");
            if let Err(e) = self.run_restore_stage(stage, &mut run).await {
                let message = format!("restore of {package_name} failed while {stage}: {e}");
                error!(%stage, error = %e, "Restore stage failed");
                self.report_failure(&message).await;
                let _ = fs::remove_dir_all(&run.staging).await;
                return ActionResult::failure(package_name, Some(properties.clone()), message);
            }
            stage = stage.next(mode);
        }

        let _ = fs::remove_dir_all(&run.staging).await;
        let message = format!(
            "restored {package_name} from backup of version {} ({})",
            properties.version_name, properties.revision
        );
        info!(revision = %properties.revision, "Restore completed");
        ActionResult::success(package_name, Some(properties.clone()), message)
    }

    async fn run_restore_stage(
        &self,
        stage: RestoreStage,
        run: &mut RestoreRun<'_>,
    ) -> Result<(), ActionError> {
        match stage {
            RestoreStage::Initializing => self.restore_initializing(run).await,
            RestoreStage::EnumeratingBackupContents => self.enumerate_backup_contents(run).await,
            RestoreStage::RestoringApk => self.restore_apk(run).await,
            RestoreStage::RestoringData => self.restore_data(run).await,
            RestoreStage::FixingOwnershipAndPermissions => {
                self.fix_ownership_and_permissions(run).await
            }
            RestoreStage::Verifying => self.verify_restored_data(run).await,
            RestoreStage::Completed | RestoreStage::Failed => Ok(()),
        }
    }

    async fn restore_initializing(&self, run: &mut RestoreRun<'_>) -> Result<(), ActionError> {
        ensure_valid_package(run.package)?;
        if run.properties.package_name != run.package {
            return Err(ActionError::Precondition(format!(
                "backup properties belong to '{}', not '{}'",
                run.properties.package_name, run.package
            )));
        }
        if !run.properties.includes(run.mode) {
            return Err(ActionError::Precondition(format!(
                "backup of '{}' does not contain all requested artifact classes",
                run.package
            )));
        }
        fs::create_dir_all(&run.staging).await.map_err(|e| {
            ActionError::Precondition(format!(
                "cannot create staging directory {}: {e}",
                run.staging
            ))
        })?;
        Ok(())
    }

    async fn enumerate_backup_contents(&self, run: &mut RestoreRun<'_>) -> Result<(), ActionError> {
        let revision = &run.properties.revision;
        if !run.source.exists(revision).await? {
            return Err(ActionError::Storage(StorageError::NotFound(revision.clone())));
        }
        let revision_location = run.source.child(revision).await?;

        let manifest_json =
            storage::read_to_string(revision_location.as_ref(), ContentsManifest::FILE_NAME)
                .await?;
        let manifest = ContentsManifest::from_json(&manifest_json).map_err(|e| {
            ActionError::Precondition(format!("contents manifest is unreadable: {e}"))
        })?;
        debug!(entries = manifest.entries.len(), revision = %revision, "Enumerated backup contents");

        if run.mode.contains(BackupMode::APK) && !revision_location.exists(APK_FILE_NAME).await? {
            return Err(ActionError::Storage(StorageError::NotFound(APK_FILE_NAME.into())));
        }

        run.revision_location = Some(revision_location);
        run.manifest = Some(manifest);
        Ok(())
    }

    async fn restore_apk(&self, run: &mut RestoreRun<'_>) -> Result<(), ActionError> {
        let staged = format!("{}/{APK_FILE_NAME}", run.staging);
        self.stage_from_backup(run.revision_location_ref()?, APK_FILE_NAME, &staged).await?;

        debug!(staged, "Installing APK");
        let result = self
            .shell
            .run_checked(&format!("pm install -r -t {}", quote(&staged)))
            .await?;
        let reported_success = result
            .stdout
            .iter()
            .chain(result.stderr.iter())
            .any(|line| line.contains("Success"));
        if !reported_success {
            return Err(ActionError::Precondition(format!(
                "pm install did not report success: {}",
                result.error_message()
            )));
        }
        Ok(())
    }

    async fn restore_data(&self, run: &mut RestoreRun<'_>) -> Result<(), ActionError> {
        for artifact in DataArtifact::ALL {
            if !run.mode.contains(artifact.mode_bit()) || !run.properties.includes(artifact.mode_bit())
            {
                continue;
            }
            let staged = format!("{}/{}", run.staging, artifact.archive_name());
            self.stage_from_backup(run.revision_location_ref()?, &artifact.archive_name(), &staged)
                .await?;

            if !run.stopped {
                debug!("Force-stopping app before replacing its data");
                self.shell
                    .run_checked(&format!("am force-stop {}", quote(run.package)))
                    .await?;
                run.stopped = true;
            }

            let device_path = artifact.device_path(run.package);
            if artifact.is_private() {
                if !dir_exists(self.shell, &device_path).await? {
                    return Err(ActionError::Precondition(format!(
                        "data directory {device_path} does not exist, is the app installed?"
                    )));
                }
                // Wipe everything except the system-managed lib symlink.
                self.shell
                    .run_checked(&format!(
                        "find {} -mindepth 1 -maxdepth 1 ! -name lib -exec rm -rf {{}} +",
                        quote(&device_path)
                    ))
                    .await?;
            } else {
                self.shell
                    .run_checked(&format!("mkdir -p {}", quote(&device_path)))
                    .await?;
                self.shell
                    .run_checked(&format!("rm -rf {}/*", quote(&device_path)))
                    .await?;
            }

            debug!(path = %device_path, "Extracting artifact archive");
            self.shell
                .run_checked(&format!(
                    "tar -xzf {} -C {}",
                    quote(&staged),
                    quote(&device_path)
                ))
                .await?;
            run.restored.push(artifact);
        }
        Ok(())
    }

    /// Reapplies ownership, per-entry permissions and SELinux labels to the
    /// private data directories we just overwrote; without this the app
    /// cannot read its own files.
    async fn fix_ownership_and_permissions(
        &self,
        run: &mut RestoreRun<'_>,
    ) -> Result<(), ActionError> {
        let manifest = run.manifest_ref()?;
        for artifact in run.restored.iter().copied().filter(|a| a.is_private()) {
            let device_path = artifact.device_path(run.package);

            let result = self
                .shell
                .run_checked(&format!("stat -c %u:%g {}", quote(&device_path)))
                .await?;
            let owner = result
                .stdout
                .first()
                .map(|line| line.trim())
                .filter(|line| {
                    line.split(':').count() == 2
                        && line.split(':').all(|part| part.chars().all(|c| c.is_ascii_digit()))
                })
                .ok_or_else(|| {
                    ActionError::Precondition(format!(
                        "unexpected stat output for {device_path}: {}",
                        result.error_message()
                    ))
                })?
                .to_string();
            debug!(path = %device_path, owner, "Reapplying ownership");
            self.shell
                .run_checked(&format!("chown -R {owner} {}", quote(&device_path)))
                .await?;

            // Manifest paths carry ls -b escapes; the literal name goes into
            // the command fully quoted, like every other path argument.
            let chmods: Vec<String> = manifest
                .entries_in(artifact.dir_name())
                .filter(|(_, entry)| {
                    matches!(entry.file_type, FileType::Regular | FileType::Directory)
                })
                .map(|(path, entry)| {
                    let target = format!("{device_path}/{}", unescape_ls_name(path));
                    format!("chmod {} {}", entry.mode_octal(), quote(&target))
                })
                .collect();
            if !chmods.is_empty() {
                self.shell.run_checked(&chmods.join(" && ")).await?;
            }

            run_best_effort(
                self.shell,
                &format!("restorecon -R {}", quote(&device_path)),
            )
            .await;
        }
        Ok(())
    }

    /// Re-lists the restored private directories and checks every manifest
    /// entry arrived, with matching sizes for regular files.
    async fn verify_restored_data(&self, run: &mut RestoreRun<'_>) -> Result<(), ActionError> {
        let manifest = run.manifest_ref()?;
        for artifact in run.restored.iter().copied().filter(|a| a.is_private()) {
            let device_path = artifact.device_path(run.package);
            let actual = list_dir(self.shell, &device_path).await?;
            for (name, expected) in manifest.entries_in(artifact.dir_name()) {
                let Some(found) = actual.iter().find(|info| info.file_path == name) else {
                    return Err(ActionError::Precondition(format!(
                        "verification failed: '{name}' is missing from {device_path}"
                    )));
                };
                if expected.file_type == FileType::Regular && found.file_size != expected.size {
                    return Err(ActionError::Precondition(format!(
                        "verification failed: '{name}' has size {} instead of {}",
                        found.file_size, expected.size
                    )));
                }
            }
            debug!(path = %device_path, "Verified restored contents");
        }
        Ok(())
    }

    /// Copies one backup artifact into the staging directory on the device's
    /// filesystem, where the shell can reach it.
    async fn stage_from_backup(
        &self,
        location: &dyn StorageLocation,
        name: &str,
        staged_path: &str,
    ) -> Result<(), ActionError> {
        let mut reader = location.open_read(name).await?;
        let mut file = fs::File::create(staged_path).await.map_err(|e| {
            ActionError::Precondition(format!("cannot create staged file {staged_path}: {e}"))
        })?;
        tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| ActionError::Storage(e.into()))?;
        Ok(())
    }
}

impl RestoreRun<'_> {
    fn revision_location_ref(&self) -> Result<&dyn StorageLocation, ActionError> {
        self.revision_location
            .as_deref()
            .ok_or_else(|| ActionError::Precondition("backup revision not resolved".into()))
    }

    fn manifest_ref(&self) -> Result<&ContentsManifest, ActionError> {
        self.manifest
            .as_ref()
            .ok_or_else(|| ActionError::Precondition("backup contents not enumerated".into()))
    }
}
