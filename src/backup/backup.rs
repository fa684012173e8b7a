use derive_more::Display;
use time::OffsetDateTime;
use tokio::fs;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    backup::{
        APK_FILE_NAME, BackupMode, BackupRestoreOrchestrator, DATA_EXCLUDED_DIRS, DataArtifact,
        REVISION_PREFIX, ensure_valid_package,
    },
    error::ActionError,
    models::{ActionResult, BackupProperties, ContentsEntry, ContentsManifest},
    shell::{dir_exists, list_dir, quote},
    storage::{self, StorageLocation, WriteMode},
};

/// Stages of a backup run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BackupStage {
    #[display("initializing")]
    Initializing,
    #[display("capturing APK")]
    CapturingApk,
    #[display("capturing data")]
    CapturingData,
    #[display("writing properties")]
    WritingProperties,
    #[display("completed")]
    Completed,
    #[display("failed")]
    Failed,
}

impl BackupStage {
    fn successor(self) -> BackupStage {
        match self {
            BackupStage::Initializing => BackupStage::CapturingApk,
            BackupStage::CapturingApk => BackupStage::CapturingData,
            BackupStage::CapturingData => BackupStage::WritingProperties,
            BackupStage::WritingProperties => BackupStage::Completed,
            BackupStage::Completed | BackupStage::Failed => self,
        }
    }

    /// Whether the given mode selects this stage at all.
    fn selected(self, mode: BackupMode) -> bool {
        match self {
            BackupStage::CapturingApk => mode.contains(BackupMode::APK),
            BackupStage::CapturingData => mode.any_data(),
            _ => true,
        }
    }

    /// The next stage to run for `mode`, skipping unselected artifact stages.
    pub fn next(self, mode: BackupMode) -> BackupStage {
        let mut stage = self.successor();
        while !stage.selected(mode) {
            stage = stage.successor();
        }
        stage
    }
}

/// Mutable state threaded through the stages of one backup run.
struct BackupRun<'r> {
    package: &'r str,
    mode: BackupMode,
    destination: &'r dyn StorageLocation,
    app_location: Option<Box<dyn StorageLocation>>,
    revision_location: Option<Box<dyn StorageLocation>>,
    revision: String,
    staging: String,
    version: Option<(String, i64)>,
    manifest: ContentsManifest,
    captured: BackupMode,
    bytes_copied: u64,
    properties: Option<BackupProperties>,
}

impl<'a> BackupRestoreOrchestrator<'a> {
    /// Backs up the selected artifact classes of one application into
    /// `destination` (the backup location root; a per-package child is
    /// resolved inside). Always returns a terminal [`ActionResult`]; stage
    /// errors never escape.
    #[instrument(skip(self, destination), fields(package = package_name, mode = ?mode))]
    pub async fn backup(
        &self,
        package_name: &str,
        mode: BackupMode,
        destination: &dyn StorageLocation,
    ) -> ActionResult {
        if mode.is_empty() {
            return ActionResult::failure(
                package_name,
                None,
                "no artifact classes selected for backup",
            );
        }

        let mut run = BackupRun {
            package: package_name,
            mode,
            destination,
            app_location: None,
            revision_location: None,
            revision: format!("{REVISION_PREFIX}{}", Uuid::new_v4()),
            staging: self.staging_dir(package_name),
            version: None,
            manifest: ContentsManifest::default(),
            captured: BackupMode::NONE,
            bytes_copied: 0,
            properties: None,
        };

        let mut stage = BackupStage::Initializing;
        while stage != BackupStage::Completed {
            debug!(%stage, "Entering backup stage");
            if let Err(e) = self.run_backup_stage(stage, &mut run).await {
                let message = format!("backup of {package_name} failed while {stage}: {e}");
                error!(%stage, error = %e, "Backup stage failed");
                self.report_failure(&message).await;
                self.cleanup_failed_backup(&run).await;
                return ActionResult::failure(package_name, run.properties.take(), message);
            }
            stage = stage.next(mode);
        }

        let message = format!(
            "backed up {package_name} ({})",
            humansize::format_size(run.bytes_copied, humansize::DECIMAL)
        );
        info!(bytes = run.bytes_copied, revision = %run.revision, "Backup completed");
        ActionResult::success(package_name, run.properties.take(), message)
    }

    async fn run_backup_stage(
        &self,
        stage: BackupStage,
        run: &mut BackupRun<'_>,
    ) -> Result<(), ActionError> {
        match stage {
            BackupStage::Initializing => self.backup_initializing(run).await,
            BackupStage::CapturingApk => self.capture_apk(run).await,
            BackupStage::CapturingData => self.capture_data(run).await,
            BackupStage::WritingProperties => self.write_properties(run).await,
            BackupStage::Completed | BackupStage::Failed => Ok(()),
        }
    }

    async fn backup_initializing(&self, run: &mut BackupRun<'_>) -> Result<(), ActionError> {
        ensure_valid_package(run.package)?;

        // Probe the destination before issuing any shell work.
        run.destination.list().await?;

        run.version = Some(self.query_package_version(run.package).await?);

        fs::create_dir_all(&run.staging).await.map_err(|e| {
            ActionError::Precondition(format!(
                "cannot create staging directory {}: {e}",
                run.staging
            ))
        })?;

        let app_location = run.destination.child(run.package).await?;
        run.revision_location = Some(app_location.child(&run.revision).await?);
        run.app_location = Some(app_location);

        if run.mode.any_data() && self.config.stop_before_action {
            debug!("Force-stopping app before touching its data");
            self.shell
                .run_checked(&format!("am force-stop {}", quote(run.package)))
                .await?;
        }
        Ok(())
    }

    async fn capture_apk(&self, run: &mut BackupRun<'_>) -> Result<(), ActionError> {
        let result = self
            .shell
            .run_checked(&format!("pm path {}", quote(run.package)))
            .await?;
        let apk_path = result
            .stdout
            .iter()
            .find_map(|line| line.strip_prefix("package:").map(str::trim))
            .filter(|path| !path.is_empty())
            .ok_or_else(|| {
                ActionError::Precondition(format!(
                    "could not determine APK path for '{}'",
                    run.package
                ))
            })?;

        let staged = format!("{}/{APK_FILE_NAME}", run.staging);
        debug!(apk_path, staged, "Staging APK");
        self.shell
            .run_checked(&format!(
                "cp {} {} && chmod 644 {}",
                quote(apk_path),
                quote(&staged),
                quote(&staged)
            ))
            .await?;

        run.bytes_copied += self
            .store_staged_file(run.revision_location_ref()?, &staged, APK_FILE_NAME)
            .await?;
        run.captured |= BackupMode::APK;
        Ok(())
    }

    async fn capture_data(&self, run: &mut BackupRun<'_>) -> Result<(), ActionError> {
        for artifact in DataArtifact::ALL {
            if !run.mode.contains(artifact.mode_bit()) {
                continue;
            }
            let device_path = artifact.device_path(run.package);
            if !dir_exists(self.shell, &device_path).await? {
                debug!(path = %device_path, "Artifact directory does not exist, skipping");
                continue;
            }

            let mut entries = list_dir(self.shell, &device_path).await?;
            if artifact.is_private() {
                entries.retain(|info| !DATA_EXCLUDED_DIRS.contains(&info.file_path.as_str()));
            }
            if entries.is_empty() {
                debug!(path = %device_path, "Nothing to capture after exclusions, skipping");
                continue;
            }

            let staged = format!("{}/{}", run.staging, artifact.archive_name());
            let excludes = if artifact.is_private() {
                DATA_EXCLUDED_DIRS
                    .iter()
                    .map(|dir| format!("--exclude=./{dir}"))
                    .collect::<Vec<_>>()
                    .join(" ")
                    + " "
            } else {
                String::new()
            };
            debug!(path = %device_path, staged, "Archiving artifact directory");
            self.shell
                .run_checked(&format!(
                    "tar -czf {} -C {} {excludes}. && chmod 644 {}",
                    quote(&staged),
                    quote(&device_path),
                    quote(&staged)
                ))
                .await?;

            run.bytes_copied += self
                .store_staged_file(run.revision_location_ref()?, &staged, &artifact.archive_name())
                .await?;
            run.manifest.entries.extend(
                entries
                    .iter()
                    .map(|info| ContentsEntry::from_file_info(artifact.dir_name(), info)),
            );
            run.captured |= artifact.mode_bit();
        }
        Ok(())
    }

    async fn write_properties(&self, run: &mut BackupRun<'_>) -> Result<(), ActionError> {
        let revision_location = run.revision_location_ref()?;
        let manifest_json = run.manifest.to_json().map_err(|e| {
            ActionError::Precondition(format!("cannot serialize contents manifest: {e}"))
        })?;
        storage::write_all(
            revision_location,
            ContentsManifest::FILE_NAME,
            ContentsManifest::MIME_TYPE,
            manifest_json.as_bytes(),
        )
        .await?;

        let (version_name, version_code) = run.version.clone().unwrap_or_default();
        let properties = BackupProperties {
            package_name: run.package.to_string(),
            version_name,
            version_code,
            backup_time: OffsetDateTime::now_utc(),
            revision: run.revision.clone(),
            has_apk: run.captured.contains(BackupMode::APK),
            has_app_data: run.captured.contains(BackupMode::DATA),
            has_external_data: run.captured.contains(BackupMode::EXTERNAL_DATA),
            has_obb_data: run.captured.contains(BackupMode::OBB),
            has_device_protected_data: run.captured.contains(BackupMode::DEVICE_PROTECTED_DATA),
        };
        let properties_json = properties.to_json().map_err(|e| {
            ActionError::Precondition(format!("cannot serialize backup properties: {e}"))
        })?;

        // Commit point: once the properties name the new revision, the backup
        // is the new one. Anything before this leaves the prior backup intact.
        storage::write_all(
            run.app_location_ref()?,
            BackupProperties::FILE_NAME,
            BackupProperties::MIME_TYPE,
            properties_json.as_bytes(),
        )
        .await?;
        run.properties = Some(properties);

        self.prune_stale_revisions(run.app_location_ref()?, &run.revision).await;
        if let Err(e) = fs::remove_dir_all(&run.staging).await {
            warn!(staging = %run.staging, error = %e, "Failed to remove staging directory");
        }
        Ok(())
    }

    /// Copies a staged device file into the given storage location, returning
    /// the number of bytes copied.
    async fn store_staged_file(
        &self,
        location: &dyn StorageLocation,
        staged_path: &str,
        name: &str,
    ) -> Result<u64, ActionError> {
        let mut source = fs::File::open(staged_path).await.map_err(|e| {
            ActionError::Precondition(format!("cannot read staged file {staged_path}: {e}"))
        })?;
        location.create_file(name, "application/octet-stream").await?;
        let mut writer = location.open_write(name, WriteMode::Truncate).await?;
        let bytes = tokio::io::copy(&mut source, &mut writer)
            .await
            .map_err(|e| ActionError::Storage(e.into()))?;
        Ok(bytes)
    }

    /// Removes revision directories superseded by the committed one.
    /// Best-effort: the stale data is unreferenced either way.
    async fn prune_stale_revisions(&self, app_location: &dyn StorageLocation, keep: &str) {
        let names = match app_location.list().await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Failed to list backup location for pruning");
                return;
            }
        };
        for name in names {
            if name.starts_with(REVISION_PREFIX) && name != keep {
                debug!(revision = %name, "Pruning stale revision");
                if let Err(e) = app_location.delete(&name).await {
                    warn!(revision = %name, error = %e, "Failed to prune stale revision");
                }
            }
        }
    }

    /// Rolls back a failed run: the partially written revision and the
    /// staging directory go away; the previously committed backup stays.
    async fn cleanup_failed_backup(&self, run: &BackupRun<'_>) {
        if let Some(app_location) = run.app_location.as_deref()
            && run.properties.is_none()
            && let Err(e) = app_location.delete(&run.revision).await
        {
            debug!(revision = %run.revision, error = %e, "No partial revision to clean up");
        }
        let _ = fs::remove_dir_all(&run.staging).await;
    }
}

impl BackupRun<'_> {
    fn app_location_ref(&self) -> Result<&dyn StorageLocation, ActionError> {
        self.app_location
            .as_deref()
            .ok_or_else(|| ActionError::Precondition("backup location not resolved".into()))
    }

    fn revision_location_ref(&self) -> Result<&dyn StorageLocation, ActionError> {
        self.revision_location
            .as_deref()
            .ok_or_else(|| ActionError::Precondition("revision location not resolved".into()))
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::{
        config::Config,
        storage::DirectoryLocation,
        testing::{Outcome, ScriptedShell, dumpsys_output, ls_line},
    };

    const PKG: &str = "org.example.notes";

    fn test_config(dir: &std::path::Path) -> Config {
        Config {
            staging_location: dir.join("staging").to_string_lossy().into_owned(),
            stop_before_action: true,
            ..Config::default()
        }
    }

    fn scripted_backup_shell(staging: std::path::PathBuf, apk_bytes: &'static [u8]) -> ScriptedShell {
        let tar_staging = staging.clone();
        ScriptedShell::new()
            .on("dumpsys package", Outcome::Lines(dumpsys_output("7.2.1", 7021)))
            .on(
                "pm path",
                Outcome::Lines(vec!["package:/data/app/org.example.notes-1/base.apk".into()]),
            )
            .on_do("cp ", Outcome::Lines(vec![]), move |_| {
                std::fs::write(staging.join("base.apk"), apk_bytes).unwrap();
            })
            .on(
                "ls -bAll '/data/data/org.example.notes'",
                Outcome::Lines(vec![
                    "total 16".into(),
                    ls_line("-rw-------", "prefs.xml", 512),
                    ls_line("drwx------", "databases", 4096),
                    ls_line("drwx------", "cache", 4096),
                ]),
            )
            .on_do("tar -czf", Outcome::Lines(vec![]), move |_| {
                std::fs::write(tar_staging.join("data.tar.gz"), b"tar-bytes").unwrap();
            })
    }

    #[test]
    fn stage_order_honors_mode_mask() {
        let full = BackupMode::APK | BackupMode::DATA;
        let mut stage = BackupStage::Initializing;
        let mut order = vec![stage];
        while stage != BackupStage::Completed {
            stage = stage.next(full);
            order.push(stage);
        }
        assert_eq!(
            order,
            vec![
                BackupStage::Initializing,
                BackupStage::CapturingApk,
                BackupStage::CapturingData,
                BackupStage::WritingProperties,
                BackupStage::Completed,
            ]
        );

        assert_eq!(
            BackupStage::Initializing.next(BackupMode::APK),
            BackupStage::CapturingApk
        );
        assert_eq!(
            BackupStage::CapturingApk.next(BackupMode::APK),
            BackupStage::WritingProperties
        );
        assert_eq!(
            BackupStage::Initializing.next(BackupMode::DATA),
            BackupStage::CapturingData
        );
        assert_eq!(BackupStage::Failed.next(BackupMode::ALL), BackupStage::Failed);
    }

    #[test(tokio::test)]
    async fn backup_writes_properties_manifest_and_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let staging = std::path::PathBuf::from(format!("{}/{PKG}", config.staging_location));
        let shell = scripted_backup_shell(staging.clone(), b"apk-bytes-v1");
        let destination = DirectoryLocation::open(dir.path().join("backups")).await.unwrap();

        let result = BackupRestoreOrchestrator::new(&shell, &config)
            .backup(PKG, BackupMode::APK | BackupMode::DATA, &destination)
            .await;
        assert!(result.succeeded, "backup failed: {}", result.message);

        let properties = result.properties.expect("properties on success");
        assert_eq!(properties.package_name, PKG);
        assert_eq!(properties.version_name, "7.2.1");
        assert_eq!(properties.version_code, 7021);
        assert!(properties.has_apk);
        assert!(properties.has_app_data);
        assert!(!properties.has_obb_data);

        let app_location = destination.child(PKG).await.unwrap();
        let stored = BackupProperties::from_json(
            &storage::read_to_string(app_location.as_ref(), BackupProperties::FILE_NAME)
                .await
                .unwrap(),
        )
        .unwrap();
        assert_eq!(stored, properties);

        let revision = app_location.child(&properties.revision).await.unwrap();
        assert!(revision.exists(APK_FILE_NAME).await.unwrap());
        assert!(revision.exists("data.tar.gz").await.unwrap());

        let manifest = ContentsManifest::from_json(
            &storage::read_to_string(revision.as_ref(), ContentsManifest::FILE_NAME)
                .await
                .unwrap(),
        )
        .unwrap();
        // The excluded cache directory must not appear in the manifest.
        assert_eq!(manifest.entries.len(), 2);
        assert!(manifest.entries.iter().all(|e| !e.path.contains("cache")));
        assert_eq!(manifest.entries[0].path, "data/prefs.xml");

        // Staging is cleaned up after the commit.
        assert!(!staging.exists());
    }

    #[test(tokio::test)]
    async fn apk_only_backup_issues_no_data_commands() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let staging = std::path::PathBuf::from(format!("{}/{PKG}", config.staging_location));
        let shell = scripted_backup_shell(staging, b"apk-bytes");
        let destination = DirectoryLocation::open(dir.path().join("backups")).await.unwrap();

        let result = BackupRestoreOrchestrator::new(&shell, &config)
            .backup(PKG, BackupMode::APK, &destination)
            .await;
        assert!(result.succeeded, "backup failed: {}", result.message);

        assert_eq!(shell.count_containing("tar "), 0);
        assert_eq!(shell.count_containing("ls -bAll"), 0);
        assert_eq!(shell.count_containing("am force-stop"), 0);
        let properties = result.properties.unwrap();
        assert!(properties.has_apk);
        assert!(!properties.has_app_data);
    }

    #[test(tokio::test)]
    async fn absent_requested_data_directory_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let staging = std::path::PathBuf::from(format!("{}/{PKG}", config.staging_location));
        let shell = scripted_backup_shell(staging, b"apk")
            // No OBB directory on the device.
            .on(
                "[ -d '/sdcard/Android/obb/org.example.notes' ]",
                Outcome::Failure { exit_code: 1, stderr: vec![] },
            );
        let destination = DirectoryLocation::open(dir.path().join("backups")).await.unwrap();

        let result = BackupRestoreOrchestrator::new(&shell, &config)
            .backup(PKG, BackupMode::APK | BackupMode::DATA | BackupMode::OBB, &destination)
            .await;
        assert!(result.succeeded, "backup failed: {}", result.message);
        let properties = result.properties.unwrap();
        assert!(properties.has_app_data);
        assert!(!properties.has_obb_data);
    }

    #[test(tokio::test)]
    async fn failing_stage_reports_stage_name_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let shell = ScriptedShell::new()
            .on("dumpsys package", Outcome::Lines(dumpsys_output("1.0", 1)))
            .on(
                "pm path",
                Outcome::Failure { exit_code: 1, stderr: vec!["no such package".into()] },
            );
        let destination = DirectoryLocation::open(dir.path().join("backups")).await.unwrap();

        let result = BackupRestoreOrchestrator::new(&shell, &config)
            .backup(PKG, BackupMode::APK | BackupMode::DATA, &destination)
            .await;
        assert!(!result.succeeded);
        assert!(!result.message.is_empty());
        assert!(result.message.contains("capturing APK"), "message: {}", result.message);
        // The run halted: no data capture was attempted after the failure.
        assert_eq!(shell.count_containing("tar "), 0);
    }

    #[test(tokio::test)]
    async fn shell_level_errors_fold_into_a_failed_stage() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let destination = DirectoryLocation::open(dir.path().join("backups")).await.unwrap();

        // Lost session: fails in the first stage that needs the shell.
        let shell = ScriptedShell::new().on("dumpsys package", Outcome::Unavailable);
        let result = BackupRestoreOrchestrator::new(&shell, &config)
            .backup(PKG, BackupMode::APK | BackupMode::DATA, &destination)
            .await;
        assert!(!result.succeeded);
        assert!(result.message.contains("initializing"), "message: {}", result.message);
        assert!(result.message.contains("privileged shell"), "message: {}", result.message);

        // Timed-out archive command: fails while capturing, nothing committed.
        let staging = std::path::PathBuf::from(format!("{}/{PKG}", config.staging_location));
        let shell = scripted_backup_shell(staging, b"apk").on("tar -czf", Outcome::Timeout);
        let result = BackupRestoreOrchestrator::new(&shell, &config)
            .backup(PKG, BackupMode::APK | BackupMode::DATA, &destination)
            .await;
        assert!(!result.succeeded);
        assert!(result.message.contains("capturing data"), "message: {}", result.message);
        assert!(result.message.contains("timed out"), "message: {}", result.message);
        let app_location = destination.child(PKG).await.unwrap();
        assert!(!app_location.exists(BackupProperties::FILE_NAME).await.unwrap());
    }

    #[test(tokio::test)]
    async fn rebackup_replaces_previous_revision_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let staging = std::path::PathBuf::from(format!("{}/{PKG}", config.staging_location));
        let destination = DirectoryLocation::open(dir.path().join("backups")).await.unwrap();
        let orchestrator_config = config.clone();

        let first = BackupRestoreOrchestrator::new(
            &scripted_backup_shell(staging.clone(), b"apk-v1"),
            &orchestrator_config,
        )
        .backup(PKG, BackupMode::APK | BackupMode::DATA, &destination)
        .await;
        assert!(first.succeeded);
        let first_properties = first.properties.unwrap();

        let second = BackupRestoreOrchestrator::new(
            &scripted_backup_shell(staging.clone(), b"apk-v2-longer"),
            &orchestrator_config,
        )
        .backup(PKG, BackupMode::APK | BackupMode::DATA, &destination)
        .await;
        assert!(second.succeeded);
        let second_properties = second.properties.unwrap();
        assert_ne!(first_properties.revision, second_properties.revision);

        let app_location = destination.child(PKG).await.unwrap();
        let stored = BackupProperties::from_json(
            &storage::read_to_string(app_location.as_ref(), BackupProperties::FILE_NAME)
                .await
                .unwrap(),
        )
        .unwrap();
        assert_eq!(stored, second_properties);

        // The first revision was pruned; exactly one revision remains.
        let revisions: Vec<String> = app_location
            .list()
            .await
            .unwrap()
            .into_iter()
            .filter(|name| name.starts_with(REVISION_PREFIX))
            .collect();
        assert_eq!(revisions, vec![second_properties.revision.clone()]);
    }

    #[test(tokio::test)]
    async fn crash_during_second_backup_leaves_first_backup_readable() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let staging = std::path::PathBuf::from(format!("{}/{PKG}", config.staging_location));
        let destination = DirectoryLocation::open(dir.path().join("backups")).await.unwrap();

        let first = BackupRestoreOrchestrator::new(
            &scripted_backup_shell(staging.clone(), b"apk-v1"),
            &config,
        )
        .backup(PKG, BackupMode::APK | BackupMode::DATA, &destination)
        .await;
        assert!(first.succeeded);
        let first_properties = first.properties.unwrap();

        // Second run dies while archiving data, after the APK was staged.
        let crashing_shell = ScriptedShell::new()
            .on("dumpsys package", Outcome::Lines(dumpsys_output("7.3.0", 7030)))
            .on(
                "pm path",
                Outcome::Lines(vec!["package:/data/app/org.example.notes-2/base.apk".into()]),
            )
            .on_do("cp ", Outcome::Lines(vec![]), {
                let staging = staging.clone();
                move |_| {
                    std::fs::write(staging.join("base.apk"), b"apk-v2").unwrap();
                }
            })
            .on(
                "ls -bAll '/data/data/org.example.notes'",
                Outcome::Lines(vec![ls_line("-rw-------", "prefs.xml", 512)]),
            )
            .on(
                "tar -czf",
                Outcome::Failure { exit_code: 1, stderr: vec!["tar: write error".into()] },
            );
        let second = BackupRestoreOrchestrator::new(&crashing_shell, &config)
            .backup(PKG, BackupMode::APK | BackupMode::DATA, &destination)
            .await;
        assert!(!second.succeeded);
        assert!(second.message.contains("capturing data"));

        // The committed state is still the first backup, artifacts included.
        let app_location = destination.child(PKG).await.unwrap();
        let stored = BackupProperties::from_json(
            &storage::read_to_string(app_location.as_ref(), BackupProperties::FILE_NAME)
                .await
                .unwrap(),
        )
        .unwrap();
        assert_eq!(stored, first_properties);
        let revision = app_location.child(&stored.revision).await.unwrap();
        assert!(revision.exists(APK_FILE_NAME).await.unwrap());
        assert!(revision.exists("data.tar.gz").await.unwrap());
        assert!(revision.exists(ContentsManifest::FILE_NAME).await.unwrap());
    }
}
