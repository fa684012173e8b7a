mod backup;
mod catalog;
mod restore;

use std::ops::{BitOr, BitOrAssign};

use lazy_regex::{Lazy, Regex, lazy_regex};
use serde::{Deserialize, Serialize};

pub use backup::BackupStage;
pub use catalog::{BackupEntry, delete_backup, list_backups};
pub use restore::RestoreStage;

use crate::{
    config::Config,
    error::ActionError,
    logging::ReportLog,
    shell::{ShellExecutor, quote},
};

pub static PACKAGE_NAME_REGEX: Lazy<Regex> = lazy_regex!(r"^(?:[A-Za-z]{1}[\w]*\.)+[A-Za-z][\w]*$");

/// Validates a package name and returns an error if invalid.
pub fn ensure_valid_package(package_name: &str) -> Result<(), ActionError> {
    if !PACKAGE_NAME_REGEX.is_match(package_name) {
        return Err(ActionError::Precondition(format!(
            "invalid package name: '{package_name}'"
        )));
    }
    Ok(())
}

/// Bitmask selecting which artifact classes a run covers, allowing
/// independent APK-only, data-only, or combined runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackupMode(u32);

impl BackupMode {
    pub const NONE: Self = Self(0);
    pub const APK: Self = Self(1);
    pub const DATA: Self = Self(1 << 1);
    pub const EXTERNAL_DATA: Self = Self(1 << 2);
    pub const OBB: Self = Self(1 << 3);
    pub const DEVICE_PROTECTED_DATA: Self = Self(1 << 4);
    pub const ALL: Self = Self(0b1_1111);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether any data artifact class is selected.
    pub fn any_data(self) -> bool {
        self.intersects(
            Self::DATA | Self::EXTERNAL_DATA | Self::OBB | Self::DEVICE_PROTECTED_DATA,
        )
    }
}

impl BitOr for BackupMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for BackupMode {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Subdirectories of private app data that are never backed up.
pub(crate) const DATA_EXCLUDED_DIRS: [&str; 3] = ["cache", "code_cache", "lib"];

/// Name of the staged APK inside a revision.
pub(crate) const APK_FILE_NAME: &str = "base.apk";

/// Prefix of revision directory names under a package's backup location.
pub(crate) const REVISION_PREFIX: &str = "revision-";

/// The data artifact classes a backup can capture besides the APK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DataArtifact {
    AppData,
    DeviceProtectedData,
    ExternalData,
    ObbData,
}

impl DataArtifact {
    pub(crate) const ALL: [DataArtifact; 4] = [
        DataArtifact::AppData,
        DataArtifact::DeviceProtectedData,
        DataArtifact::ExternalData,
        DataArtifact::ObbData,
    ];

    pub(crate) fn mode_bit(self) -> BackupMode {
        match self {
            DataArtifact::AppData => BackupMode::DATA,
            DataArtifact::DeviceProtectedData => BackupMode::DEVICE_PROTECTED_DATA,
            DataArtifact::ExternalData => BackupMode::EXTERNAL_DATA,
            DataArtifact::ObbData => BackupMode::OBB,
        }
    }

    /// Directory name used for the artifact inside a backup.
    pub(crate) fn dir_name(self) -> &'static str {
        match self {
            DataArtifact::AppData => "data",
            DataArtifact::DeviceProtectedData => "device_protected_files",
            DataArtifact::ExternalData => "external_files",
            DataArtifact::ObbData => "obb_files",
        }
    }

    pub(crate) fn archive_name(self) -> String {
        format!("{}.tar.gz", self.dir_name())
    }

    /// Where the artifact lives on the device.
    pub(crate) fn device_path(self, package: &str) -> String {
        match self {
            DataArtifact::AppData => format!("/data/data/{package}"),
            DataArtifact::DeviceProtectedData => format!("/data/user_de/0/{package}"),
            DataArtifact::ExternalData => format!("/sdcard/Android/data/{package}"),
            DataArtifact::ObbData => format!("/sdcard/Android/obb/{package}"),
        }
    }

    /// Private artifacts get the exclusion list at capture time and the
    /// ownership/permission/verification treatment at restore time.
    pub(crate) fn is_private(self) -> bool {
        matches!(self, DataArtifact::AppData | DataArtifact::DeviceProtectedData)
    }
}

/// Sequences the privileged shell and storage operations of one backup or
/// restore run and folds any stage failure into a terminal [`ActionResult`].
///
/// One orchestrator instance drives one run on one shell session; callers
/// enforce at most one active run per package.
///
/// [`ActionResult`]: crate::models::ActionResult
pub struct BackupRestoreOrchestrator<'a> {
    pub(crate) shell: &'a dyn ShellExecutor,
    pub(crate) config: &'a Config,
    pub(crate) report: Option<&'a ReportLog>,
}

impl<'a> BackupRestoreOrchestrator<'a> {
    pub fn new(shell: &'a dyn ShellExecutor, config: &'a Config) -> Self {
        Self { shell, config, report: None }
    }

    /// Attaches an error report log; run failures are appended to it.
    pub fn with_report(mut self, report: &'a ReportLog) -> Self {
        self.report = Some(report);
        self
    }

    pub(crate) async fn report_failure(&self, message: &str) {
        if let Some(report) = self.report {
            report.append(message).await;
        }
    }

    /// Process-writable directory where one run stages its artifacts. Plain
    /// `<staging>/<package>` is collision-free because at most one run per
    /// package is active at a time.
    pub(crate) fn staging_dir(&self, package: &str) -> String {
        format!("{}/{package}", self.config.staging_location)
    }

    /// Queries `versionName` and `versionCode` from `dumpsys package`.
    pub(crate) async fn query_package_version(
        &self,
        package: &str,
    ) -> Result<(String, i64), ActionError> {
        let result = self
            .shell
            .run_checked(&format!("dumpsys package {}", quote(package)))
            .await?;
        let mut version_name = None;
        let mut version_code = None;
        for line in &result.stdout {
            for token in line.split_whitespace() {
                if let Some(value) = token.strip_prefix("versionName=") {
                    version_name.get_or_insert_with(|| value.to_string());
                } else if let Some(value) = token.strip_prefix("versionCode=") {
                    if let Ok(code) = value.parse::<i64>() {
                        version_code.get_or_insert(code);
                    }
                }
            }
        }
        match (version_name, version_code) {
            (Some(name), Some(code)) => Ok((name, code)),
            _ => Err(ActionError::Precondition(format!(
                "package '{package}' is not installed or has no version info"
            ))),
        }
    }
}
