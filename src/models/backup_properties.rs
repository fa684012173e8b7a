use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::backup::BackupMode;

/// Metadata describing one backup instance for one application.
///
/// Written once at backup time (the commit point of the run) and read back at
/// restore time; immutable in between. The `revision` names the artifact
/// subdirectory these properties commit to, which is what makes overwriting a
/// backup atomic from the caller's perspective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupProperties {
    pub package_name: String,
    pub version_name: String,
    pub version_code: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub backup_time: OffsetDateTime,
    /// Name of the revision directory holding the artifacts.
    pub revision: String,
    pub has_apk: bool,
    pub has_app_data: bool,
    pub has_external_data: bool,
    pub has_obb_data: bool,
    pub has_device_protected_data: bool,
}

impl BackupProperties {
    pub const FILE_NAME: &'static str = "backup.properties";
    pub const MIME_TYPE: &'static str = "application/json";

    /// Whether every artifact class selected by `mode` is present.
    pub fn includes(&self, mode: BackupMode) -> bool {
        let mut present = BackupMode::NONE;
        if self.has_apk {
            present |= BackupMode::APK;
        }
        if self.has_app_data {
            present |= BackupMode::DATA;
        }
        if self.has_external_data {
            present |= BackupMode::EXTERNAL_DATA;
        }
        if self.has_obb_data {
            present |= BackupMode::OBB;
        }
        if self.has_device_protected_data {
            present |= BackupMode::DEVICE_PROTECTED_DATA;
        }
        present.contains(mode)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn sample() -> BackupProperties {
        BackupProperties {
            package_name: "org.fdroid.fdroid".into(),
            version_name: "1.15.2".into(),
            version_code: 1015002,
            backup_time: datetime!(2021-01-19 01:03:29 +1),
            revision: "revision-0000".into(),
            has_apk: true,
            has_app_data: true,
            has_external_data: false,
            has_obb_data: false,
            has_device_protected_data: false,
        }
    }

    #[test]
    fn json_round_trip_is_lossless() {
        let properties = sample();
        let json = properties.to_json().unwrap();
        let restored = BackupProperties::from_json(&json).unwrap();
        assert_eq!(restored, properties);
        assert_eq!(
            restored.backup_time.unix_timestamp(),
            properties.backup_time.unix_timestamp()
        );
    }

    #[test]
    fn includes_checks_every_selected_artifact() {
        let properties = sample();
        assert!(properties.includes(BackupMode::APK));
        assert!(properties.includes(BackupMode::APK | BackupMode::DATA));
        assert!(!properties.includes(BackupMode::OBB));
        assert!(!properties.includes(BackupMode::DATA | BackupMode::EXTERNAL_DATA));
        assert!(properties.includes(BackupMode::NONE));
    }
}
