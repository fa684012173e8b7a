use crate::models::BackupProperties;

/// Terminal outcome of one backup or restore run.
///
/// Produced exactly once per run and handed to the UI layer, which owns its
/// display lifecycle. Every run, success or failure, yields one of these with
/// a human-readable message; no run is silently dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionResult {
    pub package_name: String,
    /// Empty on early failure, before properties were read or written.
    pub properties: Option<BackupProperties>,
    pub message: String,
    pub succeeded: bool,
}

impl ActionResult {
    pub fn success(
        package_name: impl Into<String>,
        properties: Option<BackupProperties>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            package_name: package_name.into(),
            properties,
            message: message.into(),
            succeeded: true,
        }
    }

    pub fn failure(
        package_name: impl Into<String>,
        properties: Option<BackupProperties>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            package_name: package_name.into(),
            properties,
            message: message.into(),
            succeeded: false,
        }
    }
}
