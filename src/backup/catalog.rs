use tracing::{debug, info, instrument};

use crate::{
    error::StorageError,
    models::BackupProperties,
    storage::{self, StorageLocation},
};

/// One catalogued backup: a per-package directory with committed properties.
#[derive(Debug, Clone, PartialEq)]
pub struct BackupEntry {
    pub package_name: String,
    pub properties: BackupProperties,
}

/// Lists all backups under the backup location root, newest first.
///
/// Directories without readable committed properties (interrupted runs,
/// foreign files) are skipped, not reported as errors.
#[instrument(skip(location), err)]
pub async fn list_backups(
    location: &dyn StorageLocation,
) -> Result<Vec<BackupEntry>, StorageError> {
    let mut entries = Vec::new();
    for name in location.list().await? {
        let child = match location.child(&name).await {
            Ok(child) => child,
            Err(e) => {
                debug!(name, error = %e, "Skipping unreadable backup location entry");
                continue;
            }
        };
        let json = match storage::read_to_string(child.as_ref(), BackupProperties::FILE_NAME).await
        {
            Ok(json) => json,
            Err(e) => {
                debug!(name, error = %e, "Skipping entry without committed properties");
                continue;
            }
        };
        match BackupProperties::from_json(&json) {
            Ok(properties) => entries.push(BackupEntry { package_name: name, properties }),
            Err(e) => debug!(name, error = %e, "Skipping entry with unparseable properties"),
        }
    }
    entries.sort_by(|a, b| b.properties.backup_time.cmp(&a.properties.backup_time));
    debug!(count = entries.len(), "Catalogued backups");
    Ok(entries)
}

/// Deletes one package's backup, revision directories included.
///
/// Refuses to delete a directory that carries no committed properties, so a
/// wrong package name can never take out foreign data.
#[instrument(skip(location), err)]
pub async fn delete_backup(
    location: &dyn StorageLocation,
    package_name: &str,
) -> Result<(), StorageError> {
    if !location.exists(package_name).await? {
        return Err(StorageError::NotFound(package_name.to_string()));
    }
    let child = location.child(package_name).await?;
    if !child.exists(BackupProperties::FILE_NAME).await? {
        return Err(StorageError::InvalidName(format!(
            "'{package_name}' is not a committed backup"
        )));
    }
    location.delete(package_name).await?;
    info!(package = package_name, "Deleted backup");
    Ok(())
}
