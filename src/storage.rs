use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::{
    fs,
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
};
use tracing::{debug, instrument, trace};

use crate::error::StorageError;

pub type StorageReader = Box<dyn AsyncRead + Send + Unpin>;
pub type StorageWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Truncate,
    Append,
}

/// An addressable backup location.
///
/// Deliberately narrow: resolve-child-by-name, create-file, open-for-read and
/// open-for-write are all the orchestrator needs, so a content-provider-style
/// handle can implement this just as well as a local directory. `list`,
/// `exists` and `delete` are what the backup catalog needs on top.
#[async_trait]
pub trait StorageLocation: Send + Sync {
    /// Resolves a child location by name, materializing it on demand.
    async fn child(&self, name: &str) -> Result<Box<dyn StorageLocation>, StorageError>;

    /// Creates an empty file entry. The mime type is advisory; filesystem
    /// backends ignore it.
    async fn create_file(&self, name: &str, mime_type: &str) -> Result<(), StorageError>;

    async fn open_read(&self, name: &str) -> Result<StorageReader, StorageError>;

    async fn open_write(&self, name: &str, mode: WriteMode)
    -> Result<StorageWriter, StorageError>;

    /// Names of entries directly under this location.
    async fn list(&self) -> Result<Vec<String>, StorageError>;

    async fn exists(&self, name: &str) -> Result<bool, StorageError>;

    /// Removes a child entry, recursively for directories.
    async fn delete(&self, name: &str) -> Result<(), StorageError>;
}

/// Reads a whole entry into a string.
pub async fn read_to_string(
    location: &dyn StorageLocation,
    name: &str,
) -> Result<String, StorageError> {
    let mut reader = location.open_read(name).await?;
    let mut contents = String::new();
    reader.read_to_string(&mut contents).await?;
    Ok(contents)
}

/// Creates (or truncates) an entry and writes the given bytes to it.
pub async fn write_all(
    location: &dyn StorageLocation,
    name: &str,
    mime_type: &str,
    bytes: &[u8],
) -> Result<(), StorageError> {
    location.create_file(name, mime_type).await?;
    let mut writer = location.open_write(name, WriteMode::Truncate).await?;
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// [`StorageLocation`] backed by a local directory tree.
#[derive(Debug, Clone)]
pub struct DirectoryLocation {
    root: PathBuf,
}

impl DirectoryLocation {
    /// Opens a directory as a storage location, creating it if needed. The
    /// parent must already exist; anything else means the location is
    /// misconfigured and is reported as unreachable before any shell work.
    #[instrument(err)]
    pub async fn open(root: impl Into<PathBuf> + std::fmt::Debug) -> Result<Self, StorageError> {
        let root = root.into();
        if !root.exists() {
            let parent = root.parent().filter(|p| p.exists()).ok_or_else(|| {
                StorageError::Unreachable(format!(
                    "parent of {} does not exist",
                    root.display()
                ))
            })?;
            trace!(parent = %parent.display(), "Creating backup location directory");
            fs::create_dir(&root).await?;
        } else if !root.is_dir() {
            return Err(StorageError::Unreachable(format!(
                "{} exists but is not a directory",
                root.display()
            )));
        }
        debug!(root = %root.display(), "Opened directory storage location");
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, StorageError> {
        if name.is_empty() || name.contains('/') || name.contains('\\') || name == ".." {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl StorageLocation for DirectoryLocation {
    async fn child(&self, name: &str) -> Result<Box<dyn StorageLocation>, StorageError> {
        let path = self.resolve(name)?;
        if !path.exists() {
            fs::create_dir(&path).await?;
        }
        Ok(Box::new(Self { root: path }))
    }

    async fn create_file(&self, name: &str, _mime_type: &str) -> Result<(), StorageError> {
        let path = self.resolve(name)?;
        fs::File::create(&path).await?;
        Ok(())
    }

    async fn open_read(&self, name: &str) -> Result<StorageReader, StorageError> {
        let path = self.resolve(name)?;
        let file = fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(name.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(Box::new(file))
    }

    async fn open_write(
        &self,
        name: &str,
        mode: WriteMode,
    ) -> Result<StorageWriter, StorageError> {
        let path = self.resolve(name)?;
        let file = match mode {
            WriteMode::Truncate => fs::File::create(&path).await?,
            WriteMode::Append => {
                fs::OpenOptions::new().create(true).append(true).open(&path).await?
            }
        };
        Ok(Box::new(file))
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn exists(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.resolve(name)?.exists())
    }

    async fn delete(&self, name: &str) -> Result<(), StorageError> {
        let path = self.resolve(name)?;
        if !path.exists() {
            return Err(StorageError::NotFound(name.to_string()));
        }
        if path.is_dir() {
            fs::remove_dir_all(&path).await?;
        } else {
            fs::remove_file(&path).await?;
        }
        Ok(())
    }
}
