use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use super::KeyValueStore;
use crate::errors::{StorageError, StorageResult};

const VALUE_EXTENSION: &str = "json";

/// One file per key under a base directory
///
/// Keys map directly to file names, so they are restricted to a safe
/// character set. Writes go through a temp file in the same directory and
/// are renamed into place.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_dir: PathBuf,
    max_value_bytes: Option<usize>,
}

impl FileStore {
    /// Open (and create if needed) the store directory
    pub async fn open<P: AsRef<Path>>(
        base_dir: P,
        max_value_bytes: Option<usize>,
    ) -> StorageResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir).await?;
        debug!("Opened file store at {}", base_dir.display());
        Ok(Self {
            base_dir,
            max_value_bytes,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.base_dir.join(format!("{key}.{VALUE_EXTENSION}")))
    }
}

fn validate_key(key: &str) -> StorageResult<()> {
    let invalid = |reason: &str| StorageError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if key.is_empty() {
        return Err(invalid("key cannot be empty"));
    }
    if key.len() > 200 {
        return Err(invalid("key longer than 200 characters"));
    }
    if key.starts_with('.') {
        return Err(invalid("key cannot start with '.'"));
    }
    if let Some(c) = key
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(invalid(&format!("character {c:?} not allowed")));
    }
    Ok(())
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| StorageError::Corrupt {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        if let Some(limit) = self.max_value_bytes
            && value.len() > limit
        {
            return Err(StorageError::QuotaExceeded {
                key: key.to_string(),
                size: value.len(),
                limit,
            });
        }

        let dir = self.base_dir.clone();
        let contents = value.as_bytes().to_vec();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut temp = tempfile::NamedTempFile::new_in(&dir)?;
            temp.write_all(&contents)?;
            temp.as_file().sync_all()?;
            temp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;

        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = fs::read_dir(&self.base_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(VALUE_EXTENSION) {
                continue;
            }
            match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) if validate_key(stem).is_ok() => keys.push(stem.to_string()),
                _ => warn!("Ignoring unexpected file in store: {}", path.display()),
            }
        }

        Ok(keys)
    }
}
