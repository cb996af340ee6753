use std::path::{Path, PathBuf};

use async_trait::async_trait;
use domain::{DomainError, MappingSnapshot, MappingStore};
use tracing::debug;

/// Last published mapping kept as JSON on local disk
pub struct FileMappingStore {
    path: PathBuf,
}

impl FileMappingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn storage_error(action: &str, path: &Path, e: impl std::fmt::Display) -> DomainError {
    DomainError::Storage(format!("{} {}: {}", action, path.display(), e))
}

#[async_trait]
impl MappingStore for FileMappingStore {
    async fn load(&self) -> Result<Option<MappingSnapshot>, DomainError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_error("Failed to read", &self.path, e)),
        };
        let snapshot = serde_json::from_str(&raw)
            .map_err(|e| storage_error("Corrupt mapping file", &self.path, e))?;
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &MappingSnapshot) -> Result<(), DomainError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| storage_error("Failed to create", dir, e))?;
        }

        let json = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| storage_error("Failed to encode", &self.path, e))?;

        // Write aside, then swap in, so a crash never leaves half a file
        let temp = self.temp_path();
        tokio::fs::write(&temp, json)
            .await
            .map_err(|e| storage_error("Failed to write", &temp, e))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| storage_error("Failed to replace", &self.path, e))?;

        debug!(path = %self.path.display(), entities = snapshot.len(), "Mapping persisted");
        Ok(())
    }
}
