// pgmigrate/src/storage/filesystem.rs
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

use super::BlobStore;
use crate::errors::{AppError, Result};

/// Directory-backed store: `<root>/<container>/<object name>`.
pub struct FilesystemBlobStore {
    root: PathBuf,
}

impl FilesystemBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn container_path(&self, container: &str) -> Result<PathBuf> {
        Ok(self.root.join(safe_relative(container)?))
    }

    fn object_path(&self, container: &str, name: &str) -> Result<PathBuf> {
        Ok(self.container_path(container)?.join(safe_relative(name)?))
    }
}

/// Rejects names that would escape the store root.
fn safe_relative(name: &str) -> Result<&Path> {
    let path = Path::new(name);
    let escapes = name.is_empty()
        || path
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
    if escapes {
        return Err(AppError::transfer(format!("invalid object or container name '{}'", name)));
    }
    Ok(path)
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    fn describe(&self) -> String {
        format!("local directory {}", self.root.display())
    }

    async fn container_exists(&self, container: &str) -> Result<bool> {
        Ok(self.container_path(container)?.is_dir())
    }

    async fn create_container_if_missing(&self, container: &str) -> Result<()> {
        let path = self.container_path(container)?;
        fs::create_dir_all(&path)
            .await
            .map_err(|e| AppError::transfer(format!("failed to create container {}: {}", path.display(), e)))
    }

    async fn exists(&self, container: &str, name: &str) -> Result<bool> {
        Ok(self.object_path(container, name)?.is_file())
    }

    async fn download_to(&self, container: &str, name: &str, destination: &Path) -> Result<u64> {
        let source = self.object_path(container, name)?;
        fs::copy(&source, destination).await.map_err(|e| {
            AppError::transfer(format!(
                "failed to copy {} to {}: {}",
                source.display(),
                destination.display(),
                e
            ))
        })
    }

    async fn upload_from(&self, container: &str, name: &str, source: &Path, overwrite: bool) -> Result<()> {
        let target = self.object_path(container, name)?;
        if !overwrite && target.exists() {
            return Err(AppError::transfer(format!(
                "object '{}' already exists in container '{}'",
                name, container
            )));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::transfer(format!("failed to create {}: {}", parent.display(), e)))?;
        }
        fs::copy(source, &target).await.map_err(|e| {
            AppError::transfer(format!("failed to write {}: {}", target.display(), e))
        })?;
        Ok(())
    }

    async fn list_names(&self, container: &str) -> Result<Vec<String>> {
        let base = self.container_path(container)?;
        tokio::task::spawn_blocking(move || {
            let mut names = Vec::new();
            for entry in WalkDir::new(&base).sort_by_file_name() {
                let entry = entry
                    .map_err(|e| AppError::transfer(format!("failed to list {}: {}", base.display(), e)))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let relative = entry
                    .path()
                    .strip_prefix(&base)
                    .map_err(|e| AppError::transfer(e.to_string()))?;
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                names.push(name);
            }
            Ok(names)
        })
        .await
        .map_err(|e| AppError::transfer(format!("listing task failed: {}", e)))?
    }

    async fn size(&self, container: &str, name: &str) -> Result<u64> {
        let path = self.object_path(container, name)?;
        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| AppError::transfer(format!("failed to stat {}: {}", path.display(), e)))?;
        Ok(metadata.len())
    }
}
