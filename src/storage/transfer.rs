// pgmigrate/src/storage/transfer.rs
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::{BlobStore, StorageLocation};
use crate::errors::{AppError, Result};

/// A store paired with the location it is addressed through.
#[derive(Clone, Copy)]
pub struct Endpoint<'a> {
    pub store: &'a dyn BlobStore,
    pub location: &'a StorageLocation,
}

/// Outcome of a whole-container migration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationTally {
    pub total: usize,
    pub migrated: usize,
    /// Object name and failure reason for every object that did not make it.
    pub failed: Vec<(String, String)>,
}

impl MigrationTally {
    /// At least one object went across. Callers wanting all-or-nothing check `failed`.
    pub fn succeeded(&self) -> bool {
        self.migrated > 0
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

impl std::fmt::Display for MigrationTally {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} objects migrated", self.migrated, self.total)
    }
}

/// Byte lengths of a source/destination pair that matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeCheck {
    pub bytes: u64,
}

/// Downloads the single object named by `source` into `destination_dir`.
pub async fn download(source: Endpoint<'_>, destination_dir: &Path) -> Result<PathBuf> {
    let location = source.location;
    let name = location.object_name()?;
    if !source.store.exists(&location.container, name).await? {
        return Err(AppError::transfer(format!(
            "object '{}' does not exist in container '{}'",
            name, location.container
        )));
    }

    tokio::fs::create_dir_all(destination_dir)
        .await
        .map_err(|e| AppError::io(destination_dir, e))?;
    let file_name = Path::new(name)
        .file_name()
        .ok_or_else(|| AppError::transfer(format!("object name '{}' has no file name", name)))?;
    let local_path = destination_dir.join(file_name);

    info!(object = name, to = %local_path.display(), "Downloading");
    let bytes = source
        .store
        .download_to(&location.container, name, &local_path)
        .await?;
    info!(object = name, bytes, "Downloaded");
    Ok(local_path)
}

/// Uploads `local_path` to the object named by `destination`, creating the container if needed.
pub async fn upload(destination: Endpoint<'_>, local_path: &Path) -> Result<()> {
    let location = destination.location;
    let name = location.object_name()?;
    if !local_path.is_file() {
        return Err(AppError::transfer(format!(
            "local file does not exist: {}",
            local_path.display()
        )));
    }
    destination
        .store
        .create_container_if_missing(&location.container)
        .await?;
    info!(from = %local_path.display(), object = name, container = %location.container, "Uploading");
    destination
        .store
        .upload_from(&location.container, name, local_path, true)
        .await
}

/// Copies every object of the source container into the destination container.
///
/// Objects move one at a time through `work_dir`. A failing object is logged and
/// recorded in the tally; it never stops the remaining objects.
pub async fn migrate_container(
    source: Endpoint<'_>,
    destination: Endpoint<'_>,
    work_dir: &Path,
    keep_local_files: bool,
) -> Result<MigrationTally> {
    let src_container = &source.location.container;
    let dst_container = &destination.location.container;

    if !source.store.container_exists(src_container).await? {
        return Err(AppError::transfer(format!(
            "source container '{}' does not exist",
            src_container
        )));
    }
    destination
        .store
        .create_container_if_missing(dst_container)
        .await?;

    info!(container = %src_container, "Listing objects in source container");
    let names = source.store.list_names(src_container).await?;
    let mut tally = MigrationTally {
        total: names.len(),
        ..Default::default()
    };
    if names.is_empty() {
        info!(container = %src_container, "Source container is empty. Nothing to migrate.");
        return Ok(tally);
    }
    info!(count = names.len(), "Found objects to migrate");

    tokio::fs::create_dir_all(work_dir)
        .await
        .map_err(|e| AppError::io(work_dir, e))?;

    for (index, name) in names.iter().enumerate() {
        let local_path = work_dir.join(local_file_name(index, name));
        match migrate_one(source, destination, name, &local_path, keep_local_files).await {
            Ok(()) => {
                tally.migrated += 1;
                info!(object = %name, "Migrated");
            }
            Err(e) => {
                warn!(object = %name, error = %e, "Failed to migrate object");
                tally.failed.push((name.clone(), e.to_string()));
                if !keep_local_files {
                    let _ = tokio::fs::remove_file(&local_path).await;
                }
            }
        }
    }

    info!(
        migrated = tally.migrated,
        total = tally.total,
        "Container migration completed"
    );
    Ok(tally)
}

async fn migrate_one(
    source: Endpoint<'_>,
    destination: Endpoint<'_>,
    name: &str,
    local_path: &Path,
    keep_local_files: bool,
) -> Result<()> {
    source
        .store
        .download_to(&source.location.container, name, local_path)
        .await?;
    destination
        .store
        .upload_from(&destination.location.container, name, local_path, true)
        .await?;
    if !keep_local_files {
        tokio::fs::remove_file(local_path)
            .await
            .map_err(|e| AppError::io(local_path, e))?;
    }
    Ok(())
}

/// Flattens an object name into a collision-free local file name.
fn local_file_name(index: usize, name: &str) -> String {
    let flat: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("{:05}_{}", index, flat)
}

/// Compares the byte length of the source and destination objects.
pub async fn verify_sizes(source: Endpoint<'_>, destination: Endpoint<'_>) -> Result<SizeCheck> {
    let src_name = source.location.object_name()?;
    let dst_name = destination.location.object_name()?;

    if !source.store.exists(&source.location.container, src_name).await? {
        return Err(AppError::VerificationMismatch(format!(
            "source object '{}' does not exist",
            src_name
        )));
    }
    if !destination
        .store
        .exists(&destination.location.container, dst_name)
        .await?
    {
        return Err(AppError::VerificationMismatch(format!(
            "destination object '{}' does not exist",
            dst_name
        )));
    }

    let src_size = source.store.size(&source.location.container, src_name).await?;
    let dst_size = destination
        .store
        .size(&destination.location.container, dst_name)
        .await?;
    if src_size != dst_size {
        return Err(AppError::VerificationMismatch(format!(
            "content length mismatch: source={}, destination={}",
            src_size, dst_size
        )));
    }
    info!(bytes = src_size, "Both objects have the same size");
    Ok(SizeCheck { bytes: src_size })
}
