// pgmigrate/src/utils/workdir.rs
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::{AppError, Result};

/// Transient directory owned by a single workflow invocation.
///
/// The path is unique per invocation (`<root>/<workflow>-<timestamp>-<id>`) so two
/// workflows never share intermediate files. Nothing touches the filesystem until
/// [`WorkingDirectory::ensure`] is called.
#[derive(Debug)]
pub struct WorkingDirectory {
    path: PathBuf,
    keep_local_files: bool,
}

impl WorkingDirectory {
    pub fn new(root: &Path, workflow: &str, keep_local_files: bool) -> Self {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let id = Uuid::new_v4().simple().to_string();
        let path = root.join(format!("{}-{}-{}", workflow, timestamp, &id[..8]));
        Self {
            path,
            keep_local_files,
        }
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the directory on first use and returns its path.
    pub fn ensure(&self) -> Result<&Path> {
        std::fs::create_dir_all(&self.path).map_err(|e| AppError::io(&self.path, e))?;
        Ok(&self.path)
    }

    /// Removes the directory unless local files are kept. Failures are logged only.
    pub fn cleanup(&self) {
        if self.keep_local_files {
            if self.path.exists() {
                info!(path = %self.path.display(), "Local files preserved");
            }
            return;
        }
        if !self.path.exists() {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => info!(path = %self.path.display(), "Cleaned up temporary directory"),
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Could not clean up temporary directory"
            ),
        }
    }
}
