// pgmigrate/src/backup/db_dump.rs
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::database::ConnectionDescriptor;
use crate::errors::{AppError, Result};
use crate::process::args::PgDumpArgs;
use crate::process::{CommandRunner, Invocation};

/// Where a dump should be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupTarget {
    /// `<dir>/<database>_<YYYYmmdd_HHMMSS>.dump`, a fresh file every run.
    Timestamped(PathBuf),
    /// A fixed path; an existing file is reused instead of dumping again.
    Fixed(PathBuf),
}

impl BackupTarget {
    fn resolve(&self, database: &str) -> PathBuf {
        match self {
            BackupTarget::Timestamped(dir) => {
                let timestamp = Local::now().format("%Y%m%d_%H%M%S");
                dir.join(format!("{}_{}.dump", database, timestamp))
            }
            BackupTarget::Fixed(path) => path.clone(),
        }
    }
}

/// A dump on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpArtifact {
    pub path: PathBuf,
    /// True when a fixed target already existed and `pg_dump` was not run.
    pub reused: bool,
}

/// Dumps one database with `pg_dump --format=custom`.
pub async fn backup_database(
    runner: &dyn CommandRunner,
    conn: &ConnectionDescriptor,
    target: &BackupTarget,
) -> Result<DumpArtifact> {
    conn.validate("backup source")?;
    let path = target.resolve(&conn.database);

    if matches!(target, BackupTarget::Fixed(_)) && path.is_file() {
        info!(path = %path.display(), "Backup file already exists, skipping pg_dump");
        return Ok(DumpArtifact { path, reused: true });
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| AppError::io(parent, e))?;
    }

    let args = PgDumpArgs { conn, file: &path }.build()?;
    info!(database = %conn, file = %path.display(), "Backing up database");
    let invocation = Invocation::new("pg_dump")
        .args(args)
        .envs(conn.env_overlay()?);
    let outcome = runner
        .run(&invocation)
        .await
        .and_then(|_| ensure_written(&path));
    if let Err(err) = outcome {
        discard_partial(&path).await;
        return Err(err);
    }
    info!(file = %path.display(), "Backup completed");
    Ok(DumpArtifact {
        path,
        reused: false,
    })
}

/// pg_dump creates its output file before connecting, so a failed run can leave
/// one behind that a fixed target would otherwise reuse.
async fn discard_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => warn!(path = %path.display(), "Removed incomplete backup file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Could not remove incomplete backup file"),
    }
}

fn ensure_written(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(AppError::process(
            "pg_dump",
            format!("exited successfully but {} was not created", path.display()),
        ))
    }
}
