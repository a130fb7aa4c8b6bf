// pgmigrate/src/restore/db_restore.rs
use std::path::Path;
use tracing::info;

use crate::database::ConnectionDescriptor;
use crate::errors::{AppError, Result};
use crate::process::args::{PgRestoreArgs, PsqlArgs, quote_ident};
use crate::process::{CommandRunner, Invocation};

const MAINTENANCE_DATABASE: &str = "postgres";

async fn run_admin_command(
    runner: &dyn CommandRunner,
    conn: &ConnectionDescriptor,
    command: &str,
) -> Result<()> {
    let admin = conn.with_database(MAINTENANCE_DATABASE);
    let args = PsqlArgs {
        conn: &admin,
        command,
        tuples_only: false,
    }
    .build()?;
    let invocation = Invocation::new("psql").args(args).envs(admin.env_overlay()?);
    runner.run(&invocation).await?;
    Ok(())
}

/// `DROP DATABASE IF EXISTS` through the maintenance database.
pub async fn drop_database(runner: &dyn CommandRunner, conn: &ConnectionDescriptor) -> Result<()> {
    info!(database = %conn.database, host = %conn.host, "Dropping destination database");
    let command = format!("DROP DATABASE IF EXISTS {};", quote_ident(&conn.database));
    run_admin_command(runner, conn, &command).await
}

/// `CREATE DATABASE` through the maintenance database. Fails when it already exists.
pub async fn create_database(runner: &dyn CommandRunner, conn: &ConnectionDescriptor) -> Result<()> {
    info!(database = %conn.database, host = %conn.host, "Creating destination database");
    let command = format!("CREATE DATABASE {};", quote_ident(&conn.database));
    run_admin_command(runner, conn, &command).await
}

/// Restores a custom-format archive with `--clean --if-exists`.
pub async fn restore_archive(
    runner: &dyn CommandRunner,
    conn: &ConnectionDescriptor,
    archive: &Path,
) -> Result<()> {
    ensure_archive(archive)?;
    let archive_str = archive.to_str().ok_or_else(|| AppError::InvalidArgument {
        tool: "pg_restore",
        reason: format!("archive path is not valid UTF-8: {}", archive.display()),
    })?;
    let args = PgRestoreArgs::restore(conn, archive_str).build()?;
    info!(archive = %archive.display(), database = %conn, "Restoring database");
    let invocation = Invocation::new("pg_restore")
        .args(args)
        .envs(conn.env_overlay()?);
    runner.run(&invocation).await?;
    info!(database = %conn.database, "Restore completed");
    Ok(())
}

/// `pg_restore --list <archive>` with the manifest written to `manifest`.
pub async fn list_archive(runner: &dyn CommandRunner, archive: &Path, manifest: &Path) -> Result<()> {
    ensure_archive(archive)?;
    let archive_str = archive.to_str().ok_or_else(|| AppError::InvalidArgument {
        tool: "pg_restore",
        reason: format!("archive path is not valid UTF-8: {}", archive.display()),
    })?;
    let args = PgRestoreArgs::list(archive_str).build()?;
    info!(archive = %archive.display(), manifest = %manifest.display(), "Listing archive contents");
    let invocation = Invocation::new("pg_restore")
        .args(args)
        .redirect_stdout(manifest);
    runner.run(&invocation).await?;
    if !manifest.is_file() {
        return Err(AppError::process(
            "pg_restore",
            format!("manifest {} was not written", manifest.display()),
        ));
    }
    Ok(())
}

/// The archive has to exist before any destructive command is issued.
pub fn ensure_archive(archive: &Path) -> Result<()> {
    if archive.is_file() {
        Ok(())
    } else {
        Err(AppError::config(format!(
            "backup file not found: {}",
            archive.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::RecordingRunner;
    use crate::utils::masking::Secret;

    fn destination() -> ConnectionDescriptor {
        let mut conn = ConnectionDescriptor::new("dst.example.com", "orders", "admin");
        conn.password = Some(Secret::new("pw"));
        conn
    }

    #[tokio::test]
    async fn drop_runs_against_maintenance_database_with_quoted_name() {
        let runner = RecordingRunner::succeeding();
        let mut conn = destination();
        conn.database = "Order\"s".to_string();
        drop_database(&runner, &conn).await.unwrap();

        let calls = runner.calls();
        assert_eq!(calls[0].program(), "psql");
        let args = calls[0].arguments();
        assert!(args.contains(&"--dbname=postgres".to_string()));
        assert!(args.contains(&"--command=DROP DATABASE IF EXISTS \"Order\"\"s\";".to_string()));
    }

    #[tokio::test]
    async fn create_uses_quoted_identifier() {
        let runner = RecordingRunner::succeeding();
        create_database(&runner, &destination()).await.unwrap();
        let args = runner.calls()[0].arguments().to_vec();
        assert!(args.contains(&"--command=CREATE DATABASE \"orders\";".to_string()));
    }

    #[tokio::test]
    async fn restore_passes_clean_flags_and_archive_last() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("orders.dump");
        std::fs::write(&archive, b"PGDMP").unwrap();
        let runner = RecordingRunner::succeeding();

        restore_archive(&runner, &destination(), &archive).await.unwrap();

        let call = &runner.calls()[0];
        assert_eq!(call.program(), "pg_restore");
        let args = call.arguments();
        assert!(args.contains(&"--clean".to_string()));
        assert!(args.contains(&"--if-exists".to_string()));
        assert_eq!(args.last().map(String::as_str), archive.to_str());
        assert_eq!(call.env_value("PGPASSWORD"), Some("pw"));
    }

    #[tokio::test]
    async fn list_redirects_manifest_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("sync.dump");
        std::fs::write(&archive, b"PGDMP").unwrap();
        let manifest = dir.path().join("toc.list");
        let runner = RecordingRunner::with(|inv| {
            if let Some(path) = inv.redirect_path() {
                std::fs::write(path, "3; 3079 16385 EXTENSION - azure\n").unwrap();
            }
            Ok(Default::default())
        });

        list_archive(&runner, &archive, &manifest).await.unwrap();

        let call = &runner.calls()[0];
        assert_eq!(call.arguments()[0], "--list");
        assert_eq!(call.env_value("PGPASSWORD"), None);
        assert!(manifest.is_file());
    }

    #[tokio::test]
    async fn missing_archive_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::succeeding();
        let err = restore_archive(&runner, &destination(), &dir.path().join("missing.dump"))
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(runner.calls().is_empty());
    }
}
