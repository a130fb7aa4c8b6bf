// pgmigrate/src/sync/docker.rs
use async_trait::async_trait;
use sqlx::postgres::PgConnectOptions;
use sqlx::{ConnectOptions, Connection};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::errors::{AppError, Result};
use crate::process::args::{DockerArgs, PgRestoreArgs};
use crate::process::{CommandRunner, Invocation};
use crate::utils::masking::Secret;
use crate::utils::sanitize_volume_name;

const POSTGRES_PORT: u16 = 5432;
const DATA_MOUNT_POINT: &str = "/var/lib/postgresql/data";
const CONTAINER_STAGING_DIR: &str = "/tmp";
const SUPERUSER: &str = "postgres";
const MAX_READINESS_DELAY: Duration = Duration::from_secs(5);

/// Bounded exponential backoff for the readiness poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub attempts: u32,
    pub initial_delay: Duration,
}

impl Default for Readiness {
    fn default() -> Self {
        Self {
            attempts: 10,
            initial_delay: Duration::from_millis(500),
        }
    }
}

/// A throwaway PostgreSQL container on the local Docker daemon.
#[derive(Debug, Clone)]
pub struct LocalContainer {
    pub name: String,
    pub image: String,
    pub host_port: u16,
    pub database: String,
    pub password: Secret,
    pub readiness: Readiness,
}

impl LocalContainer {
    pub fn volume_name(&self) -> String {
        format!("pg_local_data_{}", sanitize_volume_name(&self.database))
    }

    fn password_env(&self, key: &str) -> (String, String) {
        (key.to_string(), self.password.expose().to_string())
    }
}

/// `docker rm -f <name>`.
pub async fn remove_container(runner: &dyn CommandRunner, container: &LocalContainer) -> Result<()> {
    let args = DockerArgs::RemoveForce {
        container: &container.name,
    }
    .build()?;
    runner.run(&Invocation::new("docker").args(args)).await?;
    Ok(())
}

/// `docker run -d` with the superuser password taken from the environment.
pub async fn start_container(runner: &dyn CommandRunner, container: &LocalContainer) -> Result<()> {
    let volume = container.volume_name();
    let db_env = [("POSTGRES_DB", container.database.as_str())];
    let args = DockerArgs::Run {
        container: &container.name,
        env_passthrough: &["POSTGRES_PASSWORD"],
        env: &db_env,
        host_port: container.host_port,
        container_port: POSTGRES_PORT,
        volume: &volume,
        mount_point: DATA_MOUNT_POINT,
        image: &container.image,
    }
    .build()?;
    info!(container = %container.name, image = %container.image, port = container.host_port, volume = %volume, "Starting local PostgreSQL container");
    let invocation = Invocation::new("docker")
        .args(args)
        .envs([container.password_env("POSTGRES_PASSWORD")]);
    runner.run(&invocation).await?;
    Ok(())
}

/// Something that can tell whether the container accepts connections yet.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn probe(&self, container: &LocalContainer) -> Result<()>;
}

/// Opens and closes a real connection to `localhost:<host_port>`.
pub struct PostgresProbe;

#[async_trait]
impl ReadinessProbe for PostgresProbe {
    async fn probe(&self, container: &LocalContainer) -> Result<()> {
        let options = PgConnectOptions::new()
            .host("localhost")
            .port(container.host_port)
            .username(SUPERUSER)
            .password(container.password.expose())
            .database(&container.database)
            .disable_statement_logging();
        let conn = options
            .connect()
            .await
            .map_err(|e| AppError::process("postgres", e.to_string()))?;
        conn.close()
            .await
            .map_err(|e| AppError::process("postgres", e.to_string()))?;
        Ok(())
    }
}

/// Polls until the probe succeeds. Returns the attempt number that succeeded.
pub async fn wait_until_ready(probe: &dyn ReadinessProbe, container: &LocalContainer) -> Result<u32> {
    let Readiness {
        attempts,
        initial_delay,
    } = container.readiness;
    let mut delay = initial_delay;
    let mut last_error = String::from("no attempts were made");

    for attempt in 1..=attempts.max(1) {
        tokio::time::sleep(delay).await;
        match probe.probe(container).await {
            Ok(()) => {
                info!(container = %container.name, attempt, "PostgreSQL is accepting connections");
                return Ok(attempt);
            }
            Err(e) => {
                warn!(container = %container.name, attempt, error = %e, "PostgreSQL not ready yet");
                last_error = e.to_string();
            }
        }
        delay = (delay * 2).min(MAX_READINESS_DELAY);
    }

    Err(AppError::process(
        "docker",
        format!(
            "container '{}' did not accept connections after {} attempts: {}",
            container.name,
            attempts.max(1),
            last_error
        ),
    ))
}

/// `docker cp <file> <name>:/tmp/`. Returns the path inside the container.
pub async fn copy_into(
    runner: &dyn CommandRunner,
    container: &LocalContainer,
    source: &Path,
) -> Result<String> {
    let file_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| AppError::InvalidArgument {
            tool: "docker",
            reason: format!("copy source has no file name: {}", source.display()),
        })?;
    let destination = format!("{}/{}", CONTAINER_STAGING_DIR, file_name);
    let args = DockerArgs::Copy {
        source,
        container: &container.name,
        destination: &format!("{}/", CONTAINER_STAGING_DIR),
    }
    .build()?;
    info!(file = %source.display(), container = %container.name, "Copying into container");
    runner.run(&Invocation::new("docker").args(args)).await?;
    Ok(destination)
}

/// Runs `pg_restore --use-list` inside the container as the superuser.
pub async fn restore_from_list(
    runner: &dyn CommandRunner,
    container: &LocalContainer,
    archive: &str,
    list: &str,
) -> Result<()> {
    let mut command = vec!["pg_restore".to_string()];
    command.extend(PgRestoreArgs::from_list(SUPERUSER, &container.database, list, archive).build()?);
    let args = DockerArgs::Exec {
        container: &container.name,
        env_passthrough: &["PGPASSWORD"],
        command,
    }
    .build()?;
    info!(container = %container.name, database = %container.database, "Restoring inside container");
    let invocation = Invocation::new("docker")
        .args(args)
        .envs([container.password_env("PGPASSWORD")]);
    runner.run(&invocation).await?;
    Ok(())
}
