// pgmigrate/src/process/args.rs
//! Argument builders for the external tools. Values are validated before they reach
//! an argument vector; no shell is involved at any point.

use std::path::Path;

use crate::database::ConnectionDescriptor;
use crate::errors::{AppError, Result};

fn check(tool: &'static str, field: &str, value: &str) -> Result<()> {
    let reason = if value.trim().is_empty() {
        Some("must not be empty")
    } else if value.starts_with('-') {
        Some("must not start with '-'")
    } else if value.chars().any(char::is_control) {
        Some("must not contain control characters")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(AppError::InvalidArgument {
            tool,
            reason: format!("{} {}", field, reason),
        }),
        None => Ok(()),
    }
}

fn path_str(tool: &'static str, field: &str, path: &Path) -> Result<String> {
    let value = path.to_str().ok_or_else(|| AppError::InvalidArgument {
        tool,
        reason: format!("{} is not valid UTF-8: {}", field, path.display()),
    })?;
    check(tool, field, value)?;
    Ok(value.to_string())
}

fn connection_args(tool: &'static str, conn: &ConnectionDescriptor) -> Result<Vec<String>> {
    check(tool, "host", &conn.host)?;
    check(tool, "username", &conn.username)?;
    check(tool, "database", &conn.database)?;
    Ok(vec![
        format!("--host={}", conn.host),
        format!("--port={}", conn.port),
        format!("--username={}", conn.username),
        format!("--dbname={}", conn.database),
    ])
}

/// Quotes a PostgreSQL identifier (`orders"x` becomes `"orders""x"`).
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `pg_dump` producing a single custom-format archive.
pub struct PgDumpArgs<'a> {
    pub conn: &'a ConnectionDescriptor,
    pub file: &'a Path,
}

impl PgDumpArgs<'_> {
    pub fn build(&self) -> Result<Vec<String>> {
        let mut args = connection_args("pg_dump", self.conn)?;
        args.extend(
            ["--format=custom", "--verbose", "--no-owner", "--no-acl"]
                .into_iter()
                .map(String::from),
        );
        args.push(format!("--file={}", path_str("pg_dump", "file", self.file)?));
        Ok(args)
    }
}

/// `pg_restore` in its three shapes: list mode, full restore, selective restore.
#[derive(Default)]
pub struct PgRestoreArgs<'a> {
    pub host: Option<(&'a str, u16)>,
    pub username: Option<&'a str>,
    pub database: Option<&'a str>,
    /// Adds `--clean --if-exists` so a restore is repeatable on an existing schema.
    pub clean: bool,
    pub use_list: Option<&'a str>,
    pub list_only: bool,
    pub archive: &'a str,
}

impl<'a> PgRestoreArgs<'a> {
    /// `pg_restore --list <archive>` to produce a manifest.
    pub fn list(archive: &'a str) -> Self {
        Self {
            list_only: true,
            archive,
            ..Default::default()
        }
    }

    /// Full restore against a remote server.
    pub fn restore(conn: &'a ConnectionDescriptor, archive: &'a str) -> Self {
        Self {
            host: Some((conn.host.as_str(), conn.port)),
            username: Some(conn.username.as_str()),
            database: Some(conn.database.as_str()),
            clean: true,
            archive,
            ..Default::default()
        }
    }

    /// Selective restore driven by an edited manifest, run inside a container.
    pub fn from_list(username: &'a str, database: &'a str, list: &'a str, archive: &'a str) -> Self {
        Self {
            username: Some(username),
            database: Some(database),
            use_list: Some(list),
            archive,
            ..Default::default()
        }
    }

    pub fn build(&self) -> Result<Vec<String>> {
        const TOOL: &str = "pg_restore";
        check(TOOL, "archive", self.archive)?;
        if self.list_only {
            return Ok(vec!["--list".to_string(), self.archive.to_string()]);
        }

        let mut args = Vec::new();
        if let Some((host, port)) = self.host {
            check(TOOL, "host", host)?;
            args.push(format!("--host={}", host));
            args.push(format!("--port={}", port));
        }
        let username = self.username.unwrap_or_default();
        check(TOOL, "username", username)?;
        args.push(format!("--username={}", username));
        let database = self.database.unwrap_or_default();
        check(TOOL, "database", database)?;
        args.push(format!("--dbname={}", database));

        args.extend(
            ["--verbose", "--no-owner", "--no-acl"]
                .into_iter()
                .map(String::from),
        );
        if self.clean {
            args.push("--clean".to_string());
            args.push("--if-exists".to_string());
        }
        if let Some(list) = self.use_list {
            check(TOOL, "list file", list)?;
            args.push(format!("--use-list={}", list));
        }
        args.push(self.archive.to_string());
        Ok(args)
    }
}

/// `psql` running one command.
pub struct PsqlArgs<'a> {
    pub conn: &'a ConnectionDescriptor,
    pub command: &'a str,
    /// `--tuples-only --no-align`: bare values for scalar queries.
    pub tuples_only: bool,
}

impl PsqlArgs<'_> {
    pub fn build(&self) -> Result<Vec<String>> {
        if self.command.trim().is_empty() {
            return Err(AppError::InvalidArgument {
                tool: "psql",
                reason: "command must not be empty".to_string(),
            });
        }
        let mut args = vec!["--no-psqlrc".to_string()];
        args.extend(connection_args("psql", self.conn)?);
        if self.tuples_only {
            args.push("--tuples-only".to_string());
            args.push("--no-align".to_string());
        }
        args.push(format!("--command={}", self.command));
        Ok(args)
    }
}

/// `docker` subcommands used by the sync pipeline.
pub enum DockerArgs<'a> {
    RemoveForce {
        container: &'a str,
    },
    Run {
        container: &'a str,
        /// Keys passed as bare `-e KEY`; the value comes from the overlay environment.
        env_passthrough: &'a [&'a str],
        env: &'a [(&'a str, &'a str)],
        host_port: u16,
        container_port: u16,
        volume: &'a str,
        mount_point: &'a str,
        image: &'a str,
    },
    Copy {
        source: &'a Path,
        container: &'a str,
        destination: &'a str,
    },
    Exec {
        container: &'a str,
        env_passthrough: &'a [&'a str],
        command: Vec<String>,
    },
}

impl DockerArgs<'_> {
    pub fn build(&self) -> Result<Vec<String>> {
        const TOOL: &str = "docker";
        match self {
            DockerArgs::RemoveForce { container } => {
                check(TOOL, "container", container)?;
                Ok(vec!["rm".into(), "-f".into(), container.to_string()])
            }
            DockerArgs::Run {
                container,
                env_passthrough,
                env,
                host_port,
                container_port,
                volume,
                mount_point,
                image,
            } => {
                check(TOOL, "container", container)?;
                check(TOOL, "volume", volume)?;
                check(TOOL, "image", image)?;
                let mut args = vec!["run".into(), "-d".into(), format!("--name={}", container)];
                for key in env_passthrough.iter() {
                    check(TOOL, "env key", key)?;
                    args.push("-e".into());
                    args.push(key.to_string());
                }
                for (key, value) in env.iter() {
                    check(TOOL, "env key", key)?;
                    check(TOOL, "env value", value)?;
                    args.push("-e".into());
                    args.push(format!("{}={}", key, value));
                }
                args.push("-p".into());
                args.push(format!("{}:{}", host_port, container_port));
                args.push("-v".into());
                args.push(format!("{}:{}", volume, mount_point));
                args.push(image.to_string());
                Ok(args)
            }
            DockerArgs::Copy {
                source,
                container,
                destination,
            } => {
                check(TOOL, "container", container)?;
                check(TOOL, "destination", destination)?;
                let source = path_str(TOOL, "source", source)?;
                Ok(vec![
                    "cp".into(),
                    source,
                    format!("{}:{}", container, destination),
                ])
            }
            DockerArgs::Exec {
                container,
                env_passthrough,
                command,
            } => {
                check(TOOL, "container", container)?;
                if command.is_empty() {
                    return Err(AppError::InvalidArgument {
                        tool: TOOL,
                        reason: "exec command must not be empty".to_string(),
                    });
                }
                let mut args = vec!["exec".into(), "-i".into()];
                for key in env_passthrough.iter() {
                    check(TOOL, "env key", key)?;
                    args.push("-e".into());
                    args.push(key.to_string());
                }
                args.push(container.to_string());
                args.extend(command.iter().cloned());
                Ok(args)
            }
        }
    }
}
