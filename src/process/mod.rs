//! Subprocess execution for external tools (`pg_dump`, `pg_restore`, `psql`, `docker`).
//!
//! Every invocation goes through [`CommandRunner`]. Secrets carried in the environment
//! overlay are redacted from the echoed command line, from captured output and from
//! failure details before anything is logged.

pub mod args;

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::errors::{AppError, Result};
use crate::utils::find_executable;
use crate::utils::masking::SecretMasker;

/// Environment keys that must never leak from the parent into a child that was not given them.
pub const SENSITIVE_ENV_KEYS: &[&str] = &["PGPASSWORD", "POSTGRES_PASSWORD"];

/// A single external command with its environment overlay and output handling.
#[derive(Clone)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    redirect_stdout: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            redirect_stdout: None,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs<I>(mut self, overlay: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.env.extend(overlay);
        self
    }

    /// Streams stdout into `path` unchanged instead of keeping it in memory.
    pub fn redirect_stdout(mut self, path: impl Into<PathBuf>) -> Self {
        self.redirect_stdout = Some(path.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn redirect_path(&self) -> Option<&Path> {
        self.redirect_stdout.as_deref()
    }

    /// Sensitive keys this invocation does not set; they are removed from the child.
    pub fn removed_env_keys(&self) -> Vec<&'static str> {
        SENSITIVE_ENV_KEYS
            .iter()
            .copied()
            .filter(|key| self.env_value(key).is_none())
            .collect()
    }

    pub fn masker(&self) -> SecretMasker {
        let overlay_secrets = self
            .env
            .iter()
            .filter(|(k, _)| SENSITIVE_ENV_KEYS.contains(&k.as_str()))
            .map(|(_, v)| v.clone());
        SecretMasker::new(overlay_secrets)
    }

    /// Masked `program arg arg ...` line for logs.
    pub fn echo(&self) -> String {
        let line = std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        self.masker().mask(&line).into_owned()
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = self.env.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("Invocation")
            .field("command", &self.echo())
            .field("env_keys", &keys)
            .field("redirect_stdout", &self.redirect_stdout)
            .finish()
    }
}

/// Captured, already-masked output of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Empty when stdout was redirected to a file.
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs the command to completion. Non-zero exit is returned as `ProcessFailure`.
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput>;
}

/// Runs commands with `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    default_timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(default_timeout: Option<Duration>) -> Self {
        Self { default_timeout }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        let masker = invocation.masker();
        info!(command = %invocation.echo(), "Running");

        let program_path = find_executable(&invocation.program)?;
        let mut command = Command::new(&program_path);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for key in invocation.removed_env_keys() {
            command.env_remove(key);
        }
        for (key, value) in &invocation.env {
            command.env(key, value);
        }

        let mut sink = match &invocation.redirect_stdout {
            Some(path) => Some(open_redirect(path).await.map_err(|e| {
                AppError::process(
                    &invocation.program,
                    format!("failed to open file for redirection '{}': {}", path.display(), e),
                )
            })?),
            None => None,
        };

        let mut child = command.spawn().map_err(|e| {
            AppError::process(&invocation.program, format!("failed to start: {}", e))
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::process(&invocation.program, "stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::process(&invocation.program, "stderr was not captured"))?;

        let collect = async {
            let read_stdout = async {
                let mut reader = BufReader::new(stdout);
                let mut captured = Vec::new();
                let mut line = Vec::new();
                while reader.read_until(b'\n', &mut line).await? > 0 {
                    match sink.as_mut() {
                        Some(writer) => writer.write_all(&line).await?,
                        None => captured.extend_from_slice(&line),
                    }
                    line.clear();
                }
                if let Some(writer) = sink.as_mut() {
                    writer.flush().await?;
                }
                Ok::<_, std::io::Error>(captured)
            };
            let read_stderr = async {
                let mut captured = Vec::new();
                BufReader::new(stderr).read_to_end(&mut captured).await?;
                Ok::<_, std::io::Error>(captured)
            };
            let (out, err) = tokio::try_join!(read_stdout, read_stderr)?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, out, err))
        };

        let limit = self.default_timeout;
        let finished = match limit {
            Some(limit) => tokio::time::timeout(limit, collect).await.ok(),
            None => Some(collect.await),
        };
        let Some(finished) = finished else {
            let _ = child.start_kill();
            let limit = limit.unwrap_or_default();
            error!(program = %invocation.program, timeout_secs = limit.as_secs_f64(), "Timed out");
            return Err(AppError::process(
                &invocation.program,
                format!("timed out after {:.1}s", limit.as_secs_f64()),
            ));
        };
        let (status, out, err) = finished.map_err(|e| {
            AppError::process(&invocation.program, format!("I/O error while running: {}", e))
        })?;

        // Tools print in the server encoding; only the logged copy is decoded.
        let stdout = masker.mask(String::from_utf8_lossy(&out).trim()).into_owned();
        let stderr = masker.mask(String::from_utf8_lossy(&err).trim()).into_owned();

        if let Some(path) = &invocation.redirect_stdout {
            debug!(path = %path.display(), "Output redirected");
        } else if !stdout.is_empty() {
            debug!(output = %stdout, "Output");
        }

        if !status.success() {
            let code = status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            let detail = if !stderr.is_empty() {
                stderr
            } else if !stdout.is_empty() {
                stdout
            } else {
                "No error details captured.".to_string()
            };
            error!(program = %invocation.program, exit_code = %code, detail = %detail, "Command failed");
            return Err(AppError::process(
                &invocation.program,
                format!("exit code {}: {}", code, detail),
            ));
        }

        if !stderr.is_empty() {
            warn!(program = %invocation.program, notices = %stderr, "Warnings/notices on stderr");
        }
        Ok(ProcessOutput { stdout, stderr })
    }
}

async fn open_redirect(path: &Path) -> std::io::Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(BufWriter::new(File::create(path).await?))
}
