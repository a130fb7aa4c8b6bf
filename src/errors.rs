use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// A required setting is absent. Raised before any side effect.
    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("{program} failed: {detail}")]
    ProcessFailure { program: String, detail: String },

    #[error("Transfer failed: {0}")]
    TransferFailure(String),

    #[error("Verification mismatch: {0}")]
    VerificationMismatch(String),

    #[error("Invalid argument for {tool}: {reason}")]
    InvalidArgument { tool: &'static str, reason: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigurationMissing(msg.into())
    }

    pub fn transfer(msg: impl Into<String>) -> Self {
        Self::TransferFailure(msg.into())
    }

    pub fn process(program: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ProcessFailure {
            program: program.into(),
            detail: detail.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for this failure class.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::ConfigurationMissing(_) => 2,
            AppError::ProcessFailure { .. } => 3,
            AppError::TransferFailure(_) => 4,
            AppError::VerificationMismatch(_) => 5,
            AppError::InvalidArgument { .. }
            | AppError::Io { .. }
            | AppError::SerdeJson(_)
            | AppError::Anyhow(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_failure_class() {
        assert_eq!(AppError::config("source.host").exit_code(), 2);
        assert_eq!(AppError::process("pg_dump", "boom").exit_code(), 3);
        assert_eq!(AppError::transfer("gone").exit_code(), 4);
        let io = AppError::io("/tmp/x", std::io::Error::other("denied"));
        assert_eq!(io.exit_code(), 1);
    }

    #[test]
    fn process_failure_message_names_the_program() {
        let err = AppError::process("pg_restore", "could not connect");
        assert_eq!(err.to_string(), "pg_restore failed: could not connect");
    }
}
