//! Blob storage: the capability set the transfer engine needs, plus its backends.

pub(crate) mod filesystem;
pub(crate) mod s3;
pub(crate) mod transfer;

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;

use crate::errors::{AppError, Result};
use crate::utils::masking::Secret;

pub use filesystem::FilesystemBlobStore;
pub use s3::S3BlobStore;

/// Operations on a storage account. Containers are buckets (S3) or directories (filesystem).
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Human-readable account description, safe to log.
    fn describe(&self) -> String;

    async fn container_exists(&self, container: &str) -> Result<bool>;

    async fn create_container_if_missing(&self, container: &str) -> Result<()>;

    async fn exists(&self, container: &str, name: &str) -> Result<bool>;

    /// Writes the object to `destination`, returning the number of bytes written.
    async fn download_to(&self, container: &str, name: &str, destination: &Path) -> Result<u64>;

    async fn upload_from(&self, container: &str, name: &str, source: &Path, overwrite: bool) -> Result<()>;

    async fn list_names(&self, container: &str) -> Result<Vec<String>>;

    /// Content length in bytes.
    async fn size(&self, container: &str, name: &str) -> Result<u64>;
}

/// Account, container and optional object name.
#[derive(Debug, Clone)]
pub struct StorageLocation {
    pub connection_string: Secret,
    pub container: String,
    pub object: Option<String>,
}

impl StorageLocation {
    /// No object name, or a URL in its place, means "the whole container".
    pub fn is_whole_container(&self) -> bool {
        match self.object.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(name) => name.starts_with("http"),
        }
    }

    pub fn object_name(&self) -> Result<&str> {
        self.object
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                AppError::config(format!("no object name set for container '{}'", self.container))
            })
    }

    pub fn validate(&self, role: &str) -> Result<()> {
        if self.connection_string.is_blank() {
            return Err(AppError::config(format!("{} storage connection string", role)));
        }
        if self.container.trim().is_empty() {
            return Err(AppError::config(format!("{} storage container name", role)));
        }
        Ok(())
    }
}

/// Splits `Key=Value;Key=Value` into a map with lowercased keys.
pub fn parse_connection_string(connection_string: &str) -> Result<HashMap<String, String>> {
    let mut parts = HashMap::new();
    for segment in connection_string.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let (key, value) = segment.split_once('=').ok_or_else(|| {
            // The segment may hold a secret, so only its position is reported.
            AppError::config("malformed connection string segment (expected Key=Value)")
        })?;
        parts.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
    }
    if parts.is_empty() {
        return Err(AppError::config("connection string is empty"));
    }
    Ok(parts)
}

/// Opens the backend named by the connection string.
///
/// `LocalPath=<dir>` selects the filesystem backend; anything carrying
/// `AccessKeyId`/`SecretAccessKey` or `Endpoint` selects the S3 backend.
pub async fn open_store(connection_string: &Secret) -> Result<Box<dyn BlobStore>> {
    let parts = parse_connection_string(connection_string.expose())?;
    if let Some(root) = parts.get("localpath") {
        return Ok(Box::new(FilesystemBlobStore::new(root)));
    }
    if parts.contains_key("endpoint") || parts.contains_key("accesskeyid") {
        let store = S3BlobStore::connect(&parts).await?;
        return Ok(Box::new(store));
    }
    Err(AppError::config(
        "connection string names neither LocalPath nor an S3 Endpoint/AccessKeyId",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(object: Option<&str>) -> StorageLocation {
        StorageLocation {
            connection_string: Secret::new("LocalPath=/tmp"),
            container: "src".to_string(),
            object: object.map(String::from),
        }
    }

    #[test]
    fn whole_container_semantics() {
        assert!(location(None).is_whole_container());
        assert!(location(Some("  ")).is_whole_container());
        assert!(location(Some("https://acct.blob.core.windows.net/src")).is_whole_container());
        assert!(!location(Some("reports/2024.csv")).is_whole_container());
    }

    #[test]
    fn connection_string_keys_are_case_insensitive() {
        let parts =
            parse_connection_string("Endpoint=https://s3.local;Region=eu-west-1; AccessKeyId=abc ;").unwrap();
        assert_eq!(parts.get("endpoint").map(String::as_str), Some("https://s3.local"));
        assert_eq!(parts.get("region").map(String::as_str), Some("eu-west-1"));
        assert_eq!(parts.get("accesskeyid").map(String::as_str), Some("abc"));
    }

    #[test]
    fn connection_string_value_may_contain_equals() {
        let parts = parse_connection_string("SecretAccessKey=ab+c/d==").unwrap();
        assert_eq!(parts.get("secretaccesskey").map(String::as_str), Some("ab+c/d=="));
    }

    #[test]
    fn malformed_connection_string_does_not_echo_secret() {
        let err = parse_connection_string("Endpoint=x;hunter2").unwrap_err();
        assert!(!err.to_string().contains("hunter2"));
    }

    #[test]
    fn validate_reports_missing_container() {
        let mut loc = location(None);
        loc.container = String::new();
        assert_eq!(loc.validate("source").unwrap_err().exit_code(), 2);
    }

    #[tokio::test]
    async fn open_store_picks_filesystem_backend() {
        let dir = tempfile::tempdir().unwrap();
        let secret = Secret::new(format!("LocalPath={}", dir.path().display()));
        let store = open_store(&secret).await.unwrap();
        assert!(store.describe().contains(&dir.path().display().to_string()));
    }

    #[tokio::test]
    async fn open_store_rejects_unknown_backend() {
        let err = open_store(&Secret::new("AccountName=x")).await.err().unwrap();
        assert_eq!(err.exit_code(), 2);
    }
}
