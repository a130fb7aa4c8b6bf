// pgmigrate/src/storage/s3.rs
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::config::Region;
use s3::error::DisplayErrorContext;
use s3::primitives::ByteStream;
use s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use std::collections::HashMap;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::info;

use super::BlobStore;
use crate::errors::{AppError, Result};

const DEFAULT_REGION: &str = "us-east-1";

/// S3-compatible object storage (AWS, DigitalOcean Spaces, MinIO).
///
/// Connection string keys: `Endpoint`, `Region`, `AccessKeyId`, `SecretAccessKey`,
/// and optionally `ForcePathStyle=true` for MinIO-style endpoints.
pub struct S3BlobStore {
    client: s3::Client,
    endpoint: Option<String>,
    region: String,
}

impl S3BlobStore {
    pub async fn connect(parts: &HashMap<String, String>) -> Result<Self> {
        let region = parts
            .get("region")
            .filter(|r| !r.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        let endpoint = parts.get("endpoint").filter(|e| !e.is_empty()).cloned();

        let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .region(Region::new(region.clone()));
        if let Some(endpoint) = &endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        match (parts.get("accesskeyid"), parts.get("secretaccesskey")) {
            (Some(key_id), Some(secret)) => {
                loader = loader.credentials_provider(s3::config::Credentials::new(
                    key_id, secret, None, None, "Static",
                ));
            }
            (None, None) => {}
            _ => {
                return Err(AppError::config(
                    "S3 connection string needs both AccessKeyId and SecretAccessKey",
                ));
            }
        }
        let sdk_config = loader.load().await;

        let force_path_style = parts
            .get("forcepathstyle")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        let config = s3::config::Builder::from(&sdk_config)
            .force_path_style(force_path_style)
            .build();

        Ok(Self {
            client: s3::Client::from_conf(config),
            endpoint,
            region,
        })
    }
}

fn sdk_error<E>(action: &str, target: &str, err: E) -> AppError
where
    E: std::error::Error,
{
    AppError::transfer(format!("{} {}: {}", action, target, DisplayErrorContext(err)))
}

/// Copies the object body into `file` chunk by chunk.
async fn stream_into(
    body: &mut ByteStream,
    file: std::fs::File,
    target: &str,
    destination: &Path,
) -> Result<u64> {
    let write_error = |e: std::io::Error| AppError::transfer(format!("failed to write {}: {}", destination.display(), e));
    let mut file = tokio::fs::File::from_std(file);
    let mut total_bytes: u64 = 0;
    while let Some(chunk) = body
        .try_next()
        .await
        .map_err(|e| sdk_error("Failed to read object body", target, e))?
    {
        file.write_all(&chunk).await.map_err(write_error)?;
        total_bytes += chunk.len() as u64;
    }
    file.flush().await.map_err(write_error)?;
    Ok(total_bytes)
}

#[async_trait]
impl BlobStore for S3BlobStore {
    fn describe(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => format!("S3 endpoint {} ({})", endpoint, self.region),
            None => format!("AWS S3 ({})", self.region),
        }
    }

    async fn container_exists(&self, container: &str) -> Result<bool> {
        match self.client.head_bucket().bucket(container).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                if err.as_service_error().is_some_and(|e| e.is_not_found()) {
                    Ok(false)
                } else {
                    Err(sdk_error("Failed to check bucket", container, err))
                }
            }
        }
    }

    async fn create_container_if_missing(&self, container: &str) -> Result<()> {
        if self.container_exists(container).await? {
            return Ok(());
        }
        info!(bucket = container, "Creating bucket");
        let mut request = self.client.create_bucket().bucket(container);
        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        request
            .send()
            .await
            .map_err(|e| sdk_error("Failed to create bucket", container, e))?;
        Ok(())
    }

    async fn exists(&self, container: &str, name: &str) -> Result<bool> {
        match self.client.head_object().bucket(container).key(name).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                if err.as_service_error().is_some_and(|e| e.is_not_found()) {
                    Ok(false)
                } else {
                    Err(sdk_error("Failed to check object", &format!("s3://{}/{}", container, name), err))
                }
            }
        }
    }

    async fn download_to(&self, container: &str, name: &str, destination: &Path) -> Result<u64> {
        let target = format!("s3://{}/{}", container, name);
        let mut object = self
            .client
            .get_object()
            .bucket(container)
            .key(name)
            .send()
            .await
            .map_err(|e| sdk_error("Failed to get object", &target, e))?;

        // Stream into a temp file beside the destination, then move it into place.
        let parent = destination
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let partial = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| AppError::transfer(format!("failed to create temp file in {}: {}", parent.display(), e)))?;

        let handle = partial
            .as_file()
            .try_clone()
            .map_err(|e| AppError::transfer(format!("failed to open {}: {}", partial.path().display(), e)))?;
        let total_bytes = stream_into(&mut object.body, handle, &target, destination).await?;
        partial
            .persist(destination)
            .map_err(|e| AppError::transfer(format!("failed to move download into {}: {}", destination.display(), e)))?;
        Ok(total_bytes)
    }

    async fn upload_from(&self, container: &str, name: &str, source: &Path, overwrite: bool) -> Result<()> {
        let target = format!("s3://{}/{}", container, name);
        if !overwrite && self.exists(container, name).await? {
            return Err(AppError::transfer(format!("{} already exists", target)));
        }
        let body = ByteStream::from_path(source)
            .await
            .map_err(|e| AppError::transfer(format!("failed to read {}: {}", source.display(), e)))?;
        self.client
            .put_object()
            .bucket(container)
            .key(name)
            .body(body)
            .send()
            .await
            .map_err(|e| sdk_error("Failed to upload", &target, e))?;
        Ok(())
    }

    async fn list_names(&self, container: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(container)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| sdk_error("Failed to list bucket", container, e))?;
            names.extend(page.contents().iter().filter_map(|o| o.key().map(String::from)));
            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }
        Ok(names)
    }

    async fn size(&self, container: &str, name: &str) -> Result<u64> {
        let target = format!("s3://{}/{}", container, name);
        let head = self
            .client
            .head_object()
            .bucket(container)
            .key(name)
            .send()
            .await
            .map_err(|e| sdk_error("Failed to read properties of", &target, e))?;
        let length = head.content_length().unwrap_or(0);
        u64::try_from(length).map_err(|_| AppError::transfer(format!("{} reported a negative size", target)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn body_is_streamed_into_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let partial = tempfile::NamedTempFile::new_in(dir.path()).unwrap();
        let mut body = ByteStream::from_static(b"quarterly report");

        let written = stream_into(
            &mut body,
            partial.as_file().try_clone().unwrap(),
            "s3://reports/q1.csv",
            partial.path(),
        )
        .await
        .unwrap();

        assert_eq!(written, 16);
        assert_eq!(std::fs::read(partial.path()).unwrap(), b"quarterly report".to_vec());
    }

    #[tokio::test]
    async fn empty_body_writes_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let partial = tempfile::NamedTempFile::new_in(dir.path()).unwrap();
        let mut body = ByteStream::from_static(b"");

        let written = stream_into(&mut body, partial.as_file().try_clone().unwrap(), "s3://b/k", partial.path())
            .await
            .unwrap();
        assert_eq!(written, 0);
        assert!(std::fs::read(partial.path()).unwrap().is_empty());
    }
}
