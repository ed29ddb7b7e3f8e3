use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use tokio::sync::RwLock;

use crate::error::AppError;

/// Object storage collaborator (photos, income month blobs).
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    fn backend_tag(&self) -> &'static str {
        "unknown"
    }

    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), AppError>;

    /// `Ok(None)` when nothing is stored at `path`.
    async fn download(&self, path: &str) -> Result<Option<Vec<u8>>, AppError>;

    async fn download_url(&self, path: &str) -> Result<String, AppError>;
}

#[derive(Debug, Clone)]
struct StoredBlob {
    bytes: Vec<u8>,
    content_type: String,
}

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, StoredBlob>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn content_type(&self, path: &str) -> Option<String> {
        self.blobs
            .read()
            .await
            .get(path)
            .map(|blob| blob.content_type.clone())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), AppError> {
        let path = validate_path(path)?;
        self.blobs.write().await.insert(
            path.to_string(),
            StoredBlob {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn download(&self, path: &str) -> Result<Option<Vec<u8>>, AppError> {
        let path = validate_path(path)?;
        Ok(self
            .blobs
            .read()
            .await
            .get(path)
            .map(|blob| blob.bytes.clone()))
    }

    async fn download_url(&self, path: &str) -> Result<String, AppError> {
        let path = validate_path(path)?;
        if !self.blobs.read().await.contains_key(path) {
            return Err(AppError::NotFound(format!("Blob '{path}' not found.")));
        }
        Ok(format!("memory://{path}"))
    }
}

pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_base_url: Option<String>,
    url_ttl: Duration,
}

impl S3BlobStore {
    pub async fn from_env(
        bucket: String,
        public_base_url: Option<String>,
        url_ttl: Duration,
    ) -> Self {
        let shared = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self {
            client: aws_sdk_s3::Client::new(&shared),
            bucket,
            public_base_url: public_base_url
                .map(|base| base.trim_end_matches('/').to_string()),
            url_ttl,
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    fn backend_tag(&self) -> &'static str {
        "s3"
    }

    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), AppError> {
        let path = validate_path(path)?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|error| {
                AppError::Dependency(format!("Blob upload failed for '{path}': {error}"))
            })?;
        Ok(())
    }

    async fn download(&self, path: &str) -> Result<Option<Vec<u8>>, AppError> {
        let path = validate_path(path)?;
        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => {
                let service_error = error.into_service_error();
                if service_error.is_no_such_key() {
                    return Ok(None);
                }
                return Err(AppError::Dependency(format!(
                    "Blob download failed for '{path}': {service_error}"
                )));
            }
        };

        let bytes = response.body.collect().await.map_err(|error| {
            AppError::Dependency(format!("Blob read failed for '{path}': {error}"))
        })?;
        Ok(Some(bytes.into_bytes().to_vec()))
    }

    async fn download_url(&self, path: &str) -> Result<String, AppError> {
        let path = validate_path(path)?;
        if let Some(base) = &self.public_base_url {
            return Ok(format!("{base}/{path}"));
        }

        let presigning = PresigningConfig::expires_in(self.url_ttl)
            .map_err(|error| AppError::Internal(format!("Invalid presign TTL: {error}")))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .presigned(presigning)
            .await
            .map_err(|error| {
                AppError::Dependency(format!("Could not presign '{path}': {error}"))
            })?;
        Ok(request.uri().to_string())
    }
}

fn validate_path(path: &str) -> Result<&str, AppError> {
    let trimmed = path.trim().trim_start_matches('/');
    if trimmed.is_empty()
        || trimmed.split('/').any(|segment| segment.is_empty() || segment == "..")
    {
        return Err(AppError::BadRequest(format!("Invalid blob path '{path}'.")));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::{validate_path, BlobStore, MemoryBlobStore};

    #[test]
    fn rejects_traversal_and_empty_segments() {
        assert_eq!(validate_path("/moveouts/a/b.jpg").ok(), Some("moveouts/a/b.jpg"));
        assert!(validate_path("moveouts/../secret").is_err());
        assert!(validate_path("moveouts//b.jpg").is_err());
        assert!(validate_path("  ").is_err());
    }

    #[tokio::test]
    async fn memory_round_trip_and_urls() {
        let store = MemoryBlobStore::new();
        assert_eq!(store.download("acct_income_json/2025-01.json").await.ok(), Some(None));
        assert!(store.download_url("missing.jpg").await.is_err());

        store
            .upload("moveouts/m1/p.jpg", vec![1, 2, 3], "image/jpeg")
            .await
            .expect("upload");
        assert_eq!(
            store.download("moveouts/m1/p.jpg").await.expect("download"),
            Some(vec![1, 2, 3])
        );
        assert_eq!(
            store.download_url("moveouts/m1/p.jpg").await.expect("url"),
            "memory://moveouts/m1/p.jpg"
        );
        assert_eq!(
            store.content_type("moveouts/m1/p.jpg").await.as_deref(),
            Some("image/jpeg")
        );
    }
}
