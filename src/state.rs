use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde_json::Value;

use crate::config::{AppConfig, BlobBackend};
use crate::error::AppError;
use crate::repository::blob_store::{BlobStore, MemoryBlobStore, S3BlobStore};
use crate::repository::document_store::DocumentStore;
use crate::repository::memory::MemoryDocumentStore;
use crate::repository::postgres::PgDocumentStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn DocumentStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub http_client: reqwest::Client,
    /// `users/<sub>` profiles keyed by subject, read through by auth.
    pub staff_cache: Cache<String, Value>,
}

impl AppState {
    pub async fn build(config: AppConfig) -> Result<Self, AppError> {
        let store: Arc<dyn DocumentStore> = match config.database_url.as_deref() {
            Some(database_url) => Arc::new(PgDocumentStore::connect(&config, database_url).await?),
            None => {
                tracing::warn!("DATABASE_URL is not set; using the in-memory document store");
                Arc::new(MemoryDocumentStore::new())
            }
        };

        let blobs: Arc<dyn BlobStore> = match config.blob_backend {
            BlobBackend::Memory => Arc::new(MemoryBlobStore::new()),
            BlobBackend::S3 => {
                let bucket = config.s3_bucket.clone().ok_or_else(|| {
                    AppError::Internal("S3_BUCKET is required when BLOB_BACKEND=s3.".to_string())
                })?;
                Arc::new(
                    S3BlobStore::from_env(
                        bucket,
                        config.s3_public_base_url.clone(),
                        Duration::from_secs(config.s3_url_ttl_seconds),
                    )
                    .await,
                )
            }
        };

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|error| AppError::Internal(format!("Could not build HTTP client: {error}")))?;

        Ok(Self::from_parts(config, store, blobs, http_client))
    }

    #[cfg(test)]
    pub fn in_memory(config: AppConfig) -> Self {
        Self::from_parts(
            config,
            Arc::new(MemoryDocumentStore::new()),
            Arc::new(MemoryBlobStore::new()),
            reqwest::Client::new(),
        )
    }

    fn from_parts(
        config: AppConfig,
        store: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        http_client: reqwest::Client,
    ) -> Self {
        let staff_cache = Cache::builder()
            .max_capacity(config.staff_profile_cache_max_entries)
            .time_to_live(Duration::from_secs(config.staff_profile_cache_ttl_seconds))
            .build();

        Self {
            config: Arc::new(config),
            store,
            blobs,
            http_client,
            staff_cache,
        }
    }
}
