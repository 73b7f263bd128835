// Object storage abstraction for S3-compatible and GCS backends

pub mod gcs;
pub mod path;
pub mod s3;

use std::sync::Arc;

pub use gcs::GcsBackend;
pub use self::s3::S3Backend;

use crate::config::{StorageConfig, StorageKind};
use crate::error::{AppError, AppResult};

/// Bucket holding archive files.
pub const ARCHIVE_BUCKET: &str = "acervo-digital";
/// Bucket holding carousel images.
pub const CAROUSEL_BUCKET: &str = "hero-carousel";

/// One bucket of an object store.
#[tonic::async_trait]
pub trait StorageBackend: Send + Sync {
    async fn upload(&self, key: &str, data: &[u8], content_type: &str) -> AppResult<()>;

    async fn download(&self, key: &str) -> AppResult<Vec<u8>>;

    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Base that public URLs of this bucket start with, without the bucket name.
    fn public_base(&self) -> &str;

    fn bucket(&self) -> &str;

    fn public_url(&self, key: &str) -> String {
        path::public_url(self.public_base(), self.bucket(), key)
    }

    fn key_from_public_url(&self, url: &str) -> Option<String> {
        path::key_from_public_url(self.public_base(), self.bucket(), url)
    }
}

pub type SharedStorage = Arc<dyn StorageBackend>;

/// Opens `bucket` on the configured backend.
pub async fn connect(config: &StorageConfig, bucket: &str) -> AppResult<SharedStorage> {
    match config.kind {
        StorageKind::S3 => {
            let endpoint = config
                .s3_endpoint
                .clone()
                .ok_or_else(|| AppError::Internal("S3_ENDPOINT is not set".to_string()))?;
            let access_key = config
                .s3_access_key
                .clone()
                .ok_or_else(|| AppError::Internal("S3_ACCESS_KEY is not set".to_string()))?;
            let secret_key = config
                .s3_secret_key
                .clone()
                .ok_or_else(|| AppError::Internal("S3_SECRET_KEY is not set".to_string()))?;
            let public_base = config.public_url.clone().unwrap_or_else(|| endpoint.clone());
            let backend = S3Backend::new(
                bucket.to_string(),
                endpoint,
                config.s3_region.clone(),
                access_key,
                secret_key,
                public_base,
            )?;
            tracing::info!("Storage: S3 bucket={}", bucket);
            Ok(Arc::new(backend))
        }
        StorageKind::Gcs => {
            let public_base = config
                .public_url
                .clone()
                .unwrap_or_else(|| gcs::DEFAULT_PUBLIC_BASE.to_string());
            let backend = GcsBackend::new(bucket.to_string(), public_base).await?;
            tracing::info!("Storage: GCS bucket={}", bucket);
            Ok(Arc::new(backend))
        }
    }
}

/// Storage for every bucket the services use.
#[derive(Clone)]
pub struct Buckets {
    pub archive: SharedStorage,
    pub carousel: SharedStorage,
}

impl Buckets {
    pub async fn connect(config: &StorageConfig) -> AppResult<Self> {
        Ok(Self {
            archive: connect(config, ARCHIVE_BUCKET).await?,
            carousel: connect(config, CAROUSEL_BUCKET).await?,
        })
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use super::*;

    /// In-process bucket for tests.
    pub struct MemoryBackend {
        bucket: String,
        objects: Mutex<BTreeMap<String, Vec<u8>>>,
    }

    impl MemoryBackend {
        pub fn new(bucket: &str) -> Self {
            Self {
                bucket: bucket.to_string(),
                objects: Mutex::new(BTreeMap::new()),
            }
        }

        pub fn keys(&self) -> Vec<String> {
            self.objects.lock().unwrap().keys().cloned().collect()
        }
    }

    #[tonic::async_trait]
    impl StorageBackend for MemoryBackend {
        async fn upload(&self, key: &str, data: &[u8], _content_type: &str) -> AppResult<()> {
            self.objects.lock().unwrap().insert(key.to_string(), data.to_vec());
            Ok(())
        }

        async fn download(&self, key: &str) -> AppResult<Vec<u8>> {
            self.objects
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .ok_or_else(|| AppError::not_found(format!("object {}", key)))
        }

        async fn delete(&self, key: &str) -> AppResult<()> {
            self.objects.lock().unwrap().remove(key);
            Ok(())
        }

        fn public_base(&self) -> &str {
            "https://files.test"
        }

        fn bucket(&self) -> &str {
            &self.bucket
        }
    }
}
