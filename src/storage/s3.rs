use ::s3::bucket::Bucket;
use ::s3::creds::Credentials;
use ::s3::error::S3Error;
use ::s3::Region;

use crate::error::{AppError, AppResult};

use super::StorageBackend;

/// Any S3-compatible endpoint, addressed path-style.
pub struct S3Backend {
    bucket: Box<Bucket>,
    bucket_name: String,
    public_base: String,
}

fn map_err(op: &str, key: &str, e: S3Error) -> AppError {
    match e {
        S3Error::HttpFailWithBody(404, _) => AppError::not_found(format!("object {}", key)),
        S3Error::HttpFailWithBody(code, body) if code >= 500 => {
            AppError::StorageUnavailable(format!("S3 {} failed ({}): {}", op, code, body))
        }
        other => AppError::Storage(format!("S3 {} failed: {}", op, other)),
    }
}

impl S3Backend {
    pub fn new(
        bucket_name: String,
        endpoint: String,
        region: String,
        access_key: String,
        secret_key: String,
        public_base: String,
    ) -> AppResult<Self> {
        let region = Region::Custom { region, endpoint };

        let credentials = Credentials::new(
            Some(&access_key),
            Some(&secret_key),
            None, // security token
            None, // session token
            None, // profile
        )
        .map_err(|e| AppError::Storage(format!("S3 credentials error: {}", e)))?;

        let bucket = Bucket::new(&bucket_name, region, credentials)
            .map_err(|e| AppError::Storage(format!("S3 bucket error: {}", e)))?
            .with_path_style();

        Ok(Self {
            bucket,
            bucket_name,
            public_base,
        })
    }
}

#[tonic::async_trait]
impl StorageBackend for S3Backend {
    async fn upload(&self, key: &str, data: &[u8], content_type: &str) -> AppResult<()> {
        self.bucket
            .put_object_with_content_type(key, data, content_type)
            .await
            .map_err(|e| map_err("upload", key, e))?;

        tracing::info!(
            "S3 upload: bucket={}, key={}, size={}",
            self.bucket_name,
            key,
            data.len()
        );
        Ok(())
    }

    async fn download(&self, key: &str) -> AppResult<Vec<u8>> {
        let response = self
            .bucket
            .get_object(key)
            .await
            .map_err(|e| map_err("download", key, e))?;

        tracing::debug!(
            "S3 download: bucket={}, key={}, size={}",
            self.bucket_name,
            key,
            response.bytes().len()
        );
        Ok(response.bytes().to_vec())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.bucket
            .delete_object(key)
            .await
            .map_err(|e| map_err("delete", key, e))?;

        tracing::info!("S3 delete: bucket={}, key={}", self.bucket_name, key);
        Ok(())
    }

    fn public_base(&self) -> &str {
        &self.public_base
    }

    fn bucket(&self) -> &str {
        &self.bucket_name
    }
}
