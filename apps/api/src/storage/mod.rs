//! Object-storage collaborator. Production talks to the S3-compatible storage
//! endpoint of the hosted backend; objects are served from its public URL.
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use thiserror::Error;
use tracing::info;

pub mod upload;

#[derive(Debug, Error)]
#[error("upload of '{path}' failed: {message}")]
pub struct StorageError {
    pub path: String,
    pub message: String,
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(&self, path: &str, body: Bytes, content_type: &str)
        -> Result<(), StorageError>;

    fn public_url(&self, path: &str) -> String;
}

pub struct S3MediaStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_base_url: String,
}

impl S3MediaStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: String, public_base_url: &str) -> Self {
        Self {
            client,
            bucket,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl MediaStore for S3MediaStore {
    async fn upload(
        &self,
        path: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let size = body.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError {
                path: path.to_string(),
                message: e.to_string(),
            })?;

        info!("Uploaded {size} bytes to s3://{}/{}", self.bucket, path);
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_base_url, path)
    }
}
