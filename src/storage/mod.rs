//! Storage operations for avatar uploads

mod types;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;

use crate::auth::SessionHandle;
use crate::error::StoreError;
use crate::fetch::{Fetch, FetchBuilder};

pub use types::*;

/// Byte storage returning retrievable references
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` at `path`
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<BlobRef, StoreError>;

    /// Public URL of an uploaded blob
    async fn download_url(&self, blob: &BlobRef) -> Result<String, StoreError>;
}

/// REST client for a storage bucket
pub struct StorageClient {
    endpoint: String,
    bucket: String,
    client: Client,
    session: SessionHandle,
}

impl StorageClient {
    /// Create a new StorageClient for `bucket`
    pub fn new(endpoint: &str, bucket: &str, client: Client, session: SessionHandle) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            client,
            session,
        }
    }

    fn objects_url(&self) -> String {
        format!("{}/b/{}/o", self.endpoint, self.bucket)
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/{}", self.objects_url(), urlencoding::encode(path))
    }

    async fn with_auth<'a>(&self, fetch: FetchBuilder<'a>) -> FetchBuilder<'a> {
        match self.session.fresh_id_token().await {
            Some(token) => fetch.header("Authorization", &format!("Firebase {}", token)),
            None => fetch,
        }
    }

    /// Fetch object metadata
    pub async fn metadata(&self, path: &str) -> Result<StorageObject, StoreError> {
        let url = self.object_url(path);
        let object = self
            .with_auth(Fetch::get(&self.client, &url)).await
            .execute::<StorageObject>()
            .await?;
        Ok(object)
    }
}

#[async_trait]
impl BlobStore for StorageClient {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<BlobRef, StoreError> {
        debug!("Uploading {} bytes to {}", bytes.len(), path);
        let url = self.objects_url();

        let object = self
            .with_auth(Fetch::post(&self.client, &url)).await
            .query("uploadType", "media")
            .query("name", path)
            .bytes(bytes, content_type)
            .execute::<StorageObject>()
            .await?;

        Ok(BlobRef {
            download_token: object.download_token(),
            path: object.name,
        })
    }

    async fn download_url(&self, blob: &BlobRef) -> Result<String, StoreError> {
        let token = match &blob.download_token {
            Some(token) => token.clone(),
            None => self
                .metadata(&blob.path)
                .await?
                .download_token()
                .ok_or_else(|| StoreError::UnexpectedResponse(format!("no download token for {}", blob.path)))?,
        };

        Ok(format!(
            "{}?alt=media&token={}",
            self.object_url(&blob.path),
            urlencoding::encode(&token)
        ))
    }
}
