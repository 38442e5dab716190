//! Types for blob storage

use serde::{Deserialize, Serialize};

/// Reference to an uploaded blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    /// Object path within the bucket
    pub path: String,

    /// Access token for the download URL, when the upload returned one
    pub download_token: Option<String>,
}

impl BlobRef {
    pub fn new<T: Into<String>>(path: T) -> Self {
        Self {
            path: path.into(),
            download_token: None,
        }
    }
}

/// Object metadata returned by the storage API
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageObject {
    pub name: String,
    pub bucket: String,
    pub content_type: Option<String>,
    /// Byte size, sent as a string
    pub size: Option<String>,
    /// Comma-separated download tokens
    pub download_tokens: Option<String>,
}

impl StorageObject {
    /// The first download token, if any
    pub fn download_token(&self) -> Option<String> {
        self.download_tokens
            .as_deref()
            .and_then(|tokens| tokens.split(',').next())
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
    }
}
