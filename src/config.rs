//! Configuration for the ScriptVault client

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::scripts::RawAccessPolicy;

/// Project settings of the managed backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    pub api_key: String,
    pub auth_domain: String,
    pub project_id: String,
    pub storage_bucket: String,
    pub messaging_sender_id: String,
    pub app_id: String,
    #[serde(rename = "databaseURL")]
    pub database_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement_id: Option<String>,
}

impl BackendConfig {
    /// Parse a JSON project config (the same shape the web console exports)
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read the config from `SCRIPTVAULT_*` environment variables
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| std::env::var(name).unwrap_or_default();

        let config = Self {
            api_key: var("SCRIPTVAULT_API_KEY"),
            auth_domain: var("SCRIPTVAULT_AUTH_DOMAIN"),
            project_id: var("SCRIPTVAULT_PROJECT_ID"),
            storage_bucket: var("SCRIPTVAULT_STORAGE_BUCKET"),
            messaging_sender_id: var("SCRIPTVAULT_MESSAGING_SENDER_ID"),
            app_id: var("SCRIPTVAULT_APP_ID"),
            database_url: var("SCRIPTVAULT_DATABASE_URL"),
            measurement_id: std::env::var("SCRIPTVAULT_MEASUREMENT_ID").ok(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Names of required fields that are empty or whitespace
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("apiKey", &self.api_key),
            ("authDomain", &self.auth_domain),
            ("projectId", &self.project_id),
            ("storageBucket", &self.storage_bucket),
            ("messagingSenderId", &self.messaging_sender_id),
            ("appId", &self.app_id),
            ("databaseURL", &self.database_url),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    /// Fail with every missing field listed
    pub fn validate(&self) -> Result<()> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            log::error!("Missing backend configuration fields: {:?}", missing);
            return Err(Error::config(format!(
                "configuration incomplete. Missing: {}",
                missing.join(", ")
            )));
        }
        url::Url::parse(&self.database_url)
            .map_err(|e| Error::config(format!("invalid databaseURL: {}", e)))?;
        Ok(())
    }
}

/// Client behaviour options
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// The request timeout
    pub request_timeout: Option<Duration>,

    /// Base URL of the identity REST API
    pub identity_endpoint: String,

    /// Base URL of the token refresh API
    pub token_endpoint: String,

    /// Base URL of the document REST API
    pub firestore_endpoint: String,

    /// Base URL of the blob REST API
    pub storage_endpoint: String,

    /// Who may read raw script content
    pub raw_access: RawAccessPolicy,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(30)),
            identity_endpoint: "https://identitytoolkit.googleapis.com/v1".to_string(),
            token_endpoint: "https://securetoken.googleapis.com/v1".to_string(),
            firestore_endpoint: "https://firestore.googleapis.com/v1".to_string(),
            storage_endpoint: "https://firebasestorage.googleapis.com/v0".to_string(),
            raw_access: RawAccessPolicy::OwnerOnly,
        }
    }
}

impl ClientOptions {
    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set the identity endpoint
    pub fn with_identity_endpoint(mut self, value: &str) -> Self {
        self.identity_endpoint = value.trim_end_matches('/').to_string();
        self
    }

    /// Set the token refresh endpoint
    pub fn with_token_endpoint(mut self, value: &str) -> Self {
        self.token_endpoint = value.trim_end_matches('/').to_string();
        self
    }

    /// Set the document store endpoint
    pub fn with_firestore_endpoint(mut self, value: &str) -> Self {
        self.firestore_endpoint = value.trim_end_matches('/').to_string();
        self
    }

    /// Set the blob store endpoint
    pub fn with_storage_endpoint(mut self, value: &str) -> Self {
        self.storage_endpoint = value.trim_end_matches('/').to_string();
        self
    }

    /// Set the raw content access policy
    pub fn with_raw_access(mut self, value: RawAccessPolicy) -> Self {
        self.raw_access = value;
        self
    }
}
