//! ScriptVault client library
//!
//! A client for a script-sharing service hosted on a managed backend. It covers
//! registration, login, profile and avatar management, and a per-user script
//! list with a validating upload pipeline. The backend is consumed through four
//! traits ([`IdentityService`](auth::IdentityService),
//! [`DocumentStore`](documents::DocumentStore), [`TreeStore`](database::TreeStore)
//! and [`BlobStore`](storage::BlobStore)) with REST and in-memory implementations.

pub mod accounts;
pub mod auth;
pub mod config;
pub mod database;
pub mod documents;
pub mod error;
pub mod fetch;
pub mod memory;
pub mod scripts;
pub mod session;
pub mod storage;

use reqwest::Client;
use std::sync::Arc;

use crate::accounts::AccountManager;
use crate::auth::{IdentityClient, IdentityService};
use crate::config::{BackendConfig, ClientOptions};
use crate::database::{RealtimeDbClient, TreeStore};
use crate::documents::{DocumentStore, FirestoreClient};
use crate::error::{Error, Result};
use crate::memory::{MemoryBlobs, MemoryDocuments, MemoryIdentity, MemoryTree};
use crate::scripts::{RawAccessPolicy, ScriptManager};
use crate::session::{SessionController, View};
use crate::storage::{BlobStore, StorageClient};

/// The four collaborators the flows run against
#[derive(Clone)]
pub struct Backends {
    pub identity: Arc<dyn IdentityService>,
    pub documents: Arc<dyn DocumentStore>,
    pub tree: Arc<dyn TreeStore>,
    pub blobs: Arc<dyn BlobStore>,
}

impl Backends {
    /// Fresh in-memory backends
    pub fn in_memory() -> Self {
        Self {
            identity: Arc::new(MemoryIdentity::new()),
            documents: Arc::new(MemoryDocuments::new()),
            tree: Arc::new(MemoryTree::new()),
            blobs: Arc::new(MemoryBlobs::new()),
        }
    }

    /// Account flows over these backends
    pub fn accounts(&self) -> AccountManager {
        AccountManager::new(
            self.identity.clone(),
            self.documents.clone(),
            self.tree.clone(),
            self.blobs.clone(),
        )
    }

    /// A script manager bound to `user`, outside of any session controller
    pub fn scripts_for(&self, user: auth::User, raw_access: RawAccessPolicy) -> ScriptManager {
        ScriptManager::new(user, self.tree.clone(), raw_access)
    }

    /// A controller that renders into `view`
    pub fn session_controller(&self, view: Arc<dyn View>, raw_access: RawAccessPolicy) -> SessionController {
        SessionController::new(view, self.tree.clone(), raw_access)
    }

    /// Apply the current session to `controller`, then follow changes
    /// until the identity service goes away
    pub async fn drive(&self, controller: &SessionController) {
        let changes = self.identity.subscribe();
        controller.on_session_change(self.identity.current_user()).await;
        controller.run(changes).await;
    }
}

/// The main entry point for the ScriptVault client
pub struct ScriptVault {
    /// Project settings
    pub config: BackendConfig,
    /// HTTP client shared by the REST adapters
    pub http_client: Client,
    /// Client options
    pub options: ClientOptions,
    identity: Arc<IdentityClient>,
    backends: Backends,
}

impl ScriptVault {
    /// Create a client for the project described by `config`
    ///
    /// # Example
    ///
    /// ```no_run
    /// use scriptvault::{ScriptVault, config::BackendConfig};
    ///
    /// let config = BackendConfig::from_env().unwrap();
    /// let vault = ScriptVault::new(config).unwrap();
    /// let accounts = vault.accounts();
    /// ```
    pub fn new(config: BackendConfig) -> Result<Self> {
        Self::new_with_options(config, ClientOptions::default())
    }

    /// Create a client with custom options
    ///
    /// Fails with [`Error::Config`] when the configuration is incomplete.
    pub fn new_with_options(config: BackendConfig, options: ClientOptions) -> Result<Self> {
        config.validate()?;

        let mut builder = Client::builder();
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        let identity = Arc::new(IdentityClient::new(&config.api_key, http_client.clone(), &options));
        let session = identity.session_handle();

        let backends = Backends {
            identity: identity.clone(),
            documents: Arc::new(FirestoreClient::new(
                &options.firestore_endpoint,
                &config.project_id,
                http_client.clone(),
                session.clone(),
            )),
            tree: Arc::new(RealtimeDbClient::new(
                &config.database_url,
                http_client.clone(),
                session.clone(),
            )),
            blobs: Arc::new(StorageClient::new(
                &options.storage_endpoint,
                &config.storage_bucket,
                http_client.clone(),
                session,
            )),
        };

        Ok(Self {
            config,
            http_client,
            options,
            identity,
            backends,
        })
    }

    /// The identity REST client, for session refresh and inspection
    pub fn identity(&self) -> &IdentityClient {
        &self.identity
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    pub fn accounts(&self) -> AccountManager {
        self.backends.accounts()
    }

    /// A script manager for `user` using the configured access policy
    pub fn scripts_for(&self, user: auth::User) -> ScriptManager {
        self.backends.scripts_for(user, self.options.raw_access.clone())
    }

    /// A controller rendering into `view` with the configured access policy
    pub fn session_controller(&self, view: Arc<dyn View>) -> SessionController {
        self.backends
            .session_controller(view, self.options.raw_access.clone())
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::accounts::{AccountManager, ProfileChange};
    pub use crate::auth::{IdentityService, User};
    pub use crate::config::{BackendConfig, ClientOptions};
    pub use crate::error::{Error, Result};
    pub use crate::scripts::{Clipboard, Language, RawAccessPolicy, ScriptDraft, ScriptRecord};
    pub use crate::session::{ProfileDisplay, SessionController, View};
    pub use crate::{Backends, ScriptVault};
}
