//! Registration, login and profile management

pub mod validate;

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::auth::{IdentityService, ProfileUpdate, User};
use crate::database::TreeStore;
use crate::documents::DocumentStore;
use crate::error::{Error, Field, Result, ValidationError};
use crate::scripts::trim_form;
use crate::storage::BlobStore;

use validate::*;

/// Document collection and tree path holding user entries
pub const USERS: &str = "users";

const USERNAME_TAKEN: &str = "This username is already in use. Please choose another.";

/// Tree path of the profile record of `uid`
pub fn profile_path(uid: &str) -> String {
    format!("{}/{}", USERS, uid)
}

/// Registration entry in the document store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDocument {
    pub uid: String,
    pub username: String,
    pub email: String,
    pub avatar_url: String,
    pub created_at: DateTime<Utc>,
}

/// Profile entry in the tree store at `users/{uid}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    pub uid: String,
    pub username: String,
    pub email: String,
    pub avatar_url: String,
    /// Epoch milliseconds
    pub updated_at: i64,
}

impl ProfileRecord {
    fn of(user: &User) -> Self {
        Self {
            uid: user.uid.clone(),
            username: user.display_name_or_empty().to_string(),
            email: user.email.clone().unwrap_or_default(),
            avatar_url: user.photo_url.clone().unwrap_or_default(),
            updated_at: Utc::now().timestamp_millis(),
        }
    }
}

/// Result of a profile rename
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileChange {
    /// The new name equals the current one; nothing was written
    Unchanged,
    Updated(User),
}

/// Account flows over the identity service and the stores
pub struct AccountManager {
    identity: Arc<dyn IdentityService>,
    documents: Arc<dyn DocumentStore>,
    tree: Arc<dyn TreeStore>,
    blobs: Arc<dyn BlobStore>,
}

impl AccountManager {
    pub fn new(
        identity: Arc<dyn IdentityService>,
        documents: Arc<dyn DocumentStore>,
        tree: Arc<dyn TreeStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            identity,
            documents,
            tree,
            blobs,
        }
    }

    fn current_user(&self) -> Result<User> {
        self.identity.current_user().ok_or(Error::NotSignedIn)
    }

    /// Whether a registration already uses `username` (exact, case-sensitive)
    ///
    /// Names that fail the username rules are never reported as taken.
    pub async fn is_username_taken(&self, username: &str) -> Result<bool> {
        if !is_valid_username(username) {
            return Ok(false);
        }
        let matches = self.documents.query_eq(USERS, "username", &json!(username)).await?;
        Ok(!matches.is_empty())
    }

    /// Create an account named `username`
    ///
    /// All form checks run before the first network call. The availability
    /// check and the account creation are not atomic.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<User> {
        let username = validate_username(username)?;
        let email = validate_email(email)?;
        validate_password(password)?;

        if self.is_username_taken(username).await? {
            return Err(ValidationError::new(Field::Username, USERNAME_TAKEN).into());
        }

        let user = self.identity.create_account(email, password).await?;
        let user = self
            .identity
            .update_profile(&user, ProfileUpdate::display_name(username))
            .await?;

        let document = UserDocument {
            uid: user.uid.clone(),
            username: username.to_string(),
            email: email.to_string(),
            avatar_url: user.photo_url.clone().unwrap_or_default(),
            created_at: Utc::now(),
        };
        let id = self
            .documents
            .insert(USERS, &serde_json::to_value(&document)?)
            .await
            .map_err(|err| {
                error!("Failed to store registration of {}: {}", user.uid, err);
                Error::from(err)
            })?;

        info!("Registered {} as {} ({})", user.uid, username, id);
        Ok(user)
    }

    /// Sign in with email and password
    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        validate_login(email, password)?;
        let user = self.identity.authenticate(trim_form(email), password).await?;
        Ok(user)
    }

    /// Rename the signed-in user
    pub async fn save_profile(&self, new_username: &str) -> Result<ProfileChange> {
        let user = self.current_user()?;
        let username = validate_new_username(new_username)?;

        let holders = self.tree.query_eq(USERS, "username", &json!(username)).await?;
        let own_name = holders
            .iter()
            .any(|(_, record)| record.get("uid").and_then(|uid| uid.as_str()) == Some(user.uid.as_str()));
        if !holders.is_empty() && !own_name {
            return Err(ValidationError::new(Field::Username, USERNAME_TAKEN).into());
        }

        if user.display_name.as_deref() == Some(username) {
            debug!("Profile of {} unchanged", user.uid);
            return Ok(ProfileChange::Unchanged);
        }

        let updated = self
            .identity
            .update_profile(&user, ProfileUpdate::display_name(username))
            .await?;
        self.tree
            .write(&profile_path(&updated.uid), &serde_json::to_value(ProfileRecord::of(&updated))?)
            .await?;

        info!("Profile of {} renamed to {}", updated.uid, username);
        Ok(ProfileChange::Updated(updated))
    }

    /// Upload a new avatar for the signed-in user and return its URL
    pub async fn upload_avatar(&self, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let user = self.current_user()?;
        validate_avatar(bytes.len(), content_type)?;

        let path = format!("avatars/{}_{}", user.uid, Utc::now().timestamp_millis());
        let blob = self.blobs.upload(&path, bytes, content_type).await?;
        let url = self.blobs.download_url(&blob).await?;

        let updated = self
            .identity
            .update_profile(&user, ProfileUpdate::photo_url(&url))
            .await?;
        self.tree
            .write(&profile_path(&updated.uid), &serde_json::to_value(ProfileRecord::of(&updated))?)
            .await?;

        info!("Avatar of {} stored at {}", updated.uid, path);
        Ok(url)
    }

    /// End the session
    pub async fn sign_out(&self) -> Result<()> {
        self.identity.sign_out().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryBlobs, MemoryDocuments, MemoryIdentity, MemoryTree};

    struct Fixture {
        identity: Arc<MemoryIdentity>,
        documents: Arc<MemoryDocuments>,
        tree: Arc<MemoryTree>,
        blobs: Arc<MemoryBlobs>,
        accounts: AccountManager,
    }

    fn fixture() -> Fixture {
        let identity = Arc::new(MemoryIdentity::new());
        let documents = Arc::new(MemoryDocuments::new());
        let tree = Arc::new(MemoryTree::new());
        let blobs = Arc::new(MemoryBlobs::new());
        let accounts = AccountManager::new(identity.clone(), documents.clone(), tree.clone(), blobs.clone());
        Fixture {
            identity,
            documents,
            tree,
            blobs,
            accounts,
        }
    }

    #[test]
    fn test_register_sets_display_name_and_inserts_document() {
        tokio_test::block_on(async {
            let f = fixture();
            let user = f.accounts.register(" alice ", "alice@example.com", "secret1").await.unwrap();

            assert_eq!(user.display_name.as_deref(), Some("alice"));
            let docs = f.documents.documents(USERS);
            assert_eq!(docs.len(), 1);
            assert_eq!(docs[0].fields["username"], "alice");
            assert_eq!(docs[0].fields["uid"], user.uid.as_str());
            assert_eq!(docs[0].fields["avatarUrl"], "");
        });
    }

    #[test]
    fn test_register_rejects_taken_username() {
        tokio_test::block_on(async {
            let f = fixture();
            f.accounts.register("alice", "a1@example.com", "secret1").await.unwrap();

            let err = f.accounts.register("alice", "a2@example.com", "secret1").await.unwrap_err();
            assert_eq!(err.user_message(), USERNAME_TAKEN);

            // case-sensitive
            assert!(f.accounts.register("Alice", "a3@example.com", "secret1").await.is_ok());
        });
    }

    #[test]
    fn test_register_preflight_makes_no_calls() {
        tokio_test::block_on(async {
            let f = fixture();
            let err = f.accounts.register("a b", "a@example.com", "secret1").await.unwrap_err();
            assert!(matches!(err, Error::Validation(ref v) if v.field == Field::Username));
            assert_eq!(f.documents.calls(), 0);
            assert_eq!(f.identity.calls(), 0);
        });
    }

    #[test]
    fn test_login_maps_wrong_password() {
        tokio_test::block_on(async {
            let f = fixture();
            f.accounts.register("alice", "alice@example.com", "secret1").await.unwrap();
            f.accounts.sign_out().await.unwrap();

            let err = f.accounts.login("alice@example.com", "nope123").await.unwrap_err();
            assert_eq!(err.user_message(), "Incorrect password.");
            assert!(f.identity.current_user().is_none());

            let user = f.accounts.login(" alice@example.com ", "secret1").await.unwrap();
            assert_eq!(user.display_name.as_deref(), Some("alice"));
        });
    }

    #[test]
    fn test_save_profile_unchanged_writes_nothing() {
        tokio_test::block_on(async {
            let f = fixture();
            f.accounts.register("alice", "alice@example.com", "secret1").await.unwrap();
            let calls = f.identity.calls();

            let change = f.accounts.save_profile("alice").await.unwrap();
            assert_eq!(change, ProfileChange::Unchanged);
            assert_eq!(f.identity.calls(), calls);
            assert!(f.tree.get("users").is_none());
        });
    }

    #[test]
    fn test_save_profile_writes_record() {
        tokio_test::block_on(async {
            let f = fixture();
            let user = f.accounts.register("alice", "alice@example.com", "secret1").await.unwrap();

            let change = f.accounts.save_profile("alice_2").await.unwrap();
            assert!(matches!(change, ProfileChange::Updated(ref u) if u.display_name.as_deref() == Some("alice_2")));

            let record = f.tree.get(&profile_path(&user.uid)).unwrap();
            assert_eq!(record["username"], "alice_2");
            assert_eq!(record["email"], "alice@example.com");
        });
    }

    #[test]
    fn test_save_profile_rejects_name_of_other_user() {
        tokio_test::block_on(async {
            let f = fixture();
            f.tree
                .write("users/other", &json!({"uid": "other", "username": "bob"}))
                .await
                .unwrap();
            f.accounts.register("alice", "alice@example.com", "secret1").await.unwrap();

            let err = f.accounts.save_profile("bob").await.unwrap_err();
            assert_eq!(err.user_message(), USERNAME_TAKEN);
        });
    }

    #[test]
    fn test_upload_avatar_updates_photo_and_record() {
        tokio_test::block_on(async {
            let f = fixture();
            let user = f.accounts.register("alice", "alice@example.com", "secret1").await.unwrap();

            let url = f.accounts.upload_avatar(vec![0x89, 0x50, 0x4e, 0x47], "image/png").await.unwrap();
            assert!(url.starts_with(&format!("memory://avatars/{}_", user.uid)));
            assert_eq!(f.identity.current_user().unwrap().photo_url.as_deref(), Some(url.as_str()));
            assert_eq!(f.tree.get(&profile_path(&user.uid)).unwrap()["avatarUrl"], url.as_str());
        });
    }

    #[test]
    fn test_upload_avatar_rejects_type_before_upload() {
        tokio_test::block_on(async {
            let f = fixture();
            f.accounts.register("alice", "alice@example.com", "secret1").await.unwrap();

            let err = f.accounts.upload_avatar(vec![0; 4], "image/webp").await.unwrap_err();
            assert!(matches!(err, Error::Validation(ref v) if v.field == Field::Avatar));
            assert_eq!(f.blobs.calls(), 0);
        });
    }

    #[test]
    fn test_profile_flows_need_a_session() {
        tokio_test::block_on(async {
            let f = fixture();
            assert!(matches!(f.accounts.save_profile("alice").await, Err(Error::NotSignedIn)));
            assert!(matches!(
                f.accounts.upload_avatar(vec![1], "image/png").await,
                Err(Error::NotSignedIn)
            ));
        });
    }
}
