//! Authentication and user management

mod session;
mod types;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use serde_json::json;
use tokio::sync::broadcast;

use crate::config::ClientOptions;
use crate::error::AuthError;
use crate::fetch::Fetch;

pub use session::*;
pub use types::*;

/// Capacity of the session change channel
const CHANGE_CHANNEL_CAPACITY: usize = 16;

/// Identity provider consumed by the account flows and the session controller
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Create an account and sign it in
    async fn create_account(&self, email: &str, password: &str) -> Result<User, AuthError>;

    /// Verify credentials and sign in
    async fn authenticate(&self, email: &str, password: &str) -> Result<User, AuthError>;

    /// Change display name and/or avatar of the signed-in user
    async fn update_profile(&self, user: &User, update: ProfileUpdate) -> Result<User, AuthError>;

    /// The signed-in user, if any
    fn current_user(&self) -> Option<User>;

    /// Session change notifications; `None` means signed out
    fn subscribe(&self) -> broadcast::Receiver<Option<User>>;

    /// End the current session
    async fn sign_out(&self) -> Result<(), AuthError>;
}

/// Extract `error.message` from a REST error body
pub(crate) fn backend_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.error.message)
}

/// REST client for the identity service
pub struct IdentityClient {
    endpoint: String,
    key: String,
    client: Client,
    session: SessionHandle,
    changes: broadcast::Sender<Option<User>>,
}

impl IdentityClient {
    /// Create a new identity client
    pub fn new(api_key: &str, client: Client, options: &ClientOptions) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            endpoint: options.identity_endpoint.clone(),
            key: api_key.to_string(),
            session: SessionHandle::with_refresher(TokenRefresher::new(
                &options.token_endpoint,
                api_key,
                client.clone(),
            )),
            client,
            changes,
        }
    }

    /// Handle shared with the store clients so they can send the ID token
    pub fn session_handle(&self) -> SessionHandle {
        self.session.clone()
    }

    /// Get the current session
    pub fn get_session(&self) -> Option<Session> {
        self.session.current()
    }

    fn accounts_url(&self, action: &str) -> String {
        format!("{}/accounts:{}", self.endpoint, action)
    }

    fn notify(&self, user: Option<User>) {
        if self.changes.send(user).is_err() {
            debug!("No session change subscribers");
        }
    }

    async fn token_request(&self, action: &str, email: &str, password: &str) -> Result<User, AuthError> {
        let url = self.accounts_url(action);

        let body = json!({
            "email": email,
            "password": password,
            "returnSecureToken": true,
        });

        let response = Fetch::post(&self.client, &url)
            .query("key", &self.key)
            .json(&body)?
            .execute::<TokenResponse>()
            .await?;

        let user = User {
            uid: response.local_id,
            email: response.email,
            display_name: response.display_name.filter(|name| !name.is_empty()),
            photo_url: response.profile_picture.filter(|url| !url.is_empty()),
        };
        let expires_in = response.expires_in.parse::<i64>().unwrap_or(3600);

        self.session.set(Session::new(
            response.id_token,
            response.refresh_token,
            expires_in,
            user.clone(),
        ));
        self.notify(Some(user.clone()));

        Ok(user)
    }

    /// Exchange the refresh token for a new ID token
    pub async fn refresh_session(&self) -> Result<Session, AuthError> {
        self.session.refresh().await
    }
}

#[async_trait]
impl IdentityService for IdentityClient {
    async fn create_account(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let user = self.token_request("signUp", email, password).await?;
        info!("Account created: {}", user.uid);
        Ok(user)
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let user = self.token_request("signInWithPassword", email, password).await?;
        info!("User logged in: {}", user.uid);
        Ok(user)
    }

    async fn update_profile(&self, user: &User, update: ProfileUpdate) -> Result<User, AuthError> {
        self.session.fresh_id_token().await;
        let session = self
            .session
            .current()
            .filter(|session| session.user.uid == user.uid)
            .ok_or(AuthError::MissingSession)?;

        let mut body = json!({
            "idToken": session.id_token,
            "returnSecureToken": false,
        });
        if let Some(name) = &update.display_name {
            body["displayName"] = json!(name);
        }
        if let Some(url) = &update.photo_url {
            body["photoUrl"] = json!(url);
        }

        let response = Fetch::post(&self.client, &self.accounts_url("update"))
            .query("key", &self.key)
            .json(&body)?
            .execute::<UpdateResponse>()
            .await?;

        let mut updated = session.user.clone();
        update.apply_to(&mut updated);
        updated.uid = response.local_id;
        if response.email.is_some() {
            updated.email = response.email;
        }
        if let Some(name) = response.display_name {
            updated.display_name = Some(name);
        }
        if let Some(url) = response.photo_url {
            updated.photo_url = Some(url);
        }

        self.session.update_user(updated.clone());
        self.notify(Some(updated.clone()));

        Ok(updated)
    }

    fn current_user(&self) -> Option<User> {
        self.session.user()
    }

    fn subscribe(&self) -> broadcast::Receiver<Option<User>> {
        self.changes.subscribe()
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if self.session.current().is_none() {
            return Err(AuthError::MissingSession);
        }
        self.session.clear();
        self.notify(None);
        info!("User logged out.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> IdentityClient {
        let options = ClientOptions::default()
            .with_identity_endpoint(&format!("{}/v1", server.uri()))
            .with_token_endpoint(&format!("{}/st/v1", server.uri()));
        IdentityClient::new("test_key", Client::new(), &options)
    }

    fn token_body() -> serde_json::Value {
        json!({
            "idToken": "test_id_token",
            "refreshToken": "test_refresh_token",
            "expiresIn": "3600",
            "localId": "test_user_id",
            "email": "test@example.com",
            "displayName": ""
        })
    }

    #[test]
    fn test_sign_up_stores_session_and_notifies() {
        tokio_test::block_on(async {
            let mock_server = MockServer::start().await;

            Mock::given(method("POST"))
                .and(path("/v1/accounts:signUp"))
                .and(query_param("key", "test_key"))
                .and(body_partial_json(json!({"email": "test@example.com", "returnSecureToken": true})))
                .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
                .mount(&mock_server)
                .await;

            let identity = client_for(&mock_server);
            let mut changes = identity.subscribe();

            let user = identity
                .create_account("test@example.com", "password123")
                .await
                .unwrap();

            assert_eq!(user.uid, "test_user_id");
            assert_eq!(user.display_name, None);
            assert_eq!(identity.session_handle().id_token().as_deref(), Some("test_id_token"));
            assert_eq!(changes.recv().await.unwrap(), Some(user));
        });
    }

    #[test]
    fn test_sign_in_error_maps_code() {
        tokio_test::block_on(async {
            let mock_server = MockServer::start().await;

            Mock::given(method("POST"))
                .and(path("/v1/accounts:signInWithPassword"))
                .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                    "error": {"code": 400, "message": "INVALID_LOGIN_CREDENTIALS", "errors": []}
                })))
                .mount(&mock_server)
                .await;

            let identity = client_for(&mock_server);
            let err = identity
                .authenticate("test@example.com", "nope")
                .await
                .unwrap_err();

            assert_eq!(err.code(), Some(&AuthErrorCode::InvalidCredentials));
            assert_eq!(err.user_message(), "Invalid email or password");
            assert!(identity.current_user().is_none());
        });
    }

    #[test]
    fn test_update_profile_sends_token_and_merges() {
        tokio_test::block_on(async {
            let mock_server = MockServer::start().await;

            Mock::given(method("POST"))
                .and(path("/v1/accounts:signInWithPassword"))
                .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
                .mount(&mock_server)
                .await;

            Mock::given(method("POST"))
                .and(path("/v1/accounts:update"))
                .and(body_partial_json(json!({"idToken": "test_id_token", "displayName": "alice"})))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "localId": "test_user_id",
                    "email": "test@example.com",
                    "displayName": "alice"
                })))
                .expect(1)
                .mount(&mock_server)
                .await;

            let identity = client_for(&mock_server);
            let user = identity.authenticate("test@example.com", "pw123456").await.unwrap();
            let updated = identity
                .update_profile(&user, ProfileUpdate::display_name("alice"))
                .await
                .unwrap();

            assert_eq!(updated.display_name.as_deref(), Some("alice"));
            assert_eq!(
                identity.current_user().unwrap().display_name.as_deref(),
                Some("alice")
            );
        });
    }

    #[test]
    fn test_refresh_session_replaces_tokens() {
        tokio_test::block_on(async {
            let mock_server = MockServer::start().await;

            Mock::given(method("POST"))
                .and(path("/v1/accounts:signInWithPassword"))
                .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
                .mount(&mock_server)
                .await;

            Mock::given(method("POST"))
                .and(path("/st/v1/token"))
                .and(body_partial_json(json!({"refresh_token": "test_refresh_token"})))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "id_token": "new_id_token",
                    "refresh_token": "new_refresh_token",
                    "expires_in": "3600",
                    "user_id": "test_user_id"
                })))
                .mount(&mock_server)
                .await;

            let identity = client_for(&mock_server);
            identity.authenticate("test@example.com", "pw123456").await.unwrap();
            let session = identity.refresh_session().await.unwrap();

            assert_eq!(session.id_token, "new_id_token");
            assert_eq!(identity.get_session().unwrap().refresh_token, "new_refresh_token");
        });
    }

    #[test]
    fn test_sign_out_without_session_fails() {
        tokio_test::block_on(async {
            let mock_server = MockServer::start().await;
            let identity = client_for(&mock_server);
            assert!(matches!(identity.sign_out().await, Err(AuthError::MissingSession)));
        });
    }
}
