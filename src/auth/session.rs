//! Session management for authentication

use log::{debug, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;

use super::types::{RefreshResponse, User};
use crate::error::AuthError;
use crate::fetch::Fetch;

/// Session data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// The ID token sent to the stores
    pub id_token: String,

    /// The refresh token
    pub refresh_token: String,

    /// The expiry timestamp (epoch seconds)
    pub expires_at: i64,

    /// The signed-in user
    pub user: User,
}

impl Session {
    /// Create a new session expiring `expires_in` seconds from now
    pub fn new(id_token: String, refresh_token: String, expires_in: i64, user: User) -> Self {
        Self {
            id_token,
            refresh_token,
            expires_at: chrono::Utc::now().timestamp() + expires_in,
            user,
        }
    }

    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        chrono::Utc::now().timestamp() >= self.expires_at
    }
}

/// Exchanges a refresh token at the secure token endpoint
#[derive(Debug, Clone)]
pub(crate) struct TokenRefresher {
    url: String,
    key: String,
    client: Client,
}

impl TokenRefresher {
    pub(crate) fn new(token_endpoint: &str, key: &str, client: Client) -> Self {
        Self {
            url: format!("{}/token", token_endpoint),
            key: key.to_string(),
            client,
        }
    }

    async fn exchange(&self, current: &Session) -> Result<Session, AuthError> {
        let body = json!({
            "grant_type": "refresh_token",
            "refresh_token": current.refresh_token,
        });

        let response = Fetch::post(&self.client, &self.url)
            .query("key", &self.key)
            .json(&body)?
            .execute::<RefreshResponse>()
            .await?;

        if response.user_id != current.user.uid {
            return Err(AuthError::MissingSession);
        }

        let expires_in = response.expires_in.parse::<i64>().unwrap_or(3600);
        Ok(Session::new(
            response.id_token,
            response.refresh_token,
            expires_in,
            current.user.clone(),
        ))
    }
}

/// Shared slot holding the current session
///
/// The identity client writes it; the store clients read the token from it
/// and, when a refresher is installed, renew an expired token first.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    inner: Arc<RwLock<Option<Session>>>,
    refresher: Option<TokenRefresher>,
    refreshing: Arc<Mutex<()>>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_refresher(refresher: TokenRefresher) -> Self {
        Self {
            refresher: Some(refresher),
            ..Self::default()
        }
    }

    /// Exchange the refresh token now and store the new session
    ///
    /// The result is dropped if the session was replaced or cleared while the
    /// exchange was in flight.
    pub async fn refresh(&self) -> Result<Session, AuthError> {
        let refresher = self.refresher.as_ref().ok_or(AuthError::MissingSession)?;
        let current = self.current().ok_or(AuthError::MissingSession)?;
        let session = refresher.exchange(&current).await?;

        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let unchanged = guard
            .as_ref()
            .is_some_and(|slot| slot.refresh_token == current.refresh_token);
        if !unchanged {
            return Err(AuthError::MissingSession);
        }
        *guard = Some(session.clone());
        debug!("Session refreshed for {}", session.user.uid);
        Ok(session)
    }

    /// The ID token, renewed first if it has expired
    ///
    /// A failed renewal is logged and the stale token returned, so the
    /// backend's rejection reaches the caller.
    pub async fn fresh_id_token(&self) -> Option<String> {
        let session = self.current()?;
        if !session.is_expired() || self.refresher.is_none() {
            return Some(session.id_token);
        }

        let _refreshing = self.refreshing.lock().await;
        // another caller may have renewed it while we waited
        let session = self.current()?;
        if !session.is_expired() {
            return Some(session.id_token);
        }

        match self.refresh().await {
            Ok(renewed) => Some(renewed.id_token),
            Err(e) => {
                warn!("Token refresh failed: {}", e);
                Some(session.id_token)
            }
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn user(&self) -> Option<User> {
        self.current().map(|session| session.user)
    }

    pub fn id_token(&self) -> Option<String> {
        self.current().map(|session| session.id_token)
    }

    pub fn set(&self, session: Session) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
    }

    /// Replace the user of the current session, if any
    pub fn update_user(&self, user: User) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = guard.as_mut() {
            session.user = user;
        }
    }

    pub fn clear(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
