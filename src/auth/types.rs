//! Types for authentication and user management

use serde::{Deserialize, Serialize};
use std::fmt;

/// A signed-in identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// The user ID
    pub uid: String,

    /// The user's email address
    pub email: Option<String>,

    /// Display name, used as the username
    pub display_name: Option<String>,

    /// Avatar URL
    pub photo_url: Option<String>,
}

impl User {
    pub fn new<T: Into<String>>(uid: T) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            display_name: None,
            photo_url: None,
        }
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn with_display_name(mut self, name: &str) -> Self {
        self.display_name = Some(name.to_string());
        self
    }

    pub fn with_photo_url(mut self, url: &str) -> Self {
        self.photo_url = Some(url.to_string());
        self
    }

    /// Display name, or an empty string if none was set
    pub fn display_name_or_empty(&self) -> &str {
        self.display_name.as_deref().unwrap_or("")
    }
}

/// Profile fields that can be changed on the identity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

impl ProfileUpdate {
    pub fn display_name(name: &str) -> Self {
        Self {
            display_name: Some(name.to_string()),
            photo_url: None,
        }
    }

    pub fn photo_url(url: &str) -> Self {
        Self {
            display_name: None,
            photo_url: Some(url.to_string()),
        }
    }

    /// Apply the update to a local copy of the user
    pub fn apply_to(&self, user: &mut User) {
        if let Some(name) = &self.display_name {
            user.display_name = Some(name.clone());
        }
        if let Some(url) = &self.photo_url {
            user.photo_url = Some(url.clone());
        }
    }
}

/// The identity service's error code taxonomy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthErrorCode {
    EmailAlreadyInUse,
    WeakPassword,
    InvalidEmail,
    InvalidCredentials,
    UserNotFound,
    WrongPassword,
    Other(String),
}

impl AuthErrorCode {
    /// Map a REST error message such as `EMAIL_EXISTS` or
    /// `WEAK_PASSWORD : Password should be at least 6 characters`
    pub fn from_backend(message: &str) -> Self {
        let code = message.split(':').next().unwrap_or("").trim();
        match code {
            "EMAIL_EXISTS" => Self::EmailAlreadyInUse,
            "WEAK_PASSWORD" => Self::WeakPassword,
            "INVALID_EMAIL" => Self::InvalidEmail,
            "INVALID_LOGIN_CREDENTIALS" => Self::InvalidCredentials,
            "EMAIL_NOT_FOUND" => Self::UserNotFound,
            "INVALID_PASSWORD" => Self::WrongPassword,
            _ => Self::from_code(code),
        }
    }

    /// Map a client-SDK style code, with or without the `auth/` prefix
    pub fn from_code(code: &str) -> Self {
        match code.trim_start_matches("auth/") {
            "email-already-in-use" => Self::EmailAlreadyInUse,
            "weak-password" => Self::WeakPassword,
            "invalid-email" => Self::InvalidEmail,
            "invalid-credentials" | "invalid-login-credentials" => Self::InvalidCredentials,
            "user-not-found" => Self::UserNotFound,
            "wrong-password" => Self::WrongPassword,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::EmailAlreadyInUse => "email-already-in-use",
            Self::WeakPassword => "weak-password",
            Self::InvalidEmail => "invalid-email",
            Self::InvalidCredentials => "invalid-credentials",
            Self::UserNotFound => "user-not-found",
            Self::WrongPassword => "wrong-password",
            Self::Other(code) => code,
        }
    }

    /// User-facing text; `fallback` is shown for unrecognized codes
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            Self::EmailAlreadyInUse => "Email already in use".to_string(),
            Self::WeakPassword => "Password too weak. Must be at least 6 characters".to_string(),
            Self::InvalidEmail => "Invalid email format".to_string(),
            Self::InvalidCredentials => "Invalid email or password".to_string(),
            Self::UserNotFound => "No user found with this email.".to_string(),
            Self::WrongPassword => "Incorrect password.".to_string(),
            Self::Other(_) if fallback.trim().is_empty() => "Authentication failed".to_string(),
            Self::Other(_) => fallback.to_string(),
        }
    }
}

impl fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response of `accounts:signUp` and `accounts:signInWithPassword`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TokenResponse {
    pub id_token: String,
    pub refresh_token: String,
    /// Seconds, sent as a string
    pub expires_in: String,
    pub local_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    #[serde(rename = "profilePicture")]
    pub profile_picture: Option<String>,
}

/// Response of `accounts:update`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateResponse {
    pub local_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

/// Response of the secure token refresh endpoint
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RefreshResponse {
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: String,
    pub user_id: String,
}

/// Error envelope of the REST API
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub message: String,
}
