//! Error handling for the ScriptVault client

use std::fmt;
use thiserror::Error;

use crate::auth::AuthErrorCode;
use crate::fetch::FetchError;

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the ScriptVault client
#[derive(Error, Debug)]
pub enum Error {
    /// A form field failed pre-flight validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A store write or read failed; the operation is abandoned
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// The identity service rejected the request
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// The requester may not see the raw script content
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// No script with the given id is in the visible list
    #[error("Script not found: {0}")]
    NotFound(String),

    /// The operation needs a signed-in user
    #[error("Not signed in")]
    NotSignedIn,

    /// A submission is already in flight
    #[error("Another submission is still in progress")]
    Busy,

    /// Backend configuration is missing or invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a new configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new access denied error
    pub fn access_denied<T: fmt::Display>(msg: T) -> Self {
        Error::AccessDenied(msg.to_string())
    }

    /// Text suitable for an alert shown to the user
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation(err) => err.reason.clone(),
            Error::Auth(err) => err.user_message(),
            Error::Persistence(err) => format!("Upload failed: {}", err),
            other => other.to_string(),
        }
    }
}

/// Form fields that can fail validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Name,
    Content,
    Language,
    Username,
    Email,
    Password,
    Avatar,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Content => "content",
            Field::Language => "language",
            Field::Username => "username",
            Field::Email => "email",
            Field::Password => "password",
            Field::Avatar => "avatar",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single failed check; the first failure in a form wins
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct ValidationError {
    pub field: Field,
    pub reason: String,
}

impl ValidationError {
    pub fn new<T: Into<String>>(field: Field, reason: T) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors returned by the identity service
#[derive(Error, Debug)]
pub enum AuthError {
    /// The backend rejected the request with a known or unknown code
    #[error("{code}: {message}")]
    Api { code: AuthErrorCode, message: String },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("Missing session")]
    MissingSession,
}

impl AuthError {
    pub fn api<T: Into<String>>(code: AuthErrorCode, message: T) -> Self {
        AuthError::Api {
            code,
            message: message.into(),
        }
    }

    /// The taxonomy code, if the backend produced one
    pub fn code(&self) -> Option<&AuthErrorCode> {
        match self {
            AuthError::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Human-readable message for the code taxonomy
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Api { code, message } => code.user_message(message),
            AuthError::MissingSession => "You must be logged in".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<FetchError> for AuthError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Http(e) => AuthError::NetworkError(e),
            FetchError::Json(e) => AuthError::SerializationError(e),
            FetchError::Url(e) => AuthError::UrlParseError(e),
            FetchError::Status { body, .. } => {
                let message = crate::auth::backend_error_message(&body).unwrap_or(body);
                AuthError::api(AuthErrorCode::from_backend(&message), message)
            }
        }
    }
}

/// Errors returned by the document, tree and blob stores
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Store error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn new<T: fmt::Display>(message: T) -> Self {
        Self::Backend(message.to_string())
    }
}

impl From<FetchError> for StoreError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Http(e) => StoreError::NetworkError(e),
            FetchError::Json(e) => StoreError::SerializationError(e),
            FetchError::Url(e) => StoreError::UrlParseError(e),
            FetchError::Status { status, body } => StoreError::ApiError {
                status,
                message: body,
            },
        }
    }
}
