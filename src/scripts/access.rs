//! Raw content access

use std::fmt;

use crate::auth::User;
use crate::error::{Error, Result};

use super::record::ScriptRecord;

/// Who may read a script's raw content
#[derive(Clone, Default, PartialEq, Eq)]
pub enum RawAccessPolicy {
    /// Only the script's owner
    #[default]
    OwnerOnly,
    /// Anyone presenting the shared secret
    SharedSecret(String),
    /// The owner, or anyone presenting the shared secret
    OwnerOrSecret(String),
}

impl fmt::Debug for RawAccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawAccessPolicy::OwnerOnly => f.write_str("OwnerOnly"),
            RawAccessPolicy::SharedSecret(_) => f.write_str("SharedSecret(..)"),
            RawAccessPolicy::OwnerOrSecret(_) => f.write_str("OwnerOrSecret(..)"),
        }
    }
}

impl RawAccessPolicy {
    /// Decide whether `requester` may read `record`
    pub fn authorize(&self, requester: &User, record: &ScriptRecord, secret: Option<&str>) -> Result<()> {
        let is_owner = requester.uid == record.user_id;
        let secret_matches = |expected: &str| secret.map_or(false, |given| given == expected);

        let granted = match self {
            RawAccessPolicy::OwnerOnly => is_owner,
            RawAccessPolicy::SharedSecret(expected) => secret_matches(expected),
            RawAccessPolicy::OwnerOrSecret(expected) => is_owner || secret_matches(expected),
        };

        if granted {
            Ok(())
        } else {
            Err(Error::access_denied(format!(
                "{} may not view script {}",
                requester.uid,
                record.id.as_deref().unwrap_or("(unsaved)")
            )))
        }
    }
}

/// System clipboard, implemented by the embedding application
pub trait Clipboard: Send + Sync {
    fn write_text(&self, text: &str) -> std::io::Result<()>;
}

/// Outcome of a granted raw view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawView {
    pub content: String,
    /// Whether the content reached the clipboard
    pub copied: bool,
}
