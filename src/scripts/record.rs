//! Script records and the upload form

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::auth::User;
use crate::error::{Field, ValidationError};

use super::hash::script_hash;

/// Username stored when the identity has no display name
pub const UNKNOWN_USER: &str = "Unknown User";

/// Minimum script name length
pub const MIN_NAME_LENGTH: usize = 3;

/// Length in UTF-16 code units, the unit stored records are measured in
pub fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

/// Whitespace as the web client's `trim` and `\s` see it: Unicode White_Space
/// without U+0085, plus the byte order mark U+FEFF
pub fn is_form_whitespace(c: char) -> bool {
    c == '\u{FEFF}' || (c.is_whitespace() && c != '\u{0085}')
}

/// Trim form input the way the web client does
pub fn trim_form(s: &str) -> &str {
    s.trim_matches(is_form_whitespace)
}

/// Supported script languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Javascript,
    Lua,
    Bash,
    Powershell,
    Batch,
    Other,
}

impl Language {
    pub const ALL: [Language; 7] = [
        Language::Python,
        Language::Javascript,
        Language::Lua,
        Language::Bash,
        Language::Powershell,
        Language::Batch,
        Language::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Javascript => "javascript",
            Language::Lua => "lua",
            Language::Bash => "bash",
            Language::Powershell => "powershell",
            Language::Batch => "batch",
            Language::Other => "other",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = trim_form(s).to_ascii_lowercase();
        Language::ALL
            .into_iter()
            .find(|language| language.as_str() == wanted)
            .ok_or_else(|| ValidationError::new(Field::Language, "Please select a script language"))
    }
}

/// Counts derived from the content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptMetadata {
    pub content_lines: u64,
    pub content_words: u64,
    pub content_characters: u64,
}

impl ScriptMetadata {
    pub fn of(content: &str) -> Self {
        Self {
            content_lines: content.split('\n').count() as u64,
            content_words: content
                .split(is_form_whitespace)
                .filter(|word| !word.is_empty())
                .count() as u64,
            content_characters: utf16_len(content) as u64,
        }
    }
}

/// A stored script
///
/// `id` is the key the tree store generated for the record. It is never part
/// of the stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRecord {
    #[serde(default, skip_serializing)]
    pub id: Option<String>,
    pub name: String,
    pub content: String,
    pub language: Language,
    pub user_id: String,
    pub username: String,
    /// Epoch milliseconds
    pub timestamp: i64,
    pub size: u64,
    pub hash: String,
    pub metadata: ScriptMetadata,
}

impl ScriptRecord {
    /// Build an unsaved record for `owner` from validated input
    pub fn derive(draft: &ValidDraft, owner: &User, timestamp: i64) -> Self {
        let content = draft.content.clone();
        Self {
            id: None,
            name: draft.name.clone(),
            size: utf16_len(&content) as u64,
            hash: script_hash(&content),
            metadata: ScriptMetadata::of(&content),
            content,
            language: draft.language,
            user_id: owner.uid.clone(),
            username: owner
                .display_name
                .clone()
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| UNKNOWN_USER.to_string()),
            timestamp,
        }
    }

    pub fn with_id<T: Into<String>>(mut self, id: T) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Raw upload form input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptDraft {
    pub name: String,
    pub content: String,
    /// Selected language; empty when nothing was selected
    pub language: String,
}

/// Draft that passed validation, with name and content trimmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidDraft {
    pub name: String,
    pub content: String,
    pub language: Language,
}

impl ScriptDraft {
    pub fn new(name: &str, content: &str, language: &str) -> Self {
        Self {
            name: name.to_string(),
            content: content.to_string(),
            language: language.to_string(),
        }
    }

    /// Check name, content and language in that order; the first failure wins
    pub fn validate(&self) -> Result<ValidDraft, ValidationError> {
        let name = trim_form(&self.name);
        if utf16_len(name) < MIN_NAME_LENGTH {
            return Err(ValidationError::new(
                Field::Name,
                "Script name must be at least 3 characters long",
            ));
        }

        let content = trim_form(&self.content);
        if content.is_empty() {
            return Err(ValidationError::new(Field::Content, "Please enter script content"));
        }

        let language = self.language.parse::<Language>()?;

        Ok(ValidDraft {
            name: name.to_string(),
            content: content.to_string(),
            language,
        })
    }
}
