//! Random share keys

/// A fresh `xxxxxxxx-xxxx-4xxx-yxxx-xxxxxxxxxxxx` token
///
/// Keys are not persisted or checked anywhere.
pub fn generate_key() -> String {
    uuid::Uuid::new_v4().hyphenated().to_string()
}
