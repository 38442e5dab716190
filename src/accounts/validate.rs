//! Pre-flight checks for the account forms

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Field, ValidationError};
use crate::scripts::{trim_form, utf16_len};

/// Largest accepted avatar, in bytes
pub const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;

/// Accepted avatar content types
pub const AVATAR_CONTENT_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/gif"];

const MIN_USERNAME_LENGTH: usize = 3;
const MIN_PASSWORD_LENGTH: usize = 6;

static USERNAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("username pattern compiles"));

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

/// Whether `username` is long enough and uses only `[A-Za-z0-9_]`
pub fn is_valid_username(username: &str) -> bool {
    utf16_len(username) >= MIN_USERNAME_LENGTH && USERNAME_CHARS.is_match(username)
}

/// Registration username checks; returns the trimmed name
pub fn validate_username(username: &str) -> Result<&str, ValidationError> {
    let username = trim_form(username);
    if username.is_empty() {
        return Err(ValidationError::new(Field::Username, "Username is required."));
    }
    if utf16_len(username) < MIN_USERNAME_LENGTH {
        return Err(ValidationError::new(
            Field::Username,
            "Username must be at least 3 characters long.",
        ));
    }
    if !USERNAME_CHARS.is_match(username) {
        return Err(ValidationError::new(
            Field::Username,
            "Username can only contain letters, numbers, and underscores.",
        ));
    }
    Ok(username)
}

/// Profile rename check, reported as a single message
pub fn validate_new_username(username: &str) -> Result<&str, ValidationError> {
    let username = trim_form(username);
    if !is_valid_username(username) {
        return Err(ValidationError::new(
            Field::Username,
            "Username must be at least 3 characters and contain only letters, numbers, and underscores.",
        ));
    }
    Ok(username)
}

/// `local@domain.tld` with no whitespace and a single `@`
pub fn is_valid_email(email: &str) -> bool {
    EMAIL.is_match(email)
}

/// Registration email checks; returns the trimmed address
pub fn validate_email(email: &str) -> Result<&str, ValidationError> {
    let email = trim_form(email);
    if email.is_empty() {
        return Err(ValidationError::new(Field::Email, "Email is required."));
    }
    if !is_valid_email(email) {
        return Err(ValidationError::new(Field::Email, "Please enter a valid email address."));
    }
    Ok(email)
}

/// Registration password checks; the password is not trimmed
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::new(Field::Password, "Password is required."));
    }
    if utf16_len(password) < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::new(
            Field::Password,
            "Password must be at least 6 characters long.",
        ));
    }
    Ok(())
}

/// Login form checks
pub fn validate_login(email: &str, password: &str) -> Result<(), ValidationError> {
    if trim_form(email).is_empty() {
        return Err(ValidationError::new(Field::Email, "Please enter your email."));
    }
    if password.is_empty() {
        return Err(ValidationError::new(Field::Password, "Please enter your password."));
    }
    Ok(())
}

/// Avatar size and type checks
pub fn validate_avatar(size: usize, content_type: &str) -> Result<(), ValidationError> {
    if size > MAX_AVATAR_BYTES {
        return Err(ValidationError::new(
            Field::Avatar,
            "File is too large. Maximum size is 5MB.",
        ));
    }
    if !AVATAR_CONTENT_TYPES.contains(&content_type) {
        return Err(ValidationError::new(
            Field::Avatar,
            "Only JPEG, PNG, and GIF files are allowed.",
        ));
    }
    Ok(())
}
