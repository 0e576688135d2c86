//! Field normalization and validation shared by registration, sign-in and the event forms.
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

pub const MIN_USERNAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 6;

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\S+@\S+\.\S+$").expect("email pattern is a valid regex"));

/// A user-correctable problem with submitted form data.
///
/// The display text is shown to the user verbatim as a flash message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Username is required")]
    UsernameRequired,
    #[error("Username must be at least 3 characters long")]
    UsernameTooShort,
    #[error("Email is required")]
    EmailRequired,
    #[error("Please enter a valid email address")]
    InvalidEmail,
    #[error("Password must be at least 6 characters long")]
    PasswordTooShort,
    #[error("Passwords do not match")]
    PasswordMismatch,
    #[error("Current password is incorrect")]
    CurrentPasswordIncorrect,
    #[error("New passwords do not match")]
    NewPasswordMismatch,
    #[error("New password must be at least 6 characters long")]
    NewPasswordTooShort,
    #[error("New password must be different from current password")]
    NewPasswordUnchanged,
    #[error("Event title is required")]
    TitleRequired,
    #[error("Event date is required")]
    DateRequired,
    #[error("Event date must be a valid date")]
    InvalidDate,
    #[error("Event location is required")]
    LocationRequired,
}

/// Usernames are compared and stored trimmed and lowercased.
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Expects an already normalized username.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.is_empty() {
        return Err(ValidationError::UsernameRequired);
    }
    if username.chars().count() < MIN_USERNAME_LEN {
        return Err(ValidationError::UsernameTooShort);
    }
    Ok(())
}

/// Expects an already normalized email.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() {
        return Err(ValidationError::EmailRequired);
    }
    if !EMAIL_PATTERN.is_match(email) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort);
    }
    Ok(())
}

/// Trims optional free text, mapping blank input to `None`.
pub fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}
