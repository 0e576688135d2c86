mod local;
mod middleware;
pub mod oauth;
mod password;
pub mod session;
mod state;
mod types;

use thiserror::Error;

pub use local::authenticate;
pub use middleware::{AuthUser, Guest, PageContext};
pub use oauth::{OAuthClient, OAuthClients};
pub use password::{PasswordError, hash_password, verify_password};
pub use state::StateTokenService;
pub use types::OAuthProfile;

use crate::db::OAuthProvider;

/// Why a sign-in attempt did not produce a user.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Deliberately the same for unknown users and wrong passwords.
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("{0} sign-in is not available")]
    ProviderUnavailable(OAuthProvider),

    #[error("provider denied the sign-in request: {0}")]
    Denied(String),

    #[error("OAuth state is missing, expired or belongs to another session")]
    InvalidState,

    #[error("An account with this email already signs in with {0}")]
    AlreadyLinked(OAuthProvider),

    #[error("{0} did not share an email address")]
    MissingEmail(OAuthProvider),

    #[error("failed to sign OAuth state: {0}")]
    StateSigning(#[from] jsonwebtoken::errors::Error),

    #[error("failed to exchange authorization code: {0}")]
    CodeExchange(String),

    #[error("failed to fetch profile: {0}")]
    Profile(#[from] reqwest::Error),

    #[error("profile request returned {0}")]
    ProfileStatus(reqwest::StatusCode),

    #[error("no free username could be derived from {0:?}")]
    UsernameExhausted(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),
}

impl AuthError {
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidCredentials
                | AuthError::ProviderUnavailable(_)
                | AuthError::Denied(_)
                | AuthError::InvalidState
                | AuthError::AlreadyLinked(_)
                | AuthError::MissingEmail(_)
        )
    }

    pub fn flash_text(&self, fallback: &str) -> String {
        match self {
            AuthError::Denied(_) => "Sign-in was cancelled".to_owned(),
            AuthError::InvalidState => "Your sign-in request expired. Please try again.".to_owned(),
            e if e.is_user_error() => e.to_string(),
            _ => fallback.to_owned(),
        }
    }
}
