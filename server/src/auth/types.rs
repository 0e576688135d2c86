use serde::Deserialize;

use super::AuthError;
use crate::db::OAuthProvider;

/// Identity asserted by an OAuth provider, normalized across providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthProfile {
    pub provider: OAuthProvider,
    /// The provider's stable id for the account.
    pub provider_id: String,
    pub email: String,
    pub display_name: Option<String>,
    /// Starting point for the username of a newly created account.
    pub username_hint: String,
    pub picture: Option<String>,
}

/// Google user info from the OpenID Connect userinfo endpoint
#[derive(Debug, Deserialize)]
pub struct GoogleUserInfo {
    pub sub: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// GitHub user info from the REST API
#[derive(Debug, Deserialize)]
pub struct GitHubUserInfo {
    pub id: i64,
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

impl TryFrom<GoogleUserInfo> for OAuthProfile {
    type Error = AuthError;

    fn try_from(info: GoogleUserInfo) -> Result<Self, Self::Error> {
        let email = info
            .email
            .filter(|e| !e.trim().is_empty())
            .ok_or(AuthError::MissingEmail(OAuthProvider::Google))?;
        let username_hint = email.split('@').next().unwrap_or_default().to_owned();

        Ok(Self {
            provider: OAuthProvider::Google,
            provider_id: info.sub,
            email,
            display_name: info.name,
            username_hint,
            picture: info.picture,
        })
    }
}

impl From<GitHubUserInfo> for OAuthProfile {
    /// Users with a private email address get a placeholder derived from their login.
    fn from(info: GitHubUserInfo) -> Self {
        let email = info
            .email
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| format!("{}@github.com", info.login));

        Self {
            provider: OAuthProvider::Github,
            provider_id: info.id.to_string(),
            email,
            display_name: Some(info.name.unwrap_or_else(|| info.login.clone())),
            username_hint: info.login,
            picture: info.avatar_url,
        }
    }
}
