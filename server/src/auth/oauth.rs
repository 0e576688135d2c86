use anyhow::Context;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope,
    TokenResponse, TokenUrl,
};
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::AuthError;
use super::types::{GitHubUserInfo, GoogleUserInfo, OAuthProfile};
use crate::db::{DbService, NewUser, OAuthProvider, User};
use crate::validation::{MIN_USERNAME_LEN, normalize_email, normalize_username};

const MAX_USERNAME_ATTEMPTS: u32 = 1000;

/// Client registration with a provider, read from `<PROVIDER>_CLIENT_ID`,
/// `<PROVIDER>_CLIENT_SECRET` and `<PROVIDER>_CALLBACK_URL`.
#[derive(Clone, Deserialize)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
}

impl OAuthCredentials {
    pub fn from_env(provider: OAuthProvider) -> Result<Self, envy::Error> {
        envy::prefixed(format!("{}_", provider.as_str().to_uppercase())).from_env()
    }
}

struct ProviderEndpoints {
    auth_url: &'static str,
    token_url: &'static str,
    userinfo_url: &'static str,
    scopes: &'static [&'static str],
}

fn endpoints(provider: OAuthProvider) -> Option<ProviderEndpoints> {
    match provider {
        OAuthProvider::Google => Some(ProviderEndpoints {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth",
            token_url: "https://oauth2.googleapis.com/token",
            userinfo_url: "https://openidconnect.googleapis.com/v1/userinfo",
            scopes: &["openid", "email", "profile"],
        }),
        OAuthProvider::Github => Some(ProviderEndpoints {
            auth_url: "https://github.com/login/oauth/authorize",
            token_url: "https://github.com/login/oauth/access_token",
            userinfo_url: "https://api.github.com/user",
            scopes: &["read:user", "user:email"],
        }),
        OAuthProvider::Local | OAuthProvider::Twitter => None,
    }
}

/// Authorization code flow against a single provider.
#[derive(Clone)]
pub struct OAuthClient {
    provider: OAuthProvider,
    client: BasicClient,
    http: reqwest::Client,
    userinfo_url: &'static str,
    scopes: &'static [&'static str],
}

impl OAuthClient {
    pub fn new(provider: OAuthProvider, credentials: &OAuthCredentials) -> anyhow::Result<Self> {
        let endpoints = endpoints(provider)
            .with_context(|| format!("{provider} sign-in is not supported"))?;

        let client = BasicClient::new(
            ClientId::new(credentials.client_id.clone()),
            Some(ClientSecret::new(credentials.client_secret.clone())),
            AuthUrl::new(endpoints.auth_url.to_string()).context("invalid auth URL")?,
            Some(TokenUrl::new(endpoints.token_url.to_string()).context("invalid token URL")?),
        )
        .set_redirect_uri(
            RedirectUrl::new(credentials.callback_url.clone())
                .with_context(|| format!("invalid callback URL {}", credentials.callback_url))?,
        );

        Ok(Self {
            provider,
            client,
            http: reqwest::Client::new(),
            userinfo_url: endpoints.userinfo_url,
            scopes: endpoints.scopes,
        })
    }

    pub fn provider(&self) -> OAuthProvider {
        self.provider
    }

    /// The provider's consent page, which will hand `state` back to the callback.
    pub fn authorize_url(&self, state: String) -> String {
        let (auth_url, _state) = self
            .client
            .authorize_url(move || CsrfToken::new(state))
            .add_scopes(self.scopes.iter().map(|s| Scope::new(s.to_string())))
            .url();

        auth_url.to_string()
    }

    /// Exchange an authorization code for an access token
    pub async fn exchange_code(&self, code: String) -> Result<String, AuthError> {
        let token_result = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .map_err(|e| AuthError::CodeExchange(e.to_string()))?;

        Ok(token_result.access_token().secret().clone())
    }

    pub async fn fetch_profile(&self, access_token: &str) -> Result<OAuthProfile, AuthError> {
        match self.provider {
            OAuthProvider::Google => {
                let info: GoogleUserInfo = self.fetch_userinfo(access_token).await?;
                OAuthProfile::try_from(info)
            },
            OAuthProvider::Github => {
                let info: GitHubUserInfo = self.fetch_userinfo(access_token).await?;
                Ok(info.into())
            },
            provider => Err(AuthError::ProviderUnavailable(provider)),
        }
    }

    async fn fetch_userinfo<T: DeserializeOwned>(&self, access_token: &str) -> Result<T, AuthError> {
        let response = self
            .http
            .get(self.userinfo_url)
            .bearer_auth(access_token)
            .header(USER_AGENT, "timely")
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::ProfileStatus(response.status()));
        }

        Ok(response.json::<T>().await?)
    }
}

/// The providers that are configured for this instance.
#[derive(Clone, Default)]
pub struct OAuthClients {
    google: Option<OAuthClient>,
    github: Option<OAuthClient>,
}

impl OAuthClients {
    /// Providers without credentials in the environment are skipped, so development setups run
    /// without any OAuth apps registered.
    pub fn from_env() -> Self {
        [OAuthProvider::Google, OAuthProvider::Github]
            .into_iter()
            .filter_map(Self::client_from_env)
            .fold(Self::default(), Self::with)
    }

    pub fn with(mut self, client: OAuthClient) -> Self {
        match client.provider() {
            OAuthProvider::Google => self.google = Some(client),
            OAuthProvider::Github => self.github = Some(client),
            provider => warn!("Ignoring client for unsupported provider {provider}"),
        }
        self
    }

    fn client_from_env(provider: OAuthProvider) -> Option<OAuthClient> {
        let client = OAuthCredentials::from_env(provider)
            .context("incomplete credentials")
            .and_then(|credentials| OAuthClient::new(provider, &credentials));

        match client {
            Ok(client) => {
                info!("{provider} sign-in enabled");
                Some(client)
            },
            Err(e) => {
                warn!(
                    "Skipping {provider} sign-in: {}",
                    e.chain()
                        .map(|e| e.to_string())
                        .collect::<Vec<_>>()
                        .join(": ")
                );
                None
            },
        }
    }

    pub fn get(&self, provider: OAuthProvider) -> Option<&OAuthClient> {
        match provider {
            OAuthProvider::Google => self.google.as_ref(),
            OAuthProvider::Github => self.github.as_ref(),
            OAuthProvider::Local | OAuthProvider::Twitter => None,
        }
    }
}

/// Find or create the account for a provider identity.
///
/// A known provider id signs into its account. Otherwise a local account with the same email is
/// linked to the provider, and only when neither exists a new account is created. An email that
/// already belongs to another provider's account is refused.
pub async fn resolve_account(db: &DbService, profile: &OAuthProfile) -> Result<User, AuthError> {
    if let Some(user) = db
        .find_user_by_oauth(profile.provider, &profile.provider_id)
        .await?
    {
        debug!(user_id = user.id, provider = %profile.provider, "Known provider identity");
        return Ok(user);
    }

    let email = normalize_email(&profile.email);

    if let Some(existing) = db.find_user_by_email(&email).await? {
        // Each account carries a single provider link, replacing it would orphan the old identity
        if !existing.is_local() {
            return Err(AuthError::AlreadyLinked(existing.oauth_provider));
        }

        info!(
            user_id = existing.id,
            provider = %profile.provider,
            "Linking provider identity to existing account"
        );
        let user = db
            .link_oauth(
                existing.id,
                profile.provider,
                &profile.provider_id,
                profile.picture.as_deref(),
            )
            .await?;
        return Ok(user);
    }

    let username = available_username(db, &profile.username_hint).await?;
    let user = db
        .insert_user(&NewUser {
            username,
            email,
            password_hash: None,
            full_name: profile.display_name.clone(),
            oauth_provider: profile.provider,
            oauth_id: Some(profile.provider_id.clone()),
            profile_picture: profile.picture.clone(),
        })
        .await?;

    info!(
        user_id = user.id,
        username = %user.username,
        provider = %profile.provider,
        "Created account from provider identity"
    );
    Ok(user)
}

fn username_base(hint: &str) -> String {
    let base: String = normalize_username(hint)
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    if base.is_empty() { "user".to_owned() } else { base }
}

fn username_candidate(base: &str, attempt: u32) -> String {
    if attempt == 0 {
        base.to_owned()
    } else {
        format!("{base}{attempt}")
    }
}

/// First free username derived from `hint` that is long enough to be valid.
async fn available_username(db: &DbService, hint: &str) -> Result<String, AuthError> {
    let base = username_base(hint);

    for attempt in 0..MAX_USERNAME_ATTEMPTS {
        let candidate = username_candidate(&base, attempt);
        if candidate.chars().count() < MIN_USERNAME_LEN {
            continue;
        }
        if !db.username_exists(&candidate).await? {
            return Ok(candidate);
        }
    }

    Err(AuthError::UsernameExhausted(base))
}
