//! Registration, local login, logout and the OAuth sign-in flows.
use axum::Router;
use axum::extract::{Form, Query, State};
use axum::response::{Html, Redirect};
use axum::routing::get;
use oauth2::CsrfToken;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::info;

use super::templates::{LoginPage, ProviderLinks, RegisterPage, render};
use super::{AppState, fail};
use crate::auth::session::{OAUTH_NONCE_KEY, log_in, log_out};
use crate::auth::{AuthError, Guest, authenticate, hash_password, oauth};
use crate::db::{DbService, NewUser, OAuthProvider, User};
use crate::error::AppError;
use crate::flash::{self, Level};
use crate::validation::{
    ValidationError, normalize_email, normalize_username, optional_text, validate_email,
    validate_password, validate_username,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", get(register_page).post(register))
        .route("/auth/login", get(login_page).post(login))
        .route("/auth/logout", get(logout))
        .route("/auth/google", get(google_login))
        .route("/auth/google/callback", get(google_callback))
        .route("/auth/github", get(github_login))
        .route("/auth/github/callback", get(github_callback))
}

/// Missing fields arrive empty and are reported by validation.
#[derive(Deserialize, Default)]
#[serde(default)]
pub struct RegisterForm {
    username: String,
    email: String,
    password: String,
    password2: String,
    full_name: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct LoginForm {
    username: String,
    password: String,
}

/// Query parameters of an OAuth provider callback
#[derive(Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

fn provider_links(state: &AppState) -> ProviderLinks {
    ProviderLinks {
        google: state.oauth.get(OAuthProvider::Google).is_some(),
        github: state.oauth.get(OAuthProvider::Github).is_some(),
    }
}

async fn register_page(
    guest: Guest,
    State(state): State<AppState>,
) -> Result<Html<String>, AppError> {
    render(&RegisterPage {
        layout: guest.layout("Register", "register").await,
        providers: provider_links(&state),
    })
}

async fn register(
    guest: Guest,
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Redirect {
    match register_user(&state.db_service, form).await {
        Ok(user) => {
            info!(user_id = user.id, username = %user.username, "Registered new user");
            flash::redirect(
                &guest.session,
                Level::Success,
                "Registration successful! Please log in.",
                "/auth/login",
            )
            .await
        },
        Err(e) => {
            fail(
                &guest.session,
                e,
                "Registration failed. Please try again.",
                "/auth/register",
            )
            .await
        },
    }
}

/// Create a local account. Nothing is written unless every check passes.
async fn register_user(db: &DbService, form: RegisterForm) -> Result<User, AppError> {
    if form.password != form.password2 {
        return Err(ValidationError::PasswordMismatch.into());
    }

    let username = normalize_username(&form.username);
    validate_username(&username)?;
    let email = normalize_email(&form.email);
    validate_email(&email)?;
    validate_password(&form.password)?;

    if db.find_user_by_username(&username).await?.is_some() {
        return Err(AppError::UsernameTaken);
    }
    if db.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::EmailTaken);
    }

    let password_hash = hash_password(form.password).await?;

    Ok(db
        .insert_user(&NewUser {
            username,
            email,
            password_hash: Some(password_hash),
            full_name: optional_text(form.full_name.as_deref()),
            oauth_provider: OAuthProvider::Local,
            oauth_id: None,
            profile_picture: None,
        })
        .await?)
}

async fn login_page(guest: Guest, State(state): State<AppState>) -> Result<Html<String>, AppError> {
    render(&LoginPage {
        layout: guest.layout("Login", "login").await,
        providers: provider_links(&state),
    })
}

async fn login(
    guest: Guest,
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Redirect {
    let result = match authenticate(&state.db_service, &form.username, &form.password).await {
        Ok(user) => log_in(&guest.session, &user)
            .await
            .map(|_| user)
            .map_err(AppError::from),
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(user) => {
            info!(user_id = user.id, "User logged in");
            flash::redirect(&guest.session, Level::Success, "Welcome back!", "/events").await
        },
        Err(e) => fail(&guest.session, e, "Login failed. Please try again.", "/auth/login").await,
    }
}

async fn logout(session: Session) -> Redirect {
    if let Err(e) = log_out(&session).await {
        return fail(&session, e.into(), "Failed to log out. Please try again.", "/events").await;
    }

    flash::redirect(&session, Level::Success, "You have been logged out", "/").await
}

async fn google_login(State(state): State<AppState>, session: Session) -> Redirect {
    start_oauth(OAuthProvider::Google, &state, &session).await
}

async fn google_callback(
    State(state): State<AppState>,
    session: Session,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    finish_oauth(OAuthProvider::Google, &state, &session, params).await
}

async fn github_login(State(state): State<AppState>, session: Session) -> Redirect {
    start_oauth(OAuthProvider::Github, &state, &session).await
}

async fn github_callback(
    State(state): State<AppState>,
    session: Session,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    finish_oauth(OAuthProvider::Github, &state, &session, params).await
}

/// Redirect to the provider's consent page.
///
/// The `state` parameter is a signed token naming the provider and a nonce. The nonce is kept in
/// the session, so a callback is only accepted by the browser that started the flow.
async fn start_oauth(provider: OAuthProvider, state: &AppState, session: &Session) -> Redirect {
    match authorization_url(provider, state, session).await {
        Ok(url) => Redirect::temporary(&url),
        Err(e) => {
            fail(session, e.into(), "Authentication failed. Please try again.", "/auth/login").await
        },
    }
}

async fn authorization_url(
    provider: OAuthProvider,
    state: &AppState,
    session: &Session,
) -> Result<String, AuthError> {
    let client = state
        .oauth
        .get(provider)
        .ok_or(AuthError::ProviderUnavailable(provider))?;

    let nonce = CsrfToken::new_random().secret().clone();
    session.insert(OAUTH_NONCE_KEY, &nonce).await?;
    let state_token = state.state_tokens.create_token(provider, &nonce)?;

    Ok(client.authorize_url(state_token))
}

async fn finish_oauth(
    provider: OAuthProvider,
    state: &AppState,
    session: &Session,
    params: CallbackParams,
) -> Redirect {
    let result = match complete_oauth(provider, state, session, params).await {
        Ok(user) => log_in(session, &user)
            .await
            .map(|_| user)
            .map_err(AppError::from),
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(user) => {
            info!(user_id = user.id, provider = %provider, "User logged in");
            flash::redirect(session, Level::Success, "Welcome back!", "/events").await
        },
        Err(e) => fail(session, e, "Authentication failed. Please try again.", "/auth/login").await,
    }
}

async fn complete_oauth(
    provider: OAuthProvider,
    state: &AppState,
    session: &Session,
    params: CallbackParams,
) -> Result<User, AuthError> {
    if let Some(error) = params.error {
        return Err(AuthError::Denied(error));
    }

    let client = state
        .oauth
        .get(provider)
        .ok_or(AuthError::ProviderUnavailable(provider))?;

    // The nonce is single use, a replayed callback finds nothing to compare against
    let expected_nonce: Option<String> = session.remove(OAUTH_NONCE_KEY).await?;
    let state_token = params.state.ok_or(AuthError::InvalidState)?;
    let claims = state
        .state_tokens
        .validate_token(&state_token, provider)
        .map_err(|_| AuthError::InvalidState)?;
    if expected_nonce.as_deref() != Some(claims.nonce.as_str()) {
        return Err(AuthError::InvalidState);
    }

    let code = params
        .code
        .ok_or_else(|| AuthError::Denied("missing authorization code".to_owned()))?;
    let access_token = client.exchange_code(code).await?;
    let profile = client.fetch_profile(&access_token).await?;

    oauth::resolve_account(&state.db_service, &profile).await
}
