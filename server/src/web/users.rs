use axum::Router;
use axum::extract::{Form, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use serde::Deserialize;
use tracing::info;

use super::templates::{ChangePasswordPage, render};
use super::{AppState, fail};
use crate::auth::{AuthUser, hash_password, verify_password};
use crate::db::{DbService, User};
use crate::error::AppError;
use crate::flash::{self, Level};
use crate::validation::{MIN_PASSWORD_LEN, ValidationError};

pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/users/change-password",
        get(change_password_page).post(change_password),
    )
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct ChangePasswordForm {
    current_password: String,
    new_password: String,
    confirm_password: String,
}

/// Accounts created through a provider have no password to change.
async fn reject_non_local(user: &AuthUser) -> Option<Redirect> {
    if user.is_local() {
        return None;
    }

    let message = format!(
        "Password change is only available for local accounts. You signed in with {}",
        user.oauth_provider.display_name()
    );
    Some(flash::redirect(&user.session, Level::Error, message, "/events").await)
}

async fn change_password_page(user: AuthUser) -> Response {
    if let Some(redirect) = reject_non_local(&user).await {
        return redirect.into_response();
    }

    render(&ChangePasswordPage {
        layout: user.layout("Change Password", "change-password").await,
    })
    .into_response()
}

async fn change_password(
    user: AuthUser,
    State(state): State<AppState>,
    Form(form): Form<ChangePasswordForm>,
) -> Redirect {
    if let Some(redirect) = reject_non_local(&user).await {
        return redirect;
    }

    match update_password(&state.db_service, &user, form).await {
        Ok(()) => {
            info!(user_id = user.id, "Changed password");
            flash::redirect(&user.session, Level::Success, "Password changed successfully!", "/events")
                .await
        },
        Err(e) => {
            fail(
                &user.session,
                e,
                "Failed to change password. Please try again.",
                "/users/change-password",
            )
            .await
        },
    }
}

/// Checks run in order and the first failure wins: the current password, the confirmation, the
/// length and finally that something actually changes.
async fn update_password(
    db: &DbService,
    user: &User,
    form: ChangePasswordForm,
) -> Result<(), AppError> {
    let current_hash = user.password_hash.clone().unwrap_or_default();
    if !verify_password(form.current_password.clone(), current_hash).await? {
        return Err(ValidationError::CurrentPasswordIncorrect.into());
    }
    if form.new_password != form.confirm_password {
        return Err(ValidationError::NewPasswordMismatch.into());
    }
    if form.new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::NewPasswordTooShort.into());
    }
    if form.new_password == form.current_password {
        return Err(ValidationError::NewPasswordUnchanged.into());
    }

    let password_hash = hash_password(form.new_password).await?;
    db.update_password(user.id, &password_hash).await?;

    Ok(())
}
