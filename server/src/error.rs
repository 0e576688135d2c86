use askama::Template;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use crate::auth::{AuthError, PasswordError};
use crate::validation::ValidationError;
use crate::web::templates::ErrorPage;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Username already taken")]
    UsernameTaken,

    #[error("Email already registered")]
    EmailTaken,

    #[error("Event not found")]
    EventNotFound,

    #[error("Page not found")]
    PageNotFound,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("session layer is missing from the request")]
    MissingSession,

    #[error("failed to render template: {0}")]
    Template(#[from] askama::Error),
}

impl From<sqlx::Error> for AppError {
    /// Unique constraint violations on the user table surface as their own variants, so that a
    /// registration racing another one still gets a meaningful message.
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                let message = db_err.message();
                if message.contains("Users.username") {
                    return AppError::UsernameTaken;
                }
                if message.contains("Users.email") {
                    return AppError::EmailTaken;
                }
            }
        }
        AppError::Database(err)
    }
}

impl AppError {
    /// Whether the error was caused by the request contents rather than by the server.
    pub fn is_user_error(&self) -> bool {
        match self {
            AppError::Validation(_)
            | AppError::UsernameTaken
            | AppError::EmailTaken
            | AppError::EventNotFound
            | AppError::PageNotFound => true,
            AppError::Auth(e) => e.is_user_error(),
            _ => false,
        }
    }

    /// Text to flash for this error. Internal failures never leak their details, the caller's
    /// generic `fallback` is used instead.
    pub fn flash_text(&self, fallback: &str) -> String {
        match self {
            AppError::Auth(e) => e.flash_text(fallback),
            e if e.is_user_error() => e.to_string(),
            _ => fallback.to_owned(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::EventNotFound | AppError::PageNotFound => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::UsernameTaken | AppError::EmailTaken => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        let page = ErrorPage {
            title: format!("{} — Timely", status.canonical_reason().unwrap_or("Error")),
            status: status.as_u16(),
            message: self.flash_text("Something went wrong. Please try again later."),
        };

        match page.render() {
            Ok(body) => (status, Html(body)).into_response(),
            Err(e) => {
                error!(error = %e, "Failed to render error page");
                (status, page.message).into_response()
            },
        }
    }
}
