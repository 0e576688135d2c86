use std::future::Future;
use std::ops::Deref;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Redirect, Response};
use tower_sessions::Session;
use tracing::warn;

use super::session::current_user;
use crate::db::{DbService, User};
use crate::error::AppError;
use crate::flash::{self, Level};
use crate::web::templates::Layout;

/// Signed-in user extracted from the session. Anonymous requests are redirected to the login
/// page.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub session: Session,
}

impl AuthUser {
    pub async fn layout(&self, title: &str, page: &'static str) -> Layout {
        Layout::build(&self.session, Some(&self.user), title, page).await
    }
}

impl Deref for AuthUser {
    type Target = User;

    fn deref(&self) -> &User {
        &self.user
    }
}

/// Anonymous visitor. Signed-in users are redirected to the event list.
#[derive(Debug, Clone)]
pub struct Guest {
    pub session: Session,
}

impl Guest {
    pub async fn layout(&self, title: &str, page: &'static str) -> Layout {
        Layout::build(&self.session, None, title, page).await
    }
}

/// Any visitor, with the user if one is signed in.
#[derive(Debug, Clone)]
pub struct PageContext {
    pub user: Option<User>,
    pub session: Session,
}

impl PageContext {
    pub async fn layout(&self, title: &str, page: &'static str) -> Layout {
        Layout::build(&self.session, self.user.as_ref(), title, page).await
    }
}

fn session_from_parts(parts: &Parts) -> Result<Session, AuthRejection> {
    parts
        .extensions
        .get::<Session>()
        .cloned()
        .ok_or(AuthRejection::Internal(AppError::MissingSession))
}

impl<S> FromRequestParts<S> for PageContext
where
    S: Send + Sync,
    DbService: FromRef<S>,
{
    type Rejection = AuthRejection;

    fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let session = session_from_parts(parts);
        let db = DbService::from_ref(state);

        async move {
            let session = session?;
            let user = current_user(&session, &db).await?;

            Ok(PageContext { user, session })
        }
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    DbService: FromRef<S>,
{
    type Rejection = AuthRejection;

    fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let fut = PageContext::from_request_parts(parts, state);

        async move {
            let PageContext { user, session } = fut.await?;

            match user {
                Some(user) => Ok(AuthUser { user, session }),
                None => {
                    if let Err(e) =
                        flash::push(&session, Level::Error, "Please log in to access this page")
                            .await
                    {
                        warn!(error = %e, "Failed to store flash message");
                    }
                    Err(AuthRejection::LoginRequired)
                },
            }
        }
    }
}

impl<S> FromRequestParts<S> for Guest
where
    S: Send + Sync,
    DbService: FromRef<S>,
{
    type Rejection = AuthRejection;

    fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let fut = PageContext::from_request_parts(parts, state);

        async move {
            let PageContext { user, session } = fut.await?;

            if user.is_some() {
                return Err(AuthRejection::AlreadyAuthenticated);
            }

            Ok(Guest { session })
        }
    }
}

/// Why a request did not pass an identity guard
#[derive(Debug)]
pub enum AuthRejection {
    LoginRequired,
    AlreadyAuthenticated,
    Internal(AppError),
}

impl From<AppError> for AuthRejection {
    fn from(err: AppError) -> Self {
        AuthRejection::Internal(err)
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            AuthRejection::LoginRequired => Redirect::to("/auth/login").into_response(),
            AuthRejection::AlreadyAuthenticated => Redirect::to("/events").into_response(),
            AuthRejection::Internal(e) => e.into_response(),
        }
    }
}
