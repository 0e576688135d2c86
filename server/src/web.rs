use std::net::{SocketAddr, SocketAddrV4};
use std::path::Path;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::FromRef;
use axum::response::Redirect;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tower_sessions::cookie::SameSite;
use tower_sessions::cookie::time::Duration;
use tower_sessions::{Expiry, Session, SessionManagerLayer};
use tower_sessions_sqlx_store::SqliteStore;
use tracing::{debug, error, info};

use crate::auth::{OAuthClients, StateTokenService};
use crate::config::SessionConfig;
use crate::db::DbService;
use crate::error::AppError;
use crate::flash::{self, Level};

mod auth;
mod events;
pub mod templates;
mod users;

const SESSION_COOKIE: &str = "timely.sid";

#[derive(Clone)]
pub struct AppState {
    pub db_service: DbService,
    pub oauth: OAuthClients,
    pub state_tokens: StateTokenService,
}

// Lets the identity extractors reach the database
impl FromRef<AppState> for DbService {
    fn from_ref(state: &AppState) -> Self {
        state.db_service.clone()
    }
}

/// Cookie-keyed sessions persisted in SQLite.
///
/// `SameSite=Lax` is required for the OAuth callback, which arrives as a cross-site navigation
/// from the provider and must still carry the session cookie.
pub fn session_layer(store: SqliteStore, config: &SessionConfig) -> SessionManagerLayer<SqliteStore> {
    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE)
        .with_secure(config.secure_cookie)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(Duration::seconds(config.ttl_secs)))
}

/// Assemble all routes. Sessions wrap every route including the fallback, and request tracing
/// wraps everything.
pub fn router(
    state: AppState,
    sessions: SessionManagerLayer<SqliteStore>,
    static_dir: &Path,
) -> Router {
    Router::new()
        .route("/", get(index))
        .merge(auth::routes())
        .merge(events::routes())
        .merge(users::routes())
        .nest_service("/static", ServeDir::new(static_dir))
        .fallback(not_found)
        .layer(sessions)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Redirect {
    Redirect::to("/events")
}

async fn not_found() -> AppError {
    AppError::PageNotFound
}

/// Report a failed request to the user: log it, flash a message and redirect to `to`.
///
/// Internal errors are logged as such and shown as `fallback`, user errors are shown as is.
pub(crate) async fn fail(session: &Session, err: AppError, fallback: &str, to: &str) -> Redirect {
    if err.is_user_error() {
        debug!(error = %err, "Rejected request");
    } else {
        error!(error = %err, "{fallback}");
    }

    flash::redirect(session, Level::Error, err.flash_text(fallback), to).await
}

pub struct WebService {
    listener: TcpListener,
    router: Router,
}

impl WebService {
    pub async fn bind_to_address(socket: &SocketAddrV4, router: Router) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(socket)
            .await
            .context(format!("failed to bind to tcp socket at {socket}"))?;

        Ok(Self { listener, router })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        // If the call fails either the system ran out of resources or libc is broken, for both of
        // these cases a panic seems appropiate.
        self.listener
            .local_addr()
            .expect("getsockname should always succeed on a properly initialized listener")
    }

    pub async fn run(self, cancellation_token: CancellationToken) {
        if let Err(e) = axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                cancellation_token.cancelled().await;
                info!("Web service shutting down")
            })
            .await
        {
            error!(error = %e, "Failed to start web service");
            return;
        }

        info!("Web service shutdown gracefully")
    }
}
