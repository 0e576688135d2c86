use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tower_sessions::ExpiredDeletion;
use tower_sessions_sqlx_store::SqliteStore;
use tracing::{debug, info, warn};

use crate::auth::{OAuthClients, StateTokenService};
use crate::config::Config;
use crate::db::DbService;
use crate::web::{self, AppState, WebService};

const SESSION_CLEANUP_PERIOD: Duration = Duration::from_secs(60);

pub async fn start_services(config: Config) -> Result<()> {
    let db_service = DbService::new(&config.db_path)
        .await
        .context("attempted to create DB pool")?;

    let db_pool = db_service.pool.clone();

    let session_store = SqliteStore::new(db_pool.clone());
    session_store
        .migrate()
        .await
        .context("failed to create session table")?;

    let state = AppState {
        db_service,
        oauth: OAuthClients::from_env(),
        state_tokens: StateTokenService::new(config.state_secret()),
    };

    let sessions = web::session_layer(session_store.clone(), &config.session);
    let router = web::router(state, sessions, &config.static_dir);

    let web_service = WebService::bind_to_address(&config.web.address, router)
        .await
        .context("failed to start web service")?;

    // Use `bind_addr` instead of the `addr` + `port` given by the user, to ensure the printed
    // address is always correct (even for funny things like setting the port to 0).
    info!("Serving Timely on http://{}", web_service.bind_addr());

    let cancellation_token = CancellationToken::new();

    let web_handle = tokio::spawn(web_service.run(cancellation_token.clone()));
    let cleanup_handle = tokio::spawn(delete_expired_sessions(
        session_store,
        cancellation_token.clone(),
    ));

    let mut sigterm = signal(SignalKind::terminate()).context("failed to get sigterm handle")?;
    let mut sigint = signal(SignalKind::interrupt()).context("failed to get sigint handle")?;

    tokio::select! {
        biased;
        _ = sigterm.recv() => {
            info!("Received SIGTERM, gracefully shutting down");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, gracefully shutting down");
        }
    }

    cancellation_token.cancel();

    // Wait for the services to shutdown
    _ = tokio::join!(web_handle, cleanup_handle);

    db_pool.close().await;

    info!("Database service pool closed");
    info!("All services shutdown gracefully");

    Ok(())
}

async fn delete_expired_sessions(store: SqliteStore, cancellation_token: CancellationToken) {
    let mut interval = tokio::time::interval(SESSION_CLEANUP_PERIOD);

    loop {
        tokio::select! {
            _ = cancellation_token.cancelled() => break,
            _ = interval.tick() => {
                match store.delete_expired().await {
                    Ok(()) => debug!("Deleted expired sessions"),
                    Err(e) => warn!(error = %e, "Failed to delete expired sessions"),
                }
            }
        }
    }

    info!("Session cleanup shutdown gracefully");
}
