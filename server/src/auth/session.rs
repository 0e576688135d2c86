//! Identity stored in the server-side session.
use tower_sessions::Session;
use tower_sessions::session;
use tracing::warn;

use crate::db::{DbService, User};
use crate::error::AppError;

/// Session key holding the signed-in user's id.
pub const USER_ID_KEY: &str = "user_id";
/// Session key holding the nonce of an OAuth flow in progress.
pub const OAUTH_NONCE_KEY: &str = "oauth_nonce";

/// Issues a fresh session id before storing the user, so a session id known before sign-in is
/// useless afterwards.
pub async fn log_in(session: &Session, user: &User) -> Result<(), session::Error> {
    session.cycle_id().await?;
    session.insert(USER_ID_KEY, user.id).await
}

pub async fn log_out(session: &Session) -> Result<(), session::Error> {
    session.remove::<i64>(USER_ID_KEY).await?;
    session.cycle_id().await
}

/// Resolve the signed-in user. A session pointing at a user that no longer exists is treated as
/// signed out.
pub async fn current_user(session: &Session, db: &DbService) -> Result<Option<User>, AppError> {
    let Some(user_id) = session.get::<i64>(USER_ID_KEY).await? else {
        return Ok(None);
    };

    let user = db.find_user_by_id(user_id).await?;
    if user.is_none() {
        warn!(user_id, "Session refers to an unknown user, signing out");
        session.remove::<i64>(USER_ID_KEY).await?;
    }

    Ok(user)
}
