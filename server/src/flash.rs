//! One-time notices carried in the session to the next rendered page.
use axum::response::Redirect;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tower_sessions::session;
use tracing::warn;

const FLASH_KEY: &str = "flash";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Error,
}

impl Level {
    pub fn css_class(&self) -> &'static str {
        match self {
            Level::Success => "flash-success",
            Level::Error => "flash-error",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMessage {
    pub level: Level,
    pub text: String,
}

pub async fn push(
    session: &Session,
    level: Level,
    text: impl Into<String>,
) -> Result<(), session::Error> {
    let mut messages: Vec<FlashMessage> = session.get(FLASH_KEY).await?.unwrap_or_default();
    messages.push(FlashMessage {
        level,
        text: text.into(),
    });
    session.insert(FLASH_KEY, messages).await
}

/// Removes and returns all pending messages.
pub async fn take(session: &Session) -> Result<Vec<FlashMessage>, session::Error> {
    Ok(session
        .remove::<Vec<FlashMessage>>(FLASH_KEY)
        .await?
        .unwrap_or_default())
}

/// Flash `text` and redirect to `to`. A message that cannot be stored is logged and dropped, the
/// redirect happens regardless.
pub async fn redirect(session: &Session, level: Level, text: impl Into<String>, to: &str) -> Redirect {
    if let Err(e) = push(session, level, text).await {
        warn!(error = %e, "Failed to store flash message");
    }
    Redirect::to(to)
}
