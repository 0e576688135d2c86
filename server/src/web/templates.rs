use askama::Template;
use axum::response::Html;
use tower_sessions::Session;
use tracing::warn;

use crate::db::{Event, User};
use crate::error::AppError;
use crate::flash::{self, FlashMessage};

/// Data every page shares: title, navigation state and pending flash messages.
pub struct Layout {
    pub title: String,
    /// Highlights the active navigation entry.
    pub page: &'static str,
    pub user: Option<User>,
    pub flashes: Vec<FlashMessage>,
}

impl Layout {
    /// Drains the session's flash messages, they are shown exactly once.
    pub async fn build(
        session: &Session,
        user: Option<&User>,
        title: &str,
        page: &'static str,
    ) -> Self {
        let flashes = flash::take(session).await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read flash messages");
            Vec::new()
        });

        Self {
            title: format!("{title} — Timely"),
            page,
            user: user.cloned(),
            flashes,
        }
    }
}

#[derive(Template)]
#[template(path = "auth/register.html")]
pub struct RegisterPage {
    pub layout: Layout,
    pub providers: ProviderLinks,
}

#[derive(Template)]
#[template(path = "auth/login.html")]
pub struct LoginPage {
    pub layout: Layout,
    pub providers: ProviderLinks,
}

/// Which OAuth buttons to offer.
pub struct ProviderLinks {
    pub google: bool,
    pub github: bool,
}

impl ProviderLinks {
    pub fn any(&self) -> bool {
        self.google || self.github
    }
}

#[derive(Template)]
#[template(path = "auth/change_password.html")]
pub struct ChangePasswordPage {
    pub layout: Layout,
}

#[derive(Template)]
#[template(path = "events/list.html")]
pub struct EventListPage {
    pub layout: Layout,
    pub events: Vec<Event>,
    pub load_error: Option<String>,
}

#[derive(Template)]
#[template(path = "events/form.html")]
pub struct EventFormPage {
    pub layout: Layout,
    pub action: String,
    pub is_edit: bool,
    pub form: EventFormValues,
}

/// Values pre-filled into the event form.
#[derive(Default)]
pub struct EventFormValues {
    pub title: String,
    pub date: String,
    pub location: String,
    pub description: String,
}

impl From<&Event> for EventFormValues {
    fn from(event: &Event) -> Self {
        Self {
            title: event.title.clone(),
            date: event.date_value(),
            location: event.location.clone(),
            description: event.description.clone(),
        }
    }
}

#[derive(Template)]
#[template(path = "events/delete.html")]
pub struct DeleteEventPage {
    pub layout: Layout,
    pub event: Event,
}

/// Standalone page, rendered without a session.
#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorPage {
    pub title: String,
    pub status: u16,
    pub message: String,
}

pub fn render<T: Template>(template: &T) -> Result<Html<String>, AppError> {
    Ok(Html(template.render()?))
}
