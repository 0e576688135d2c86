use axum::Router;
use axum::extract::{Form, Path, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use serde::Deserialize;
use tracing::{error, info};

use super::templates::{
    DeleteEventPage, EventFormPage, EventFormValues, EventListPage, render,
};
use super::{AppState, fail};
use crate::auth::{AuthUser, PageContext};
use crate::db::{Event, EventInput};
use crate::error::AppError;
use crate::flash::{self, Level};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/events", get(list_events))
        .route("/events/create", get(create_page).post(create_event))
        .route("/events/edit/{id}", get(edit_page).post(update_event))
        .route("/events/delete/{id}", get(delete_page).post(delete_event))
}

/// Missing fields arrive empty and are reported by validation.
#[derive(Deserialize, Default)]
#[serde(default)]
pub struct EventForm {
    title: String,
    date: String,
    location: String,
    description: Option<String>,
}

impl EventForm {
    fn validate(&self) -> Result<EventInput, AppError> {
        Ok(EventInput::parse(
            &self.title,
            &self.date,
            &self.location,
            self.description.as_deref(),
        )?)
    }
}

/// Ids come straight from the URL; anything that is not a row id is simply not found.
fn parse_id(id: &str) -> Result<i64, AppError> {
    id.parse().map_err(|_| AppError::EventNotFound)
}

async fn find_event(state: &AppState, id: &str) -> Result<Event, AppError> {
    state
        .db_service
        .get_event(parse_id(id)?)
        .await?
        .ok_or(AppError::EventNotFound)
}

async fn list_events(
    ctx: PageContext,
    State(state): State<AppState>,
) -> Result<Html<String>, AppError> {
    let (events, load_error) = match state.db_service.list_events().await {
        Ok(events) => (events, None),
        Err(e) => {
            error!(error = %e, "Failed to load events");
            (Vec::new(), Some("Error loading events".to_owned()))
        },
    };

    render(&EventListPage {
        layout: ctx.layout("Events", "events").await,
        events,
        load_error,
    })
}

async fn create_page(user: AuthUser) -> Result<Html<String>, AppError> {
    render(&EventFormPage {
        layout: user.layout("Create Event", "create").await,
        action: "/events/create".to_owned(),
        is_edit: false,
        form: EventFormValues::default(),
    })
}

async fn create_event(
    user: AuthUser,
    State(state): State<AppState>,
    Form(form): Form<EventForm>,
) -> Redirect {
    let result = match form.validate() {
        Ok(input) => state.db_service.insert_event(&input).await.map_err(AppError::from),
        Err(e) => Err(e),
    };

    match result {
        Ok(event) => {
            info!(event_id = event.id, user_id = user.id, "Created event");
            flash::redirect(&user.session, Level::Success, "Event created successfully", "/events")
                .await
        },
        Err(e) => fail(&user.session, e, "Failed to create event", "/events/create").await,
    }
}

async fn edit_page(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let event = match find_event(&state, &id).await {
        Ok(event) => event,
        Err(e) => return fail(&user.session, e, "Event not found", "/events").await.into_response(),
    };

    render(&EventFormPage {
        layout: user.layout("Edit Event", "edit").await,
        action: format!("/events/edit/{}", event.id),
        is_edit: true,
        form: EventFormValues::from(&event),
    })
    .into_response()
}

async fn update_event(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Form(form): Form<EventForm>,
) -> Redirect {
    let event_id = match parse_id(&id) {
        Ok(event_id) => event_id,
        Err(e) => return fail(&user.session, e, "Event not found", "/events").await,
    };

    let input = match form.validate() {
        Ok(input) => input,
        Err(e) => {
            let back = format!("/events/edit/{event_id}");
            return fail(&user.session, e, "Failed to update event", &back).await;
        },
    };

    match state.db_service.update_event(event_id, &input).await {
        Ok(Some(event)) => {
            info!(event_id = event.id, user_id = user.id, "Updated event");
            flash::redirect(&user.session, Level::Success, "Event updated successfully", "/events")
                .await
        },
        Ok(None) => fail(&user.session, AppError::EventNotFound, "", "/events").await,
        Err(e) => fail(&user.session, e.into(), "Failed to update event", "/events").await,
    }
}

async fn delete_page(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let event = match find_event(&state, &id).await {
        Ok(event) => event,
        Err(e) => return fail(&user.session, e, "Event not found", "/events").await.into_response(),
    };

    render(&DeleteEventPage {
        layout: user.layout("Delete Event", "delete").await,
        event,
    })
    .into_response()
}

async fn delete_event(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Redirect {
    let result = match parse_id(&id) {
        Ok(event_id) => state.db_service.delete_event(event_id).await.map_err(AppError::from),
        Err(e) => Err(e),
    };

    match result {
        Ok(true) => {
            info!(event = %id, user_id = user.id, "Deleted event");
            flash::redirect(&user.session, Level::Success, "Event deleted successfully", "/events")
                .await
        },
        Ok(false) => fail(&user.session, AppError::EventNotFound, "", "/events").await,
        Err(e) => fail(&user.session, e, "Failed to delete event", "/events").await,
    }
}
