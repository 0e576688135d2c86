use chrono::NaiveDate;
use sqlx::{FromRow, Pool, Sqlite};

use crate::validation::ValidationError;

/// Date format used by HTML date inputs and stored in the database.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Clone, Debug, FromRow)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub date: NaiveDate,
    pub location: String,
    pub description: String,
    #[allow(dead_code)]
    pub created_at: chrono::NaiveDateTime,
    #[allow(dead_code)]
    pub updated_at: chrono::NaiveDateTime,
}

impl Event {
    /// The date as expected by `<input type="date">`.
    pub fn date_value(&self) -> String {
        self.date.format(DATE_FORMAT).to_string()
    }

    /// The date as shown in listings, e.g. "Sat, 14 Mar 2026".
    pub fn date_label(&self) -> String {
        self.date.format("%a, %-d %b %Y").to_string()
    }
}

/// Validated contents of an event, used for both creating and updating.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventInput {
    pub title: String,
    pub date: NaiveDate,
    pub location: String,
    pub description: String,
}

impl EventInput {
    /// Trims and validates raw form values.
    pub fn parse(
        title: &str,
        date: &str,
        location: &str,
        description: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ValidationError::TitleRequired);
        }

        let date = date.trim();
        if date.is_empty() {
            return Err(ValidationError::DateRequired);
        }
        let date =
            NaiveDate::parse_from_str(date, DATE_FORMAT).map_err(|_| ValidationError::InvalidDate)?;

        let location = location.trim();
        if location.is_empty() {
            return Err(ValidationError::LocationRequired);
        }

        Ok(Self {
            title: title.to_owned(),
            date,
            location: location.to_owned(),
            description: description.map(str::trim).unwrap_or_default().to_owned(),
        })
    }
}

/// All events, earliest first. Events on the same day keep their creation order.
pub async fn list_events(pool: &Pool<Sqlite>) -> sqlx::Result<Vec<Event>> {
    sqlx::query_as("SELECT * FROM Events ORDER BY date ASC, id ASC")
        .fetch_all(pool)
        .await
}

pub async fn get_event(id: i64, pool: &Pool<Sqlite>) -> sqlx::Result<Option<Event>> {
    sqlx::query_as("SELECT * FROM Events WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn insert_event(event: &EventInput, pool: &Pool<Sqlite>) -> sqlx::Result<Event> {
    sqlx::query_as(
        "INSERT INTO Events (title, date, location, description) VALUES (?, ?, ?, ?) RETURNING *",
    )
    .bind(&event.title)
    .bind(event.date)
    .bind(&event.location)
    .bind(&event.description)
    .fetch_one(pool)
    .await
}

/// Returns `None` if no event with this id exists.
pub async fn update_event(
    id: i64,
    event: &EventInput,
    pool: &Pool<Sqlite>,
) -> sqlx::Result<Option<Event>> {
    sqlx::query_as(
        "UPDATE Events
         SET title = ?, date = ?, location = ?, description = ?, updated_at = CURRENT_TIMESTAMP
         WHERE id = ?
         RETURNING *",
    )
    .bind(&event.title)
    .bind(event.date)
    .bind(&event.location)
    .bind(&event.description)
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Returns whether an event was deleted.
pub async fn delete_event(id: i64, pool: &Pool<Sqlite>) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM Events WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
