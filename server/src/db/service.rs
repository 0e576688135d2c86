use std::path::Path;

use sqlx::migrate;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use tracing::{debug, info};

use super::events::{self, Event, EventInput};
use super::users::{self, NewUser, OAuthProvider, User};

#[derive(Clone)]
pub struct DbService {
    pub pool: SqlitePool,
}

impl DbService {
    pub async fn new(location: &Path) -> anyhow::Result<DbService> {
        info!("Initializing SQLite database at {}", location.display());

        // SQlite does itself not create any directories, so we need to ensure the parent of the
        // database path already exists before creating the pool.
        if let Some(parent) = location.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::new()
            .filename(location)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        debug!("Creating database pool with {:?}", opts);

        let pool: SqlitePool = SqlitePool::connect_with(opts).await?;

        info!("Running database migrations");
        migrate!("sql/migrations").run(&pool).await?;

        Ok(DbService { pool })
    }

    pub async fn find_user_by_id(&self, id: i64) -> sqlx::Result<Option<User>> {
        users::find_user_by_id(id, &self.pool).await
    }

    pub async fn find_user_by_username(&self, username: &str) -> sqlx::Result<Option<User>> {
        users::find_user_by_username(username, &self.pool).await
    }

    pub async fn find_local_user(&self, username: &str) -> sqlx::Result<Option<User>> {
        users::find_local_user(username, &self.pool).await
    }

    pub async fn find_user_by_email(&self, email: &str) -> sqlx::Result<Option<User>> {
        users::find_user_by_email(email, &self.pool).await
    }

    pub async fn find_user_by_oauth(
        &self,
        provider: OAuthProvider,
        oauth_id: &str,
    ) -> sqlx::Result<Option<User>> {
        users::find_user_by_oauth(provider, oauth_id, &self.pool).await
    }

    pub async fn username_exists(&self, username: &str) -> sqlx::Result<bool> {
        users::username_exists(username, &self.pool).await
    }

    pub async fn insert_user(&self, user: &NewUser) -> sqlx::Result<User> {
        users::insert_user(user, &self.pool).await
    }

    pub async fn update_password(&self, id: i64, password_hash: &str) -> sqlx::Result<()> {
        users::update_password(id, password_hash, &self.pool).await
    }

    pub async fn link_oauth(
        &self,
        id: i64,
        provider: OAuthProvider,
        oauth_id: &str,
        profile_picture: Option<&str>,
    ) -> sqlx::Result<User> {
        users::link_oauth(id, provider, oauth_id, profile_picture, &self.pool).await
    }

    pub async fn list_events(&self) -> sqlx::Result<Vec<Event>> {
        events::list_events(&self.pool).await
    }

    pub async fn get_event(&self, id: i64) -> sqlx::Result<Option<Event>> {
        events::get_event(id, &self.pool).await
    }

    pub async fn insert_event(&self, event: &EventInput) -> sqlx::Result<Event> {
        events::insert_event(event, &self.pool).await
    }

    pub async fn update_event(&self, id: i64, event: &EventInput) -> sqlx::Result<Option<Event>> {
        events::update_event(id, event, &self.pool).await
    }

    pub async fn delete_event(&self, id: i64) -> sqlx::Result<bool> {
        events::delete_event(id, &self.pool).await
    }
}
