use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Pool, Sqlite};
use thiserror::Error;

/// Where an account's identity is proven.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    /// Username and password stored with us.
    Local,
    Google,
    Github,
    /// Accepted by the schema, no sign-in flow exists for it yet.
    Twitter,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Local => "local",
            OAuthProvider::Google => "google",
            OAuthProvider::Github => "github",
            OAuthProvider::Twitter => "twitter",
        }
    }

    /// Human readable name, as shown in flash messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            OAuthProvider::Local => "Local",
            OAuthProvider::Google => "Google",
            OAuthProvider::Github => "GitHub",
            OAuthProvider::Twitter => "Twitter",
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Error, Debug)]
#[error("unknown oauth provider {0:?}")]
pub struct UnknownProvider(String);

impl FromStr for OAuthProvider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(OAuthProvider::Local),
            "google" => Ok(OAuthProvider::Google),
            "github" => Ok(OAuthProvider::Github),
            "twitter" => Ok(OAuthProvider::Twitter),
            other => Err(UnknownProvider(other.to_owned())),
        }
    }
}

mod provider {
    use sqlx::{Decode, Encode, Sqlite, Type};

    use super::OAuthProvider;

    impl<'q> Encode<'q, Sqlite> for OAuthProvider {
        fn encode_by_ref(
            &self,
            buf: &mut <Sqlite as sqlx::Database>::ArgumentBuffer<'q>,
        ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
            <&str as Encode<'q, Sqlite>>::encode_by_ref(&self.as_str(), buf)
        }
    }

    impl<'r> Decode<'r, Sqlite> for OAuthProvider {
        fn decode(
            value: <Sqlite as sqlx::Database>::ValueRef<'r>,
        ) -> Result<Self, sqlx::error::BoxDynError> {
            Ok(<&str as Decode<Sqlite>>::decode(value)?.parse()?)
        }
    }

    impl Type<Sqlite> for OAuthProvider {
        fn type_info() -> <Sqlite as sqlx::Database>::TypeInfo {
            <&str as Type<Sqlite>>::type_info()
        }

        fn compatible(ty: &<Sqlite as sqlx::Database>::TypeInfo) -> bool {
            <&str as Type<Sqlite>>::compatible(ty)
        }
    }
}

/// A registered account.
///
/// Local accounts carry a password hash. Accounts created through an OAuth provider have none,
/// and accounts linked to a provider after registering locally keep their hash but can no longer
/// sign in with it.
#[derive(Clone, Debug, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub full_name: Option<String>,
    pub oauth_provider: OAuthProvider,
    pub oauth_id: Option<String>,
    pub profile_picture: Option<String>,
    #[allow(dead_code)]
    pub created_at: chrono::NaiveDateTime,
    #[allow(dead_code)]
    pub updated_at: chrono::NaiveDateTime,
}

impl User {
    pub fn is_local(&self) -> bool {
        self.oauth_provider == OAuthProvider::Local
    }

    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.username)
    }
}

/// Fields of a user row before insertion. Values are expected to be normalized and validated.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub full_name: Option<String>,
    pub oauth_provider: OAuthProvider,
    pub oauth_id: Option<String>,
    pub profile_picture: Option<String>,
}

pub async fn find_user_by_id(id: i64, pool: &Pool<Sqlite>) -> sqlx::Result<Option<User>> {
    sqlx::query_as("SELECT * FROM Users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_user_by_username(
    username: &str,
    pool: &Pool<Sqlite>,
) -> sqlx::Result<Option<User>> {
    sqlx::query_as("SELECT * FROM Users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await
}

/// Only accounts that still sign in with a password are considered.
pub async fn find_local_user(username: &str, pool: &Pool<Sqlite>) -> sqlx::Result<Option<User>> {
    sqlx::query_as("SELECT * FROM Users WHERE username = ? AND oauth_provider = ?")
        .bind(username)
        .bind(OAuthProvider::Local)
        .fetch_optional(pool)
        .await
}

pub async fn find_user_by_email(email: &str, pool: &Pool<Sqlite>) -> sqlx::Result<Option<User>> {
    sqlx::query_as("SELECT * FROM Users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await
}

pub async fn find_user_by_oauth(
    provider: OAuthProvider,
    oauth_id: &str,
    pool: &Pool<Sqlite>,
) -> sqlx::Result<Option<User>> {
    sqlx::query_as("SELECT * FROM Users WHERE oauth_provider = ? AND oauth_id = ?")
        .bind(provider)
        .bind(oauth_id)
        .fetch_optional(pool)
        .await
}

pub async fn username_exists(username: &str, pool: &Pool<Sqlite>) -> sqlx::Result<bool> {
    let result: Option<i64> = sqlx::query_scalar("SELECT id FROM Users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    Ok(result.is_some())
}

pub async fn insert_user(user: &NewUser, pool: &Pool<Sqlite>) -> sqlx::Result<User> {
    sqlx::query_as(
        "INSERT INTO Users
         (username, email, password_hash, full_name, oauth_provider, oauth_id, profile_picture)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         RETURNING *",
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.full_name)
    .bind(user.oauth_provider)
    .bind(&user.oauth_id)
    .bind(&user.profile_picture)
    .fetch_one(pool)
    .await
}

pub async fn update_password(id: i64, password_hash: &str, pool: &Pool<Sqlite>) -> sqlx::Result<()> {
    sqlx::query(
        "UPDATE Users SET password_hash = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(password_hash)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Attach a provider identity to an existing account, replacing any previous link.
pub async fn link_oauth(
    id: i64,
    provider: OAuthProvider,
    oauth_id: &str,
    profile_picture: Option<&str>,
    pool: &Pool<Sqlite>,
) -> sqlx::Result<User> {
    sqlx::query_as(
        "UPDATE Users
         SET oauth_provider = ?,
             oauth_id = ?,
             profile_picture = ?,
             updated_at = CURRENT_TIMESTAMP
         WHERE id = ?
         RETURNING *",
    )
    .bind(provider)
    .bind(oauth_id)
    .bind(profile_picture)
    .bind(id)
    .fetch_one(pool)
    .await
}
