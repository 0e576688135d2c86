use super::AuthError;
use super::password::verify_password;
use crate::db::{DbService, User};
use crate::validation::normalize_username;

/// Check a username and password against local accounts.
///
/// Unknown users, accounts without a password and wrong passwords all fail with
/// [`AuthError::InvalidCredentials`].
pub async fn authenticate(db: &DbService, username: &str, password: &str) -> Result<User, AuthError> {
    let username = normalize_username(username);

    let user = db
        .find_local_user(&username)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;
    let hashword = user
        .password_hash
        .clone()
        .ok_or(AuthError::InvalidCredentials)?;

    if !verify_password(password.to_owned(), hashword).await? {
        return Err(AuthError::InvalidCredentials);
    }

    Ok(user)
}
