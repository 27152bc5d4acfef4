use tracing::{error, warn};

use crate::{
    auth::password::hash_password,
    error::{AppError, AppResult},
    users::{repo::UserStore, repo_types::UserChanges},
    validation::{normalize_email, Checks},
};

/// Pre-checks username/email uniqueness, ignoring the row `exclude_id`.
///
/// The table's unique constraints stay the last word: two concurrent writers
/// can both pass here and the loser then fails in the store.
pub async fn ensure_unique(
    store: &dyn UserStore,
    exclude_id: Option<i64>,
    username: Option<&str>,
    email: Option<&str>,
) -> AppResult<()> {
    if let Some(username) = username {
        if let Some(existing) = store.find_by_username(username).await {
            if Some(existing.id) != exclude_id {
                warn!(%username, "username already exists");
                return Err(AppError::conflict("Username already exists"));
            }
        }
    }
    if let Some(email) = email {
        if let Some(existing) = store.find_by_email(email).await {
            if Some(existing.id) != exclude_id {
                warn!(%email, "email already exists");
                return Err(AppError::conflict("Email already exists"));
            }
        }
    }
    Ok(())
}

/// Treats blank strings as "not supplied".
pub fn supplied(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Validates the generic profile fields and hashes the password.
pub fn profile_changes(
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
) -> AppResult<UserChanges> {
    let username = supplied(username).map(|u| u.trim().to_string());
    let email = supplied(email).map(|e| normalize_email(&e));
    let password = supplied(password);

    let mut checks = Checks::new();
    if let Some(username) = &username {
        checks.username(username);
    }
    if let Some(email) = &email {
        checks.email(email);
    }
    if let Some(password) = &password {
        checks.password("password", password);
    }
    checks.finish()?;

    let password_hash = password
        .map(|p| hash_password(&p))
        .transpose()
        .map_err(|e| {
            error!(error = %e, "hash_password failed");
            AppError::internal("Server error")
        })?;

    Ok(UserChanges {
        username,
        email,
        password_hash,
    })
}
