use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, error};

use crate::users::repo_types::{NewUser, PublicUser, Role, User, UserChanges};

/// Persistence over the `users` table.
///
/// Every operation swallows its own failure: the error is logged here and the
/// caller gets `None`, an empty list or `false`. Uniqueness of username and
/// email is enforced by the table's constraints, so a losing concurrent writer
/// sees `None` from `create`/`update`.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_all(&self) -> Vec<PublicUser>;
    async fn count(&self) -> Option<i64>;
    async fn find_by_id(&self, id: i64) -> Option<PublicUser>;
    /// Includes the password hash. Case-insensitive.
    async fn find_by_username(&self, username: &str) -> Option<User>;
    /// Includes the password hash.
    async fn find_by_email(&self, email: &str) -> Option<User>;
    async fn create(&self, user: NewUser) -> Option<PublicUser>;
    /// Applies only the supplied fields. `None` when no row changed.
    async fn update(&self, id: i64, changes: UserChanges) -> Option<PublicUser>;
    async fn update_role(&self, id: i64, role: Role) -> Option<PublicUser>;
    async fn delete(&self, id: i64) -> bool;
}

const PUBLIC_COLUMNS: &str = "id, username, email, role, created_at, updated_at";
const ALL_COLUMNS: &str = "id, username, email, password, role, created_at, updated_at";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn get_all(&self) -> Vec<PublicUser> {
        sqlx::query_as::<_, PublicUser>(&format!("SELECT {PUBLIC_COLUMNS} FROM users ORDER BY id"))
            .fetch_all(&self.db)
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "list users failed");
                Vec::new()
            })
    }

    async fn count(&self) -> Option<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.db)
            .await
            .map_err(|e| error!(error = %e, "count users failed"))
            .ok()
    }

    async fn find_by_id(&self, id: i64) -> Option<PublicUser> {
        sqlx::query_as::<_, PublicUser>(&format!("SELECT {PUBLIC_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, user_id = id, "find user by id failed");
                None
            })
    }

    async fn find_by_username(&self, username: &str) -> Option<User> {
        sqlx::query_as::<_, User>(&format!("SELECT {ALL_COLUMNS} FROM users WHERE lower(username) = lower($1)"))
            .bind(username)
            .fetch_optional(&self.db)
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, %username, "find user by username failed");
                None
            })
    }

    async fn find_by_email(&self, email: &str) -> Option<User> {
        sqlx::query_as::<_, User>(&format!("SELECT {ALL_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.db)
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, %email, "find user by email failed");
                None
            })
    }

    async fn create(&self, user: NewUser) -> Option<PublicUser> {
        sqlx::query_as::<_, PublicUser>(&format!(
            r#"
            INSERT INTO users (username, email, password, role)
            VALUES ($1, $2, $3, $4)
            RETURNING {PUBLIC_COLUMNS}
            "#
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .fetch_one(&self.db)
        .await
        .map_err(|e| error!(error = %e, username = %user.username, "create user failed"))
        .ok()
    }

    async fn update(&self, id: i64, changes: UserChanges) -> Option<PublicUser> {
        if changes.is_empty() {
            debug!(user_id = id, "update with no changes");
            return None;
        }
        sqlx::query_as::<_, PublicUser>(&format!(
            r#"
            UPDATE users
               SET username = COALESCE($2, username),
                   email = COALESCE($3, email),
                   password = COALESCE($4, password),
                   updated_at = now()
             WHERE id = $1
            RETURNING {PUBLIC_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.username)
        .bind(changes.email)
        .bind(changes.password_hash)
        .fetch_optional(&self.db)
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, user_id = id, "update user failed");
            None
        })
    }

    async fn update_role(&self, id: i64, role: Role) -> Option<PublicUser> {
        sqlx::query_as::<_, PublicUser>(&format!(
            r#"
            UPDATE users
               SET role = $2, updated_at = now()
             WHERE id = $1
            RETURNING {PUBLIC_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(role.as_str())
        .fetch_optional(&self.db)
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, user_id = id, %role, "update user role failed");
            None
        })
    }

    async fn delete(&self, id: i64) -> bool {
        match sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
        {
            Ok(result) => result.rows_affected() > 0,
            Err(e) => {
                error!(error = %e, user_id = id, "delete user failed");
                false
            }
        }
    }
}
