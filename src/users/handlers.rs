use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use super::{
    dto::{ChangePasswordRequest, CreateUserRequest, ProfileUpdateRequest, UpdateUserRequest},
    repo_types::{NewUser, PublicUser, Role, UserChanges},
    services::{ensure_unique, profile_changes, supplied},
};
use crate::{
    auth::{
        dto::MessageResponse,
        extractors::{AdminUser, AuthUser},
        password::{hash_password, verify_password},
    },
    dashboard::stats::ActivityEntry,
    error::{AppError, AppResult},
    extract::{JsonBody, PathParam},
    state::AppState,
    validation::{normalize_email, Checks},
};

// --- public routers ---

/// Admin-only CRUD over every account.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

/// Routes any authenticated user may call on their own account.
pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(get_profile).put(update_profile))
        .route("/users/change-password", post(change_password))
        .route("/users/activity", get(my_activity))
}

fn parse_role(raw: &str) -> AppResult<Role> {
    raw.trim().parse().map_err(|_| AppError::bad_request("Invalid role"))
}

async fn apply_changes(state: &AppState, id: i64, changes: UserChanges) -> AppResult<Option<PublicUser>> {
    if changes.is_empty() {
        return Ok(None);
    }
    ensure_unique(
        state.users.as_ref(),
        Some(id),
        changes.username.as_deref(),
        changes.email.as_deref(),
    )
    .await?;
    state
        .users
        .update(id, changes)
        .await
        .map(Some)
        .ok_or_else(|| AppError::internal("Failed to update user"))
}

// --- admin handlers ---

#[instrument(skip(state, admin), fields(admin_id = admin.identity.id))]
pub async fn list_users(State(state): State<AppState>, admin: AdminUser) -> Json<Vec<PublicUser>> {
    Json(state.users.get_all().await)
}

#[instrument(skip(state, admin), fields(admin_id = admin.identity.id))]
pub async fn get_user(
    State(state): State<AppState>,
    admin: AdminUser,
    PathParam(id): PathParam<i64>,
) -> AppResult<Json<PublicUser>> {
    state
        .users
        .find_by_id(id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::not_found("User not found"))
}

#[instrument(skip(state, admin, payload), fields(admin_id = admin.identity.id))]
pub async fn create_user(
    State(state): State<AppState>,
    admin: AdminUser,
    JsonBody(payload): JsonBody<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<PublicUser>)> {
    let username = payload.username.unwrap_or_default().trim().to_string();
    let email = normalize_email(payload.email.as_deref().unwrap_or_default());
    let password = payload.password.unwrap_or_default();

    let mut checks = Checks::new();
    checks.username(&username);
    checks.email(&email);
    checks.password("password", &password);
    checks.required("role", payload.role.as_deref(), "Role is required");
    checks.finish()?;

    let role = parse_role(payload.role.as_deref().unwrap_or_default())?;

    ensure_unique(state.users.as_ref(), None, Some(&username), Some(&email)).await?;

    let password_hash = hash_password(&password).map_err(|e| {
        error!(error = %e, "hash_password failed");
        AppError::internal("Server error")
    })?;

    let user = state
        .users
        .create(NewUser {
            username,
            email,
            password_hash,
            role,
        })
        .await
        .ok_or_else(|| AppError::internal("Failed to create user"))?;

    info!(user_id = user.id, %role, "user created by admin");
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(state, admin, payload), fields(admin_id = admin.identity.id))]
pub async fn update_user(
    State(state): State<AppState>,
    admin: AdminUser,
    PathParam(id): PathParam<i64>,
    JsonBody(payload): JsonBody<UpdateUserRequest>,
) -> AppResult<Json<PublicUser>> {
    let target = state
        .users
        .find_by_id(id)
        .await
        .ok_or_else(|| AppError::not_found("User not found"))?;

    let role = supplied(payload.role).map(|r| parse_role(&r)).transpose()?;
    if target.id == admin.identity.id && role.is_some_and(|r| r != Role::Admin) {
        warn!(user_id = id, "admin tried to drop own admin role");
        return Err(AppError::bad_request(
            "Admin cannot remove their own admin status",
        ));
    }

    let changes = profile_changes(payload.username, payload.email, payload.password)?;
    let mut user = apply_changes(&state, id, changes).await?.unwrap_or(target);

    if let Some(role) = role {
        user = state
            .users
            .update_role(id, role)
            .await
            .ok_or_else(|| AppError::internal("Failed to update user role"))?;
        info!(user_id = id, %role, "user role changed");
    }

    Ok(Json(user))
}

#[instrument(skip(state, admin), fields(admin_id = admin.identity.id))]
pub async fn delete_user(
    State(state): State<AppState>,
    admin: AdminUser,
    PathParam(id): PathParam<i64>,
) -> AppResult<Json<MessageResponse>> {
    let target = state
        .users
        .find_by_id(id)
        .await
        .ok_or_else(|| AppError::not_found("User not found"))?;

    if target.id == admin.identity.id {
        warn!(user_id = id, "admin tried to delete own account");
        return Err(AppError::bad_request("Admin cannot delete themselves"));
    }

    if !state.users.delete(id).await {
        return Err(AppError::internal("Failed to delete user"));
    }

    info!(user_id = id, username = %target.username, "user deleted");
    Ok(Json(MessageResponse {
        message: "User deleted successfully",
    }))
}

// --- self-service handlers ---

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> AppResult<Json<PublicUser>> {
    state
        .users
        .find_by_id(identity.id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::not_found("User not found"))
}

#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    JsonBody(payload): JsonBody<ProfileUpdateRequest>,
) -> AppResult<Json<PublicUser>> {
    let current = state
        .users
        .find_by_id(identity.id)
        .await
        .ok_or_else(|| AppError::not_found("User not found"))?;

    let changes = profile_changes(payload.username, payload.email, payload.password)?;
    let user = apply_changes(&state, identity.id, changes)
        .await?
        .unwrap_or(current);

    info!(user_id = user.id, "profile updated");
    Ok(Json(user))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    JsonBody(payload): JsonBody<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let current_password = payload.current_password.unwrap_or_default();
    let new_password = payload.new_password.unwrap_or_default();

    let mut checks = Checks::new();
    checks.required(
        "currentPassword",
        Some(current_password.as_str()),
        "Current password is required",
    );
    checks.password("newPassword", &new_password);
    checks.finish()?;

    // The id lookup never returns the hash, and the token's username may be stale.
    let current = state
        .users
        .find_by_id(identity.id)
        .await
        .ok_or_else(|| AppError::not_found("User not found"))?;
    let user = state
        .users
        .find_by_username(&current.username)
        .await
        .filter(|u| u.id == identity.id)
        .ok_or_else(|| AppError::not_found("User not found"))?;

    let ok = verify_password(&current_password, &user.password_hash).map_err(|e| {
        error!(error = %e, user_id = user.id, "verify_password failed");
        AppError::internal("Server error")
    })?;
    if !ok {
        warn!(user_id = user.id, "change password with wrong current password");
        return Err(AppError::bad_request("Current password is incorrect"));
    }

    let password_hash = hash_password(&new_password).map_err(|e| {
        error!(error = %e, "hash_password failed");
        AppError::internal("Server error")
    })?;
    state
        .users
        .update(
            user.id,
            UserChanges {
                password_hash: Some(password_hash),
                ..Default::default()
            },
        )
        .await
        .ok_or_else(|| AppError::internal("Failed to update password"))?;

    info!(user_id = user.id, "password changed");
    Ok(Json(MessageResponse {
        message: "Password changed successfully",
    }))
}

#[instrument(skip(state))]
pub async fn my_activity(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Json<Vec<ActivityEntry>> {
    Json(state.stats.recent_activity(Some(identity.id)).await)
}
