use axum::{
    extract::{FromRef, State},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        claims::Identity,
        cookie::{auth_cookie, cleared_auth_cookie},
        dto::{AuthResponse, CheckAuthResponse, LoginRequest, MessageResponse, RegisterRequest},
        extractors::AuthUser,
        jwt::JwtKeys,
        password::{hash_password, verify_against_dummy, verify_password},
    },
    error::{AppError, AppResult},
    extract::JsonBody,
    state::AppState,
    users::{
        repo_types::{NewUser, PublicUser, Role},
        services::ensure_unique,
    },
    validation::{normalize_email, Checks},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(get_me))
        .route("/auth/check-auth", get(check_auth))
}

/// Signs a credential for `identity` and puts it in the jar.
fn start_session(state: &AppState, jar: CookieJar, identity: &Identity) -> AppResult<CookieJar> {
    let keys = JwtKeys::from_ref(state);
    let token = keys.issue(identity).map_err(|e| {
        error!(error = %e, user_id = identity.id, "jwt sign failed");
        AppError::internal("Server error")
    })?;
    Ok(jar.add(auth_cookie(&state.config, token)))
}

#[instrument(skip(state, jar, payload))]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    JsonBody(payload): JsonBody<RegisterRequest>,
) -> AppResult<(CookieJar, Json<AuthResponse>)> {
    let username = payload.username.unwrap_or_default().trim().to_string();
    let email = normalize_email(payload.email.as_deref().unwrap_or_default());
    let password = payload.password.unwrap_or_default();

    let mut checks = Checks::new();
    checks.username(&username);
    checks.email(&email);
    checks.password("password", &password);
    checks.finish()?;

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
            role: Role::User,
        })
        .await
        .ok_or_else(|| AppError::internal("Failed to create user"))?;

    let identity = Identity::from(&user);
    let jar = start_session(&state, jar, &identity)?;

    info!(user_id = user.id, username = %user.username, "user registered");
    Ok((jar, Json(AuthResponse { user: identity })))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> AppResult<(CookieJar, Json<AuthResponse>)> {
    let mut checks = Checks::new();
    checks.present("username", payload.username.as_deref(), "Username is required");
    checks.present("password", payload.password.as_deref(), "Password is required");
    checks.finish()?;

    let username = payload.username.unwrap_or_default();
    let password = payload.password.unwrap_or_default();

    let invalid = || AppError::bad_request("Invalid credentials");

    let Some(user) = state.users.find_by_username(&username).await else {
        verify_against_dummy(&password);
        warn!(%username, "login unknown username");
        return Err(invalid());
    };

    let ok = verify_password(&password, &user.password_hash).map_err(|e| {
        error!(error = %e, user_id = user.id, "verify_password failed");
        AppError::internal("Server error")
    })?;
    if !ok {
        warn!(user_id = user.id, "login invalid password");
        return Err(invalid());
    }

    let identity = Identity::from(&user);
    let jar = start_session(&state, jar, &identity)?;

    info!(user_id = user.id, username = %user.username, "user logged in");
    Ok((jar, Json(AuthResponse { user: identity })))
}

#[instrument(skip(state))]
pub async fn get_me(
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

#[instrument]
pub async fn check_auth(AuthUser(identity): AuthUser) -> Json<CheckAuthResponse> {
    Json(CheckAuthResponse {
        is_authenticated: true,
        user: identity,
    })
}

#[instrument(skip(jar))]
pub async fn logout(jar: CookieJar) -> (CookieJar, Json<MessageResponse>) {
    (
        jar.remove(cleared_auth_cookie()),
        Json(MessageResponse {
            message: "Logged out successfully",
        }),
    )
}
