use std::marker::PhantomData;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::warn;

use super::{claims::Identity, cookie::AUTH_COOKIE, jwt::JwtKeys};
use crate::{error::AppError, users::repo_types::Role};

/// Header accepted from non-browser clients when no cookie is present.
pub const AUTH_HEADER: &str = "x-auth-token";

/// Reads the credential: cookie first, legacy header second.
pub fn credential_from(parts: &Parts) -> Option<String> {
    let jar = CookieJar::from_headers(&parts.headers);
    if let Some(cookie) = jar.get(AUTH_COOKIE).filter(|c| !c.value().is_empty()) {
        return Some(cookie.value().to_string());
    }
    parts
        .headers
        .get(AUTH_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Authenticated caller. Missing and invalid credentials are rejected alike.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = credential_from(parts).ok_or(AppError::Unauthenticated)?;
        let keys = JwtKeys::from_ref(state);
        match keys.verify(&token) {
            Ok(identity) => Ok(AuthUser(identity)),
            Err(e) => {
                warn!(error = %e, "rejected credential");
                Err(AppError::Unauthenticated)
            }
        }
    }
}

/// A set of roles allowed through [`Authorized`].
pub trait RoleRequirement: Send + Sync + 'static {
    const ALLOWED: &'static [Role];
}

pub struct AdminOnly;

impl RoleRequirement for AdminOnly {
    const ALLOWED: &'static [Role] = &[Role::Admin];
}

/// Role check over an already verified identity. No I/O.
pub fn authorize(identity: &Identity, allowed: &[Role]) -> Result<(), AppError> {
    if allowed.contains(&identity.role) {
        Ok(())
    } else {
        warn!(user_id = identity.id, role = %identity.role, "forbidden");
        Err(AppError::forbidden(
            "Forbidden: You do not have permission to access this resource",
        ))
    }
}

/// Authenticated caller whose role is in `R::ALLOWED`.
pub struct Authorized<R: RoleRequirement> {
    pub identity: Identity,
    _role: PhantomData<R>,
}

pub type AdminUser = Authorized<AdminOnly>;

#[async_trait]
impl<S, R> FromRequestParts<S> for Authorized<R>
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
    R: RoleRequirement,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser(identity) = AuthUser::from_request_parts(parts, state).await?;
        authorize(&identity, R::ALLOWED)?;
        Ok(Self {
            identity,
            _role: PhantomData,
        })
    }
}
