use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use crate::config::AppConfig;

pub const AUTH_COOKIE: &str = "auth_token";

/// HTTP-only, same-site-strict cookie carrying the credential. Expires with the token.
pub fn auth_cookie(config: &AppConfig, token: String) -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE, token))
        .http_only(true)
        .secure(config.production)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(Duration::seconds(config.jwt.ttl_seconds))
        .build()
}

/// Removal cookie; path must match the one the credential was set with.
pub fn cleared_auth_cookie() -> Cookie<'static> {
    Cookie::build(AUTH_COOKIE).path("/").build()
}
