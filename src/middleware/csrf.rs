use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
    routing::get,
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    error::{AppError, AppResult},
    state::AppState,
};

pub const CSRF_COOKIE: &str = "_csrf";
/// Accepted header names, first match wins.
pub const CSRF_HEADERS: [&str; 3] = ["csrf-token", "x-csrf-token", "x-xsrf-token"];
const TOKEN_LEN: usize = 32;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfTokenResponse {
    pub csrf_token: String,
}

pub fn csrf_routes() -> Router<AppState> {
    Router::new().route("/csrf-token", get(csrf_token))
}

fn generate_token() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Hands out the double-submit secret, minting a cookie only when the client has none.
pub async fn csrf_token(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<CsrfTokenResponse>) {
    if let Some(existing) = jar.get(CSRF_COOKIE).map(|c| c.value().to_string()) {
        if !existing.is_empty() {
            return (jar, Json(CsrfTokenResponse { csrf_token: existing }));
        }
    }

    let token = generate_token();
    let cookie = Cookie::build((CSRF_COOKIE, token.clone()))
        .http_only(true)
        .secure(state.config.production)
        .same_site(SameSite::Strict)
        .path("/")
        .build();
    debug!("issued new csrf cookie");
    (jar.add(cookie), Json(CsrfTokenResponse { csrf_token: token }))
}

fn is_state_changing(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Byte comparison whose running time depends only on the length.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Rejects unsafe methods unless a CSRF header echoes the `_csrf` cookie.
pub async fn require_csrf_token(jar: CookieJar, req: Request, next: Next) -> AppResult<Response> {
    if !is_state_changing(req.method()) {
        return Ok(next.run(req).await);
    }

    let header = CSRF_HEADERS
        .iter()
        .find_map(|name| req.headers().get(*name))
        .and_then(|v| v.to_str().ok());
    let cookie = jar.get(CSRF_COOKIE).map(|c| c.value());

    match (header, cookie) {
        (Some(h), Some(c)) if !c.is_empty() && constant_time_eq(h.as_bytes(), c.as_bytes()) => {
            Ok(next.run(req).await)
        }
        _ => {
            warn!(method = %req.method(), uri = %req.uri(), "csrf check failed");
            Err(AppError::forbidden("Invalid CSRF token"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::post};
    use tower::ServiceExt;

    fn guarded() -> Router {
        Router::new()
            .route("/thing", post(|| async { "done" }).get(|| async { "read" }))
            .layer(middleware::from_fn(require_csrf_token))
    }

    fn post_with(headers: &[(&str, &str)]) -> axum::http::Request<Body> {
        let mut req = axum::http::Request::builder().method(Method::POST).uri("/thing");
        for (k, v) in headers {
            req = req.header(*k, *v);
        }
        req.body(Body::empty()).unwrap()
    }

    #[test]
    fn tokens_are_alphanumeric_and_fresh() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), TOKEN_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn constant_time_eq_matches_plain_equality() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }

    #[tokio::test]
    async fn safe_methods_pass_without_token() {
        let req = axum::http::Request::builder()
            .uri("/thing")
            .body(Body::empty())
            .unwrap();
        let res = guarded().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn matching_header_and_cookie_pass() {
        let res = guarded()
            .oneshot(post_with(&[("cookie", "_csrf=tok123"), ("x-csrf-token", "tok123")]))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_or_mismatched_token_is_forbidden() {
        for headers in [
            vec![],
            vec![("cookie", "_csrf=tok123")],
            vec![("csrf-token", "tok123")],
            vec![("cookie", "_csrf=tok123"), ("csrf-token", "other")],
        ] {
            let res = guarded().oneshot(post_with(&headers)).await.unwrap();
            assert_eq!(res.status(), StatusCode::FORBIDDEN);
            let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
            let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(json["message"], "Invalid CSRF token");
        }
    }
}
