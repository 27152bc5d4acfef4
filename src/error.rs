use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error};

pub type AppResult<T> = Result<T, AppError>;

/// One failed field check, rendered in the `errors` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub path: &'static str,
    pub msg: &'static str,
    pub location: &'static str,
}

impl FieldError {
    pub fn body(path: &'static str, msg: &'static str) -> Self {
        Self {
            path,
            msg,
            location: "body",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation failed")]
    Validation(Vec<FieldError>),
    #[error("{0}")]
    BadRequest(String),
    /// Duplicate username/email. Reported as 400 like any other bad input.
    #[error("{0}")]
    Conflict(String),
    #[error("Malformed JSON")]
    MalformedPayload,
    #[error("No valid token, authorization denied")]
    Unauthenticated,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Too many requests, please try again later.")]
    TooManyRequests { retry_after_secs: u64 },
    /// The string is what the client sees; keep internals in the log.
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::BadRequest(_)
            | AppError::Conflict(_)
            | AppError::MalformedPayload => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            error!(%status, %message, "request failed");
        }

        match self {
            AppError::Validation(errors) => (status, Json(json!({ "errors": errors }))).into_response(),
            AppError::TooManyRequests { retry_after_secs } => (
                status,
                [(axum::http::header::RETRY_AFTER, retry_after_secs.to_string())],
                Json(json!({ "message": message })),
            )
                .into_response(),
            _ => (status, Json(json!({ "message": message }))).into_response(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        debug!(error = %rejection.body_text(), "rejected request body");
        AppError::MalformedPayload
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        debug!(error = %rejection.body_text(), "rejected path parameter");
        AppError::bad_request("Invalid user id")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let res = err.into_response();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn taxonomy_maps_to_status_codes() {
        assert_eq!(AppError::Validation(vec![]).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::conflict("dup").status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::MalformedPayload.status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::forbidden("no").status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::not_found("gone").status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::internal("boom").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn message_errors_render_a_message_field() {
        let (status, body) = body_json(AppError::conflict("Username already exists")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Username already exists");
    }

    #[tokio::test]
    async fn validation_errors_render_an_errors_array() {
        let (status, body) = body_json(AppError::Validation(vec![FieldError::body(
            "email",
            "Please include a valid email",
        )]))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["path"], "email");
        assert_eq!(body["errors"][0]["location"], "body");
        assert!(body.get("message").is_none());
    }

    #[tokio::test]
    async fn rate_limit_error_sets_retry_after() {
        let res = AppError::TooManyRequests { retry_after_secs: 42 }.into_response();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers()[axum::http::header::RETRY_AFTER], "42");
    }
}
