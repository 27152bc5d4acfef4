use std::{any::Any, net::SocketAddr, path::Path};

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowHeaders, AllowMethods, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::{error, warn};

use crate::{
    auth,
    config::AppConfig,
    dashboard,
    error::AppError,
    middleware::{
        csrf::{csrf_routes, require_csrf_token, CSRF_HEADERS},
        rate_limit::limit_by_ip,
        security_headers::with_security_headers,
    },
    state::AppState,
    users,
};

const BODY_LIMIT: usize = 1024 * 1024;

pub fn build_app(state: AppState) -> Router {
    let auth_routes = auth::router().layer(middleware::from_fn_with_state(
        state.auth_limiter.clone(),
        limit_by_ip,
    ));

    let api = Router::new()
        .route("/", get(api_index))
        .merge(auth_routes)
        .merge(users::router())
        .merge(dashboard::dashboard_routes())
        .merge(csrf_routes())
        .fallback(api_not_found)
        .layer(middleware::from_fn(require_csrf_token))
        .layer(DefaultBodyLimit::max(BODY_LIMIT));

    let static_dir = Path::new(&state.config.static_dir);
    let spa = ServeDir::new(static_dir).fallback(ServeFile::new(static_dir.join("index.html")));

    let cors = cors_layer(&state.config);

    let router = Router::new()
        .nest("/api", api)
        .fallback_service(spa)
        .with_state(state);

    with_security_headers(router)
        .layer(cors)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(%origin, "ignoring unparsable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
        ]))
        .allow_headers(AllowHeaders::list(
            [header::CONTENT_TYPE, HeaderName::from_static("x-auth-token")]
                .into_iter()
                .chain(CSRF_HEADERS.into_iter().map(HeaderName::from_static)),
        ))
        .allow_credentials(true)
}

fn panic_response(_: Box<dyn Any + Send + 'static>) -> Response {
    error!("handler panicked");
    AppError::internal("Server error").into_response()
}

async fn api_index() -> Json<serde_json::Value> {
    Json(json!({
        "message": "User management API",
        "endpoints": {
            "auth": "/api/auth",
            "users": "/api/users",
        }
    }))
}

async fn api_not_found() -> AppError {
    AppError::not_found("Not found")
}

pub async fn serve(app: Router, config: &AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
