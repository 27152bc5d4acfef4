use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tracing::instrument;

use super::stats::{ActivityEntry, ActivityStats};
use crate::{
    error::{AppError, AppResult},
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    #[serde(flatten)]
    pub activity: ActivityStats,
    pub users: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub stats: DashboardStats,
    pub recent_activity: Vec<ActivityEntry>,
}

pub fn dashboard_routes() -> Router<AppState> {
    Router::new().route("/dashboard", get(dashboard))
}

/// Public, like the page that consumes it.
#[instrument(skip(state))]
pub async fn dashboard(State(state): State<AppState>) -> AppResult<Json<DashboardResponse>> {
    let users = state
        .users
        .count()
        .await
        .ok_or_else(|| AppError::internal("Internal server error"))?;

    Ok(Json(DashboardResponse {
        stats: DashboardStats {
            activity: state.stats.activity_stats().await,
            users,
        },
        recent_activity: state.stats.recent_activity(None).await,
    }))
}
