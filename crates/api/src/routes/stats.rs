use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use pushcast_common::error::AppError;
use pushcast_engine::report_service::{DashboardStats, ReportService};

use crate::middleware::auth::AuthOperator;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/stats", get(dashboard_stats))
}

/// GET /api/stats: Dashboard counters.
async fn dashboard_stats(
    State(state): State<AppState>,
    _auth: AuthOperator,
) -> Result<Json<DashboardStats>, AppError> {
    Ok(Json(ReportService::stats(&state.pool).await?))
}
