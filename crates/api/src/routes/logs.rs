//! Delivery log listing across pushes.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};

use pushcast_common::error::AppError;
use pushcast_common::types::DeliveryLog;
use pushcast_engine::report_service::{LogFilter, ReportService};

use crate::middleware::auth::AuthOperator;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/logs", get(list_logs))
}

/// GET /api/logs?push_id&recipient_id&status&skip&limit
async fn list_logs(
    State(state): State<AppState>,
    _auth: AuthOperator,
    Query(filter): Query<LogFilter>,
) -> Result<Json<Vec<DeliveryLog>>, AppError> {
    Ok(Json(ReportService::logs(&state.pool, &filter).await?))
}
