//! Push management, dispatch and retraction routes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use pushcast_common::error::AppError;
use pushcast_common::types::{DeliveryLog, Push, PushId};
use pushcast_engine::push_service::{
    CreatePushParams, ListLogsQuery, ListPushesQuery, PushService, UpdatePushParams,
};
use pushcast_engine::queue::JobTicket;
use pushcast_engine::retraction::RetractionSummary;

use crate::middleware::auth::AuthOperator;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/pushes", post(create_push).get(list_pushes))
        .route(
            "/api/pushes/{id}",
            get(get_push).patch(update_push).delete(delete_push),
        )
        .route("/api/pushes/{id}/send", post(send_push))
        .route("/api/pushes/{id}/cancel", post(cancel_push))
        .route("/api/pushes/{id}/message", axum::routing::delete(retract_push))
        .route("/api/pushes/{id}/logs", get(list_logs))
}

/// POST /api/pushes: Create a draft (or scheduled) push.
async fn create_push(
    State(state): State<AppState>,
    auth: AuthOperator,
    Json(params): Json<CreatePushParams>,
) -> Result<(StatusCode, Json<Push>), AppError> {
    let push = PushService::create(&state.pool, Some(auth.operator_id), &params).await?;
    Ok((StatusCode::CREATED, Json(push)))
}

/// GET /api/pushes: List pushes, newest first.
async fn list_pushes(
    State(state): State<AppState>,
    _auth: AuthOperator,
    Query(query): Query<ListPushesQuery>,
) -> Result<Json<Vec<Push>>, AppError> {
    let pushes = PushService::list(&state.pool, &query).await?;
    Ok(Json(pushes))
}

/// GET /api/pushes/:id
async fn get_push(
    State(state): State<AppState>,
    _auth: AuthOperator,
    Path(id): Path<PushId>,
) -> Result<Json<Push>, AppError> {
    Ok(Json(PushService::get(&state.pool, id).await?))
}

/// PATCH /api/pushes/:id: Edit a push that has not been dispatched yet.
async fn update_push(
    State(state): State<AppState>,
    _auth: AuthOperator,
    Path(id): Path<PushId>,
    Json(params): Json<UpdatePushParams>,
) -> Result<Json<Push>, AppError> {
    Ok(Json(PushService::update(&state.pool, id, &params).await?))
}

/// DELETE /api/pushes/:id: Delete a push that has not been dispatched yet.
async fn delete_push(
    State(state): State<AppState>,
    _auth: AuthOperator,
    Path(id): Path<PushId>,
) -> Result<Json<serde_json::Value>, AppError> {
    PushService::delete(&state.pool, id).await?;
    Ok(Json(serde_json::json!({"deleted": true})))
}

/// POST /api/pushes/:id/send: Claim the push and queue its dispatch run.
async fn send_push(
    State(state): State<AppState>,
    auth: AuthOperator,
    Path(id): Path<PushId>,
) -> Result<(StatusCode, Json<JobTicket>), AppError> {
    let handle = state.queue.start(id).await?;
    let ticket = handle.ticket();

    tracing::info!(
        push_id = id,
        job_id = %ticket.job_id,
        operator_id = auth.operator_id,
        "Push dispatch requested"
    );

    Ok((StatusCode::ACCEPTED, Json(ticket)))
}

/// POST /api/pushes/:id/cancel
async fn cancel_push(
    State(state): State<AppState>,
    _auth: AuthOperator,
    Path(id): Path<PushId>,
) -> Result<Json<Push>, AppError> {
    Ok(Json(PushService::cancel(&state.pool, id).await?))
}

/// DELETE /api/pushes/:id/message: Retract every delivered message of the push.
async fn retract_push(
    State(state): State<AppState>,
    auth: AuthOperator,
    Path(id): Path<PushId>,
) -> Result<Json<RetractionSummary>, AppError> {
    tracing::info!(push_id = id, operator_id = auth.operator_id, "Push retraction requested");
    let summary = state.retractor.retract(id).await?;
    Ok(Json(summary))
}

/// GET /api/pushes/:id/logs
async fn list_logs(
    State(state): State<AppState>,
    _auth: AuthOperator,
    Path(id): Path<PushId>,
    Query(query): Query<ListLogsQuery>,
) -> Result<Json<Vec<DeliveryLog>>, AppError> {
    Ok(Json(PushService::logs(&state.pool, id, &query).await?))
}
