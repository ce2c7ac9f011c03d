//! Recipient management routes.

use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;

use pushcast_common::error::AppError;
use pushcast_common::types::{DeliveryLog, Recipient, RecipientId};
use pushcast_engine::push_service::ListLogsQuery;
use pushcast_engine::recipient_service::{
    ListRecipientsQuery, RecipientService, UpdateRecipientParams,
};

use crate::middleware::auth::AuthOperator;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct StatusBody {
    is_active: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/recipients", get(list_recipients))
        .route(
            "/api/recipients/{id}",
            get(get_recipient).patch(update_recipient),
        )
        .route("/api/recipients/{id}/status", put(set_status))
        .route("/api/recipients/{id}/logs", get(recipient_logs))
}

/// GET /api/recipients?active_only&skip&limit
async fn list_recipients(
    State(state): State<AppState>,
    _auth: AuthOperator,
    Query(query): Query<ListRecipientsQuery>,
) -> Result<Json<Vec<Recipient>>, AppError> {
    Ok(Json(RecipientService::list(&state.pool, &query).await?))
}

/// GET /api/recipients/:id
async fn get_recipient(
    State(state): State<AppState>,
    _auth: AuthOperator,
    Path(id): Path<RecipientId>,
) -> Result<Json<Recipient>, AppError> {
    Ok(Json(RecipientService::get(&state.pool, id).await?))
}

/// PATCH /api/recipients/:id: Correct profile fields.
async fn update_recipient(
    State(state): State<AppState>,
    _auth: AuthOperator,
    Path(id): Path<RecipientId>,
    Json(params): Json<UpdateRecipientParams>,
) -> Result<Json<Recipient>, AppError> {
    Ok(Json(RecipientService::update(&state.pool, id, &params).await?))
}

/// PUT /api/recipients/:id/status: Toggle whether the recipient receives pushes.
async fn set_status(
    State(state): State<AppState>,
    auth: AuthOperator,
    Path(id): Path<RecipientId>,
    Json(body): Json<StatusBody>,
) -> Result<Json<Recipient>, AppError> {
    let recipient = RecipientService::set_active(&state.pool, id, body.is_active).await?;
    tracing::info!(
        recipient_id = id,
        is_active = body.is_active,
        operator_id = auth.operator_id,
        "Recipient status changed"
    );
    Ok(Json(recipient))
}

/// GET /api/recipients/:id/logs
async fn recipient_logs(
    State(state): State<AppState>,
    _auth: AuthOperator,
    Path(id): Path<RecipientId>,
    Query(query): Query<ListLogsQuery>,
) -> Result<Json<Vec<DeliveryLog>>, AppError> {
    Ok(Json(RecipientService::logs(&state.pool, id, &query).await?))
}
