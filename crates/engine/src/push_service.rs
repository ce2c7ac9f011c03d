//! Operator-facing CRUD over pushes and their delivery logs.
//!
//! Edits and deletes are only allowed while a push is still mutable (draft or
//! scheduled). The status guard is part of each statement's WHERE clause, so
//! an edit cannot land on a push that a dispatch run has already claimed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;

use pushcast_common::error::AppError;
use pushcast_common::types::{
    ButtonSpec, ContentType, DeliveryLog, DeliveryStatus, Push, PushId, PushStatus, TargetList,
};

use crate::pg_store::{LogRow, PgStore, PushRow, decode_logs, decode_pushes};
use crate::state::{PushStateMachine, TransitionError, is_mutable};

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

/// Service layer for push CRUD operations.
pub struct PushService;

/// Parameters for creating a new push.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePushParams {
    pub title: String,
    pub content: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    pub media_url: Option<String>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub target_recipient_ids: Vec<i64>,
    #[serde(default)]
    pub use_markdown: bool,
    pub buttons: Option<serde_json::Value>,
}

fn default_content_type() -> String {
    ContentType::Text.to_string()
}

/// Parameters for updating a mutable push. Absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePushParams {
    pub title: Option<String>,
    pub content: Option<String>,
    pub content_type: Option<String>,
    pub media_url: Option<String>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub target_recipient_ids: Option<Vec<i64>>,
    pub use_markdown: Option<bool>,
    pub buttons: Option<serde_json::Value>,
}

/// Filter + pagination of push listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListPushesQuery {
    pub status: Option<PushStatus>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

/// Filter + pagination of delivery log listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListLogsQuery {
    pub status: Option<DeliveryStatus>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

/// Clamp client pagination into `(offset, limit)`.
pub(crate) fn page(skip: Option<i64>, limit: Option<i64>) -> (i64, i64) {
    let offset = skip.unwrap_or(0).max(0);
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    (offset, limit)
}

impl PushService {
    /// Create a new push.
    pub async fn create(
        pool: &PgPool,
        created_by: Option<i64>,
        params: &CreatePushParams,
    ) -> Result<Push, AppError> {
        if params.title.trim().is_empty() {
            return Err(AppError::Validation("title must not be empty".to_string()));
        }
        Self::validate_content(&params.content_type, params.media_url.as_deref())?;
        Self::validate_targets(&params.target_recipient_ids)?;
        let buttons = Self::validate_buttons(params.buttons.as_ref())?;

        let status = if params.scheduled_time.is_some() {
            PushStatus::Scheduled
        } else {
            PushStatus::Draft
        };

        let row: PushRow = sqlx::query_as(
            r#"
            INSERT INTO pushes (title, content, content_type, media_url, scheduled_time, status,
                                target_recipient_ids, created_by, use_markdown, buttons)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(&params.title)
        .bind(&params.content)
        .bind(&params.content_type)
        .bind(&params.media_url)
        .bind(params.scheduled_time)
        .bind(status.as_str())
        .bind(TargetList::Ids(params.target_recipient_ids.clone()).encode())
        .bind(created_by)
        .bind(params.use_markdown)
        .bind(buttons.map(|b| b.encode()))
        .fetch_one(pool)
        .await?;

        let push = Push::try_from(row)?;

        tracing::info!(
            push_id = push.push_id,
            status = %push.status,
            targets = params.target_recipient_ids.len(),
            "Push created"
        );

        Ok(push)
    }

    /// List pushes, newest first.
    pub async fn list(pool: &PgPool, query: &ListPushesQuery) -> Result<Vec<Push>, AppError> {
        let (offset, limit) = page(query.skip, query.limit);

        let rows: Vec<PushRow> = sqlx::query_as(
            r#"
            SELECT * FROM pushes
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC, push_id DESC
            OFFSET $2 LIMIT $3
            "#,
        )
        .bind(query.status.map(|s| s.as_str()))
        .bind(offset)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        decode_pushes(rows)
    }

    /// Get a single push by ID.
    pub async fn get(pool: &PgPool, push_id: PushId) -> Result<Push, AppError> {
        let row: PushRow = sqlx::query_as("SELECT * FROM pushes WHERE push_id = $1")
            .bind(push_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Push {} not found", push_id)))?;

        Push::try_from(row)
    }

    /// Update a draft or scheduled push.
    ///
    /// Supplying `scheduled_time` moves the push to `scheduled`; otherwise the
    /// stored status is left as the row has it at write time.
    pub async fn update(
        pool: &PgPool,
        push_id: PushId,
        params: &UpdatePushParams,
    ) -> Result<Push, AppError> {
        let existing = Self::get(pool, push_id).await?;
        Self::ensure_mutable(&existing)?;

        let title = params.title.clone().unwrap_or(existing.title);
        if title.trim().is_empty() {
            return Err(AppError::Validation("title must not be empty".to_string()));
        }
        let content = params.content.clone().unwrap_or(existing.content);
        let content_type = params
            .content_type
            .clone()
            .unwrap_or(existing.content_type);
        let media_url = params.media_url.clone().or(existing.media_url);
        Self::validate_content(&content_type, media_url.as_deref())?;

        let targets = match &params.target_recipient_ids {
            Some(ids) => {
                Self::validate_targets(ids)?;
                TargetList::Ids(ids.clone())
            }
            None => existing.target_recipient_ids,
        };

        let buttons = match &params.buttons {
            Some(value) => Self::validate_buttons(Some(value))?,
            None => existing.buttons,
        };

        let scheduled_time = params.scheduled_time.or(existing.scheduled_time);
        let reschedule = params.scheduled_time.is_some();
        let use_markdown = params.use_markdown.unwrap_or(existing.use_markdown);

        let row: Option<PushRow> = sqlx::query_as(
            r#"
            UPDATE pushes
            SET title = $1, content = $2, content_type = $3, media_url = $4,
                scheduled_time = $5,
                status = CASE WHEN $6 THEN 'scheduled' ELSE status END,
                target_recipient_ids = $7,
                use_markdown = $8, buttons = $9, updated_at = NOW()
            WHERE push_id = $10 AND status IN ('draft', 'scheduled')
            RETURNING *
            "#,
        )
        .bind(&title)
        .bind(&content)
        .bind(&content_type)
        .bind(&media_url)
        .bind(scheduled_time)
        .bind(reschedule)
        .bind(targets.encode())
        .bind(use_markdown)
        .bind(buttons.map(|b| b.encode()))
        .bind(push_id)
        .fetch_optional(pool)
        .await?;

        // Lost a race with a dispatch start or a cancel
        let Some(row) = row else {
            let current = Self::get(pool, push_id).await?;
            return Err(Self::immutable(&current));
        };

        let push = Push::try_from(row)?;
        tracing::info!(push_id, status = %push.status, "Push updated");
        Ok(push)
    }

    /// Delete a draft or scheduled push.
    pub async fn delete(pool: &PgPool, push_id: PushId) -> Result<(), AppError> {
        let result =
            sqlx::query("DELETE FROM pushes WHERE push_id = $1 AND status IN ('draft', 'scheduled')")
                .bind(push_id)
                .execute(pool)
                .await?;

        if result.rows_affected() == 0 {
            let current = Self::get(pool, push_id).await?;
            return Err(Self::immutable(&current));
        }

        tracing::info!(push_id, "Push deleted");
        Ok(())
    }

    /// Cancel a draft or scheduled push.
    pub async fn cancel(pool: &PgPool, push_id: PushId) -> Result<Push, AppError> {
        let machine = PushStateMachine::new(Arc::new(PgStore::new(pool.clone())));

        match machine.cancel(push_id).await {
            Ok(()) => {}
            Err(TransitionError::Conflict { .. }) => {
                let current = Self::get(pool, push_id).await?;
                return Err(AppError::Conflict(format!(
                    "Push {} cannot be cancelled while {}",
                    push_id, current.status
                )));
            }
            Err(TransitionError::Store(e)) => return Err(e),
            Err(e) => return Err(AppError::Internal(e.to_string())),
        }

        Self::get(pool, push_id).await
    }

    /// Delivery log rows of a push, oldest first.
    pub async fn logs(
        pool: &PgPool,
        push_id: PushId,
        query: &ListLogsQuery,
    ) -> Result<Vec<DeliveryLog>, AppError> {
        // 404 for unknown pushes rather than an empty page
        Self::get(pool, push_id).await?;

        let (offset, limit) = page(query.skip, query.limit);
        let rows: Vec<LogRow> = sqlx::query_as(
            r#"
            SELECT * FROM delivery_logs
            WHERE push_id = $1 AND ($2::text IS NULL OR status = $2)
            ORDER BY log_id
            OFFSET $3 LIMIT $4
            "#,
        )
        .bind(push_id)
        .bind(query.status.map(|s| s.as_str()))
        .bind(offset)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        decode_logs(rows)
    }

    fn ensure_mutable(push: &Push) -> Result<(), AppError> {
        if is_mutable(push.status) {
            Ok(())
        } else {
            Err(Self::immutable(push))
        }
    }

    fn immutable(push: &Push) -> AppError {
        AppError::Conflict(format!(
            "Push {} is {} and can no longer be modified",
            push.push_id, push.status
        ))
    }

    fn validate_content(content_type: &str, media_url: Option<&str>) -> Result<(), AppError> {
        let kind: ContentType = content_type.parse().map_err(|raw| {
            AppError::Validation(format!(
                "Invalid content_type '{}'. Valid types: {}",
                raw,
                ContentType::ALL.join(", ")
            ))
        })?;

        let has_media = media_url.is_some_and(|m| !m.trim().is_empty());
        if kind.media_kind().is_some() && !has_media {
            return Err(AppError::Validation(format!(
                "content_type '{}' requires media_url",
                kind
            )));
        }
        Ok(())
    }

    fn validate_targets(ids: &[i64]) -> Result<(), AppError> {
        if ids.is_empty() {
            return Err(AppError::Validation(
                "target_recipient_ids must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_buttons(value: Option<&serde_json::Value>) -> Result<Option<ButtonSpec>, AppError> {
        match value {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(v @ serde_json::Value::Array(_)) => {
                let spec = ButtonSpec::decode(v);
                Ok((!spec.is_empty()).then_some(spec))
            }
            Some(_) => Err(AppError::Validation(
                "buttons must be an array of buttons or button rows".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_clamps() {
        assert_eq!(page(None, None), (0, DEFAULT_PAGE_SIZE));
        assert_eq!(page(Some(-5), Some(0)), (0, 1));
        assert_eq!(page(Some(40), Some(10_000)), (40, MAX_PAGE_SIZE));
    }

    #[test]
    fn test_validate_content() {
        assert!(PushService::validate_content("text", None).is_ok());
        assert!(PushService::validate_content("photo", Some("file-id")).is_ok());
        assert!(matches!(
            PushService::validate_content("photo", Some("   ")),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            PushService::validate_content("video", None),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            PushService::validate_content("sticker", None),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_targets_rejects_empty() {
        assert!(PushService::validate_targets(&[]).is_err());
        assert!(PushService::validate_targets(&[1]).is_ok());
    }

    #[test]
    fn test_validate_buttons() {
        assert_eq!(PushService::validate_buttons(None).unwrap(), None);
        assert_eq!(
            PushService::validate_buttons(Some(&serde_json::Value::Null)).unwrap(),
            None
        );
        assert!(PushService::validate_buttons(Some(&serde_json::json!({"text": "x"}))).is_err());

        let spec = PushService::validate_buttons(Some(&serde_json::json!([
            {"text": "Open", "url": "https://example.com"}
        ])))
        .unwrap()
        .unwrap();
        assert_eq!(spec.rows.len(), 1);
    }

    #[test]
    fn test_create_params_defaults() {
        let params: CreatePushParams = serde_json::from_value(serde_json::json!({
            "title": "Launch",
            "content": "We are live",
            "target_recipient_ids": [1, 2]
        }))
        .unwrap();
        assert_eq!(params.content_type, "text");
        assert!(!params.use_markdown);
        assert!(params.scheduled_time.is_none());
    }
}
