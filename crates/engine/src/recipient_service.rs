//! Operator-facing management of registered recipients.
//!
//! Recipients are created by the bot's registration flow; operators can only
//! read them, correct their profile fields and toggle `is_active`, which the
//! selector consults on every dispatch.

use serde::Deserialize;
use sqlx::PgPool;

use pushcast_common::error::AppError;
use pushcast_common::types::{DeliveryLog, Recipient, RecipientId};

use crate::push_service::{ListLogsQuery, page};
use crate::report_service::{LogFilter, ReportService};

/// Service layer for recipient operations.
pub struct RecipientService;

/// Filter + pagination of recipient listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListRecipientsQuery {
    #[serde(default)]
    pub active_only: bool,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

/// Profile fields an operator may correct. Absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRecipientParams {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: Option<bool>,
}

impl UpdateRecipientParams {
    fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.is_active.is_none()
    }
}

impl RecipientService {
    /// List recipients in registration order.
    pub async fn list(pool: &PgPool, query: &ListRecipientsQuery) -> Result<Vec<Recipient>, AppError> {
        let (offset, limit) = page(query.skip, query.limit);

        let recipients: Vec<Recipient> = sqlx::query_as(
            r#"
            SELECT * FROM recipients
            WHERE (NOT $1 OR is_active)
            ORDER BY recipient_id
            OFFSET $2 LIMIT $3
            "#,
        )
        .bind(query.active_only)
        .bind(offset)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(recipients)
    }

    /// Get a single recipient by ID.
    pub async fn get(pool: &PgPool, recipient_id: RecipientId) -> Result<Recipient, AppError> {
        sqlx::query_as::<_, Recipient>("SELECT * FROM recipients WHERE recipient_id = $1")
            .bind(recipient_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Recipient {} not found", recipient_id)))
    }

    /// Update profile fields and/or the active flag.
    pub async fn update(
        pool: &PgPool,
        recipient_id: RecipientId,
        params: &UpdateRecipientParams,
    ) -> Result<Recipient, AppError> {
        if params.is_empty() {
            return Err(AppError::Validation("No fields to update".to_string()));
        }

        let recipient: Recipient = sqlx::query_as(
            r#"
            UPDATE recipients
            SET username = COALESCE($1, username),
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                is_active = COALESCE($4, is_active),
                updated_at = NOW()
            WHERE recipient_id = $5
            RETURNING *
            "#,
        )
        .bind(&params.username)
        .bind(&params.first_name)
        .bind(&params.last_name)
        .bind(params.is_active)
        .bind(recipient_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Recipient {} not found", recipient_id)))?;

        tracing::info!(recipient_id, is_active = recipient.is_active, "Recipient updated");
        Ok(recipient)
    }

    /// Activate or deactivate a recipient. Inactive recipients are skipped by
    /// every dispatch that has not attempted them yet.
    pub async fn set_active(
        pool: &PgPool,
        recipient_id: RecipientId,
        is_active: bool,
    ) -> Result<Recipient, AppError> {
        let params = UpdateRecipientParams {
            is_active: Some(is_active),
            ..Default::default()
        };
        Self::update(pool, recipient_id, &params).await
    }

    /// Delivery log rows addressed to a recipient, newest first.
    pub async fn logs(
        pool: &PgPool,
        recipient_id: RecipientId,
        query: &ListLogsQuery,
    ) -> Result<Vec<DeliveryLog>, AppError> {
        Self::get(pool, recipient_id).await?;

        let filter = LogFilter {
            recipient_id: Some(recipient_id),
            status: query.status,
            skip: query.skip,
            limit: query.limit,
            ..Default::default()
        };
        ReportService::logs(pool, &filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_defaults() {
        let query: ListRecipientsQuery = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(!query.active_only);
        assert!(query.skip.is_none());
    }

    #[test]
    fn test_update_params_emptiness() {
        assert!(UpdateRecipientParams::default().is_empty());

        let params: UpdateRecipientParams =
            serde_json::from_value(serde_json::json!({"is_active": false})).unwrap();
        assert!(!params.is_empty());
        assert_eq!(params.is_active, Some(false));
    }
}
