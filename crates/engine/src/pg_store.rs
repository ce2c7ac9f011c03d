//! PostgreSQL persistence adapter.
//!
//! JSON columns (`target_recipient_ids`, `buttons`) are decoded into typed
//! fields here and nowhere else.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};

use pushcast_common::error::AppError;
use pushcast_common::types::{
    AttemptOutcome, ButtonSpec, DeliveryLog, MessageRef, NewDeliveryLog, Push, PushId, PushStatus,
    Recipient, RecipientId, TargetList,
};

use crate::store::{PushStore, RecipientStore};

/// Row shape of the `pushes` table.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PushRow {
    push_id: i64,
    title: String,
    content: String,
    content_type: String,
    media_url: Option<String>,
    scheduled_time: Option<DateTime<Utc>>,
    status: String,
    target_recipient_ids: serde_json::Value,
    created_by: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    sent_count: i64,
    delivered_count: i64,
    read_count: i64,
    use_markdown: bool,
    buttons: Option<serde_json::Value>,
}

impl TryFrom<PushRow> for Push {
    type Error = AppError;

    fn try_from(row: PushRow) -> Result<Self, Self::Error> {
        let status = row.status.parse().map_err(|e| {
            AppError::Internal(format!("push {} has invalid status: {}", row.push_id, e))
        })?;

        Ok(Push {
            push_id: row.push_id,
            title: row.title,
            content: row.content,
            content_type: row.content_type,
            media_url: row.media_url,
            scheduled_time: row.scheduled_time,
            status,
            target_recipient_ids: TargetList::decode(&row.target_recipient_ids),
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
            sent_count: row.sent_count,
            delivered_count: row.delivered_count,
            read_count: row.read_count,
            use_markdown: row.use_markdown,
            buttons: row
                .buttons
                .as_ref()
                .filter(|v| !v.is_null())
                .map(ButtonSpec::decode),
        })
    }
}

/// Row shape of the `delivery_logs` table.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct LogRow {
    log_id: i64,
    push_id: i64,
    recipient_id: i64,
    status: String,
    error_message: Option<String>,
    message_ref: Option<i64>,
    sent_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    read_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<LogRow> for DeliveryLog {
    type Error = AppError;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        let status = row.status.parse().map_err(|e| {
            AppError::Internal(format!("log {} has invalid status: {}", row.log_id, e))
        })?;

        Ok(DeliveryLog {
            log_id: row.log_id,
            push_id: row.push_id,
            recipient_id: row.recipient_id,
            status,
            error_message: row.error_message,
            message_ref: row.message_ref.map(MessageRef),
            sent_at: row.sent_at,
            delivered_at: row.delivered_at,
            read_at: row.read_at,
            created_at: row.created_at,
        })
    }
}

/// `PushStore` + `RecipientStore` over a PostgreSQL pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_log<'e, E>(executor: E, entry: &NewDeliveryLog) -> Result<(), AppError>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO delivery_logs (push_id, recipient_id, status, error_message, message_ref, sent_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.push_id)
        .bind(entry.recipient_id)
        .bind(entry.status().as_str())
        .bind(entry.error_message())
        .bind(entry.message_ref().map(|r| r.0))
        .bind(entry.sent_at())
        .execute(executor)
        .await?;
        Ok(())
    }

    async fn bump_sent_count<'e, E>(executor: E, push_id: PushId) -> Result<(), AppError>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query("UPDATE pushes SET sent_count = sent_count + 1 WHERE push_id = $1")
            .bind(push_id)
            .execute(executor)
            .await?;
        Ok(())
    }
}

/// Decode a list of push rows, failing on the first corrupt row.
pub(crate) fn decode_pushes(rows: Vec<PushRow>) -> Result<Vec<Push>, AppError> {
    rows.into_iter().map(Push::try_from).collect()
}

/// Decode a list of log rows, failing on the first corrupt row.
pub(crate) fn decode_logs(rows: Vec<LogRow>) -> Result<Vec<DeliveryLog>, AppError> {
    rows.into_iter().map(DeliveryLog::try_from).collect()
}

#[async_trait]
impl PushStore for PgStore {
    async fn load(&self, push_id: PushId) -> Result<Option<Push>, AppError> {
        let row: Option<PushRow> = sqlx::query_as("SELECT * FROM pushes WHERE push_id = $1")
            .bind(push_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Push::try_from).transpose()
    }

    async fn compare_and_set_status(
        &self,
        push_id: PushId,
        expected: &[PushStatus],
        next: PushStatus,
    ) -> Result<bool, AppError> {
        let expected: Vec<&str> = expected.iter().map(PushStatus::as_str).collect();

        // Single conditional UPDATE: the status check and the write cannot interleave
        let result = sqlx::query(
            r#"
            UPDATE pushes
            SET status = $1, updated_at = NOW()
            WHERE push_id = $2 AND status = ANY($3)
            "#,
        )
        .bind(next.as_str())
        .bind(push_id)
        .bind(&expected)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn append_log(&self, entry: &NewDeliveryLog) -> Result<(), AppError> {
        Self::insert_log(&self.pool, entry).await
    }

    async fn increment_sent_count(&self, push_id: PushId) -> Result<(), AppError> {
        Self::bump_sent_count(&self.pool, push_id).await
    }

    async fn record_attempt(&self, entry: &NewDeliveryLog) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        Self::insert_log(&mut *tx, entry).await?;
        if let AttemptOutcome::Sent { .. } = entry.outcome {
            Self::bump_sent_count(&mut *tx, entry.push_id).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn sent_logs(&self, push_id: PushId) -> Result<Vec<DeliveryLog>, AppError> {
        let rows: Vec<LogRow> = sqlx::query_as(
            "SELECT * FROM delivery_logs WHERE push_id = $1 AND status = 'sent' ORDER BY log_id",
        )
        .bind(push_id)
        .fetch_all(&self.pool)
        .await?;

        decode_logs(rows)
    }

    async fn due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<PushId>, AppError> {
        let ids: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT push_id FROM pushes
            WHERE status = 'scheduled' AND scheduled_time IS NOT NULL AND scheduled_time <= $1
            ORDER BY scheduled_time
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn cancel_orphaned_sending(
        &self,
        claimed_before: DateTime<Utc>,
    ) -> Result<Vec<PushId>, AppError> {
        let ids: Vec<(i64,)> = sqlx::query_as(
            r#"
            UPDATE pushes
            SET status = 'cancelled', updated_at = NOW()
            WHERE status = 'sending' AND updated_at < $1
            RETURNING push_id
            "#,
        )
        .bind(claimed_before)
        .fetch_all(&self.pool)
        .await?;

        let mut ids: Vec<PushId> = ids.into_iter().map(|(id,)| id).collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

#[async_trait]
impl RecipientStore for PgStore {
    async fn get(&self, recipient_id: RecipientId) -> Result<Option<Recipient>, AppError> {
        let recipient: Option<Recipient> =
            sqlx::query_as("SELECT * FROM recipients WHERE recipient_id = $1")
                .bind(recipient_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(recipient)
    }
}
