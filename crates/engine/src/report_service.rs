//! Read-only reporting: cross-push delivery logs and dashboard counters.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use pushcast_common::error::AppError;
use pushcast_common::types::{DeliveryLog, DeliveryStatus, PushId, RecipientId};

use crate::pg_store::{LogRow, decode_logs};
use crate::push_service::page;

pub struct ReportService;

/// Filter + pagination of the delivery log across all pushes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogFilter {
    pub push_id: Option<PushId>,
    pub recipient_id: Option<RecipientId>,
    pub status: Option<DeliveryStatus>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

/// Headline counters for the operator dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub recipient_count: i64,
    pub active_recipient_count: i64,
    pub push_count: i64,
    pub completed_push_count: i64,
    pub sent_log_count: i64,
    pub failed_log_count: i64,
    /// Percentage of attempts that ended `sent`, 0 when nothing was attempted.
    pub success_rate: f64,
}

/// `sent / (sent + failed)` as a percentage.
pub fn success_rate(sent: i64, failed: i64) -> f64 {
    let attempted = sent + failed;
    if attempted <= 0 {
        return 0.0;
    }
    sent as f64 / attempted as f64 * 100.0
}

impl ReportService {
    /// Delivery log rows matching `filter`, newest first.
    pub async fn logs(pool: &PgPool, filter: &LogFilter) -> Result<Vec<DeliveryLog>, AppError> {
        let (offset, limit) = page(filter.skip, filter.limit);

        let rows: Vec<LogRow> = sqlx::query_as(
            r#"
            SELECT * FROM delivery_logs
            WHERE ($1::bigint IS NULL OR push_id = $1)
              AND ($2::bigint IS NULL OR recipient_id = $2)
              AND ($3::text IS NULL OR status = $3)
            ORDER BY log_id DESC
            OFFSET $4 LIMIT $5
            "#,
        )
        .bind(filter.push_id)
        .bind(filter.recipient_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(offset)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        decode_logs(rows)
    }

    /// Aggregate counters over recipients, pushes and the delivery log.
    pub async fn stats(pool: &PgPool) -> Result<DashboardStats, AppError> {
        let (recipients, active, pushes, completed, sent, failed): (i64, i64, i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM recipients),
                    (SELECT COUNT(*) FROM recipients WHERE is_active),
                    (SELECT COUNT(*) FROM pushes),
                    (SELECT COUNT(*) FROM pushes WHERE status = 'completed'),
                    (SELECT COUNT(*) FROM delivery_logs WHERE status = 'sent'),
                    (SELECT COUNT(*) FROM delivery_logs WHERE status = 'failed')
                "#,
            )
            .fetch_one(pool)
            .await?;

        Ok(DashboardStats {
            recipient_count: recipients,
            active_recipient_count: active,
            push_count: pushes,
            completed_push_count: completed,
            sent_log_count: sent,
            failed_log_count: failed,
            success_rate: success_rate(sent, failed),
        })
    }
}
