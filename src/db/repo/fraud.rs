//! Outbound clicks and fraud flags.

use super::{parse_col, time_col, uuid_col, Repository};
use crate::domain::{FlagStatus, FraudFlag, FraudType, Severity, TimeMs};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

const FLAG_COLUMNS: &str = "id, user_id, type, severity, status, details, created_at";

fn row_to_flag(row: &SqliteRow) -> Result<FraudFlag, sqlx::Error> {
    let details: String = row.try_get("details")?;
    Ok(FraudFlag {
        id: uuid_col(row, "id")?,
        user_id: uuid_col(row, "user_id")?,
        kind: parse_col(row, "type")?,
        severity: parse_col(row, "severity")?,
        status: parse_col(row, "status")?,
        details: serde_json::from_str(&details).unwrap_or(serde_json::Value::Null),
        created_at: time_col(row, "created_at")?,
    })
}

impl Repository {
    pub async fn record_click(&self, ambassador: Uuid, at: TimeMs) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO clicks (ambassador_id, created_at) VALUES (?, ?)")
            .bind(ambassador.to_string())
            .bind(at.as_ms())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn count_clicks_since(&self, ambassador: Uuid, since: TimeMs) -> Result<i64, sqlx::Error> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM clicks WHERE ambassador_id = ? AND created_at >= ?",
        )
        .bind(ambassador.to_string())
        .bind(since.as_ms())
        .fetch_one(&self.pool)
        .await?;
        row.try_get("n")
    }

    pub async fn find_pending_flag(
        &self,
        user_id: Uuid,
        kind: FraudType,
    ) -> Result<Option<FraudFlag>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM fraud_flags WHERE user_id = ? AND type = ? AND status = 'pending'",
            FLAG_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(user_id.to_string())
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_flag).transpose()
    }

    /// Insert a pending flag unless one already exists for `(user, type)`.
    ///
    /// Returns the new flag, or `None` when an existing pending flag won.
    /// The partial unique index makes concurrent inserts collapse to one row.
    pub async fn insert_flag_if_new(
        &self,
        user_id: Uuid,
        kind: FraudType,
        severity: Severity,
        details: &serde_json::Value,
    ) -> Result<Option<FraudFlag>, sqlx::Error> {
        if self.find_pending_flag(user_id, kind).await?.is_some() {
            return Ok(None);
        }

        let flag = FraudFlag {
            id: Uuid::new_v4(),
            user_id,
            kind,
            severity,
            status: FlagStatus::Pending,
            details: details.clone(),
            created_at: TimeMs::now(),
        };

        let result = sqlx::query(
            r#"
            INSERT INTO fraud_flags (id, user_id, type, severity, status, details, created_at)
            VALUES (?, ?, ?, ?, 'pending', ?, ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(flag.id.to_string())
        .bind(user_id.to_string())
        .bind(kind.as_str())
        .bind(severity.as_str())
        .bind(details.to_string())
        .bind(flag.created_at.as_ms())
        .execute(&self.pool)
        .await?;

        Ok((result.rows_affected() > 0).then_some(flag))
    }

    pub async fn list_flags_for_user(&self, user_id: Uuid) -> Result<Vec<FraudFlag>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM fraud_flags WHERE user_id = ? ORDER BY created_at ASC, id ASC",
            FLAG_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_flag).collect()
    }

    /// Move a pending flag to a review outcome. Returns `false` if the flag
    /// does not exist or was already reviewed.
    pub async fn resolve_flag(&self, id: Uuid, status: FlagStatus) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE fraud_flags SET status = ?, resolved_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(status.as_str())
        .bind(TimeMs::now().as_ms())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
