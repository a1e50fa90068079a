//! Cashback ledger rows, admin audit log and payout batches.

use super::{decimal_col, opt_uuid_col, parse_col, time_col, uuid_col, Repository};
use crate::domain::{CashbackTransaction, Decimal, TimeMs};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

fn row_to_cashback(row: &SqliteRow) -> Result<CashbackTransaction, sqlx::Error> {
    Ok(CashbackTransaction {
        id: uuid_col(row, "id")?,
        user_id: uuid_col(row, "user_id")?,
        conversion_id: opt_uuid_col(row, "conversion_id")?,
        kind: parse_col(row, "type")?,
        amount: decimal_col(row, "amount")?,
        balance_after: decimal_col(row, "balance_after")?,
        note: row.try_get("note")?,
        created_at: time_col(row, "created_at")?,
    })
}

pub async fn insert_cashback_transaction(
    conn: &mut SqliteConnection,
    tx: &CashbackTransaction,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO cashback_transactions (
            id, user_id, conversion_id, type, amount, balance_after, note, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(tx.id.to_string())
    .bind(tx.user_id.to_string())
    .bind(tx.conversion_id.map(|id| id.to_string()))
    .bind(tx.kind.as_str())
    .bind(tx.amount.to_canonical_string())
    .bind(tx.balance_after.to_canonical_string())
    .bind(tx.note.as_deref())
    .bind(tx.created_at.as_ms())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// One admin action against an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub actor_id: Uuid,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub details: Option<String>,
    pub created_at: TimeMs,
}

pub async fn insert_audit(conn: &mut SqliteConnection, entry: &AuditEntry) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO audit_log (
            actor_id, action, entity_type, entity_id, old_value, new_value, details, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.actor_id.to_string())
    .bind(&entry.action)
    .bind(&entry.entity_type)
    .bind(&entry.entity_id)
    .bind(entry.old_value.as_deref())
    .bind(entry.new_value.as_deref())
    .bind(entry.details.as_deref())
    .bind(entry.created_at.as_ms())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn insert_payout(
    conn: &mut SqliteConnection,
    id: Uuid,
    actor_id: Uuid,
    total: Decimal,
    conversion_count: i64,
    at: TimeMs,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO payouts (id, actor_id, total, conversion_count, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(actor_id.to_string())
    .bind(total.to_canonical_string())
    .bind(conversion_count)
    .bind(at.as_ms())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// A user's cashback history in the order it was applied.
pub async fn list_cashback_in(
    conn: &mut SqliteConnection,
    user_id: Uuid,
) -> Result<Vec<CashbackTransaction>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, user_id, conversion_id, type, amount, balance_after, note, created_at
        FROM cashback_transactions
        WHERE user_id = ?
        ORDER BY seq ASC
        "#,
    )
    .bind(user_id.to_string())
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(row_to_cashback).collect()
}

impl Repository {
    pub async fn list_cashback_transactions(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<CashbackTransaction>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        list_cashback_in(&mut conn, user_id).await
    }

    pub async fn list_cashback_for_conversion(
        &self,
        conversion_id: Uuid,
    ) -> Result<Vec<CashbackTransaction>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, conversion_id, type, amount, balance_after, note, created_at
            FROM cashback_transactions
            WHERE conversion_id = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(conversion_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_cashback).collect()
    }

    pub async fn list_audit(&self, entity_id: &str) -> Result<Vec<AuditEntry>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT actor_id, action, entity_type, entity_id, old_value, new_value, details, created_at
            FROM audit_log
            WHERE entity_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| -> Result<AuditEntry, sqlx::Error> {
                Ok(AuditEntry {
                    actor_id: uuid_col(r, "actor_id")?,
                    action: r.try_get("action")?,
                    entity_type: r.try_get("entity_type")?,
                    entity_id: r.try_get("entity_id")?,
                    old_value: r.try_get("old_value")?,
                    new_value: r.try_get("new_value")?,
                    details: r.try_get("details")?,
                    created_at: time_col(r, "created_at")?,
                })
            })
            .collect()
    }
}
