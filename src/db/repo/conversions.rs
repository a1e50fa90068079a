//! Conversion rows.

use super::{decimal_col, opt_time_col, opt_uuid_col, parse_col, time_col, uuid_col, Repository};
use crate::domain::{AppliedRates, Conversion, ConversionStatus, Shares, TimeMs};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

const CONVERSION_COLUMNS: &str = r#"
    id, ambassador_id, sponsor_id, buyer_user_id, affiliate_program_id, sale_type,
    order_ref, amount, commission_total,
    ambassador_share, sponsor_share, buyer_share, platform_share,
    applied_ambassador_rate, applied_sponsor_rate, applied_buyer_rate, applied_platform_rate,
    status, created_at, confirmed_at, paid_at
"#;

fn row_to_conversion(row: &SqliteRow) -> Result<Conversion, sqlx::Error> {
    Ok(Conversion {
        id: uuid_col(row, "id")?,
        ambassador_id: uuid_col(row, "ambassador_id")?,
        sponsor_id: opt_uuid_col(row, "sponsor_id")?,
        buyer_user_id: opt_uuid_col(row, "buyer_user_id")?,
        affiliate_program_id: uuid_col(row, "affiliate_program_id")?,
        sale_type: parse_col(row, "sale_type")?,
        order_ref: row.try_get("order_ref")?,
        amount: decimal_col(row, "amount")?,
        commission_total: decimal_col(row, "commission_total")?,
        shares: Shares {
            ambassador: decimal_col(row, "ambassador_share")?,
            sponsor: decimal_col(row, "sponsor_share")?,
            buyer: decimal_col(row, "buyer_share")?,
            platform: decimal_col(row, "platform_share")?,
        },
        rates: AppliedRates {
            ambassador: decimal_col(row, "applied_ambassador_rate")?,
            sponsor: decimal_col(row, "applied_sponsor_rate")?,
            buyer: decimal_col(row, "applied_buyer_rate")?,
            platform: decimal_col(row, "applied_platform_rate")?,
        },
        status: parse_col(row, "status")?,
        created_at: time_col(row, "created_at")?,
        confirmed_at: opt_time_col(row, "confirmed_at")?,
        paid_at: opt_time_col(row, "paid_at")?,
    })
}

/// Insert a new conversion row.
///
/// A repeated `(order_ref, affiliate_program_id)` fails on the unique index.
pub async fn insert_conversion(
    conn: &mut SqliteConnection,
    c: &Conversion,
) -> Result<(), sqlx::Error> {
    let sql = format!(
        "INSERT INTO conversions ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        CONVERSION_COLUMNS
    );
    sqlx::query(&sql)
        .bind(c.id.to_string())
        .bind(c.ambassador_id.to_string())
        .bind(c.sponsor_id.map(|id| id.to_string()))
        .bind(c.buyer_user_id.map(|id| id.to_string()))
        .bind(c.affiliate_program_id.to_string())
        .bind(c.sale_type.as_str())
        .bind(c.order_ref.as_deref())
        .bind(c.amount.to_canonical_string())
        .bind(c.commission_total.to_canonical_string())
        .bind(c.shares.ambassador.to_canonical_string())
        .bind(c.shares.sponsor.to_canonical_string())
        .bind(c.shares.buyer.to_canonical_string())
        .bind(c.shares.platform.to_canonical_string())
        .bind(c.rates.ambassador.to_canonical_string())
        .bind(c.rates.sponsor.to_canonical_string())
        .bind(c.rates.buyer.to_canonical_string())
        .bind(c.rates.platform.to_canonical_string())
        .bind(c.status.as_str())
        .bind(c.created_at.as_ms())
        .bind(c.confirmed_at.map(|t| t.as_ms()))
        .bind(c.paid_at.map(|t| t.as_ms()))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Take the write lock via the conversion row. Same discipline as
/// [`super::users::lock_user`]; returns `false` if the conversion is missing.
pub async fn lock_conversion(conn: &mut SqliteConnection, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE conversions SET status = status WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn fetch_conversion(
    conn: &mut SqliteConnection,
    id: Uuid,
) -> Result<Option<Conversion>, sqlx::Error> {
    let sql = format!("SELECT {} FROM conversions WHERE id = ?", CONVERSION_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(row_to_conversion).transpose()
}

/// Compare-and-set the status. Returns `false` if the row was not in `from`.
pub async fn update_status(
    conn: &mut SqliteConnection,
    id: Uuid,
    from: ConversionStatus,
    to: ConversionStatus,
    at: TimeMs,
    reason: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE conversions SET
            status = ?,
            confirmed_at = CASE WHEN ? = 'confirmed' THEN ? ELSE confirmed_at END,
            paid_at = CASE WHEN ? = 'paid' THEN ? ELSE paid_at END,
            cancelled_at = CASE WHEN ? = 'cancelled' THEN ? ELSE cancelled_at END,
            cancel_reason = COALESCE(?, cancel_reason)
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(to.as_str())
    .bind(to.as_str())
    .bind(at.as_ms())
    .bind(to.as_str())
    .bind(at.as_ms())
    .bind(to.as_str())
    .bind(at.as_ms())
    .bind(reason)
    .bind(id.to_string())
    .bind(from.as_str())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_payout(
    conn: &mut SqliteConnection,
    id: Uuid,
    payout_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE conversions SET payout_id = ? WHERE id = ?")
        .bind(payout_id.to_string())
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

impl Repository {
    pub async fn get_conversion(&self, id: Uuid) -> Result<Option<Conversion>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        fetch_conversion(&mut conn, id).await
    }

    /// Existing conversion for an external order, if any.
    pub async fn find_conversion_by_order_ref(
        &self,
        order_ref: &str,
        program_id: Uuid,
    ) -> Result<Option<Conversion>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM conversions WHERE order_ref = ? AND affiliate_program_id = ?",
            CONVERSION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(order_ref)
            .bind(program_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_conversion).transpose()
    }

    /// Conversions credited to an ambassador at or after `since`.
    pub async fn count_conversions_since(
        &self,
        ambassador: Uuid,
        since: TimeMs,
    ) -> Result<i64, sqlx::Error> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM conversions WHERE ambassador_id = ? AND created_at >= ?",
        )
        .bind(ambassador.to_string())
        .bind(since.as_ms())
        .fetch_one(&self.pool)
        .await?;
        row.try_get("n")
    }

    pub async fn list_conversions_for_ambassador(
        &self,
        ambassador: Uuid,
    ) -> Result<Vec<Conversion>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM conversions WHERE ambassador_id = ? ORDER BY created_at ASC, id ASC",
            CONVERSION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(ambassador.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_conversion).collect()
    }
}
