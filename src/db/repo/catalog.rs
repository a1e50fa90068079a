//! Tiers, affiliate programs and commission boosts.

use super::{decimal_col, opt_time_col, opt_uuid_col, parse_col, time_col, uuid_col, Repository};
use crate::domain::{AffiliateProgram, CommissionBoost, CommissionTier, TimeMs};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

fn row_to_tier(row: &SqliteRow) -> Result<CommissionTier, sqlx::Error> {
    Ok(CommissionTier {
        name: row.try_get("name")?,
        min_sales: row.try_get("min_sales")?,
        ambassador_rate_affiliate: decimal_col(row, "ambassador_rate_affiliate")?,
        ambassador_rate_dropship: decimal_col(row, "ambassador_rate_dropship")?,
        sponsor_rate: decimal_col(row, "sponsor_rate")?,
    })
}

fn row_to_boost(row: &SqliteRow) -> Result<CommissionBoost, sqlx::Error> {
    Ok(CommissionBoost {
        id: uuid_col(row, "id")?,
        dimension: parse_col(row, "dimension")?,
        value: decimal_col(row, "value")?,
        user_id: opt_uuid_col(row, "user_id")?,
        active: row.try_get::<i64, _>("active")? != 0,
        start_ms: time_col(row, "start_ms")?,
        end_ms: opt_time_col(row, "end_ms")?,
        max_uses: row.try_get("max_uses")?,
        current_uses: row.try_get("current_uses")?,
        created_at: time_col(row, "created_at")?,
    })
}

/// All tiers, ascending by `min_sales`.
pub async fn load_tiers(conn: &mut SqliteConnection) -> Result<Vec<CommissionTier>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT name, min_sales, ambassador_rate_affiliate, ambassador_rate_dropship, sponsor_rate
        FROM commission_tiers
        ORDER BY min_sales ASC
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(row_to_tier).collect()
}

pub async fn fetch_program(
    conn: &mut SqliteConnection,
    id: Uuid,
) -> Result<Option<AffiliateProgram>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT id, name, buyer_cashback_rate, avg_commission_rate FROM affiliate_programs WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|r| -> Result<AffiliateProgram, sqlx::Error> {
        Ok(AffiliateProgram {
            id: uuid_col(&r, "id")?,
            name: r.try_get("name")?,
            buyer_cashback_rate: decimal_col(&r, "buyer_cashback_rate")?,
            avg_commission_rate: decimal_col(&r, "avg_commission_rate")?,
        })
    })
    .transpose()
}

/// Boosts that could apply to `ambassador` at `now`.
///
/// The SQL narrows by scope and window; callers still run
/// `CommissionBoost::is_eligible` on the result.
pub async fn load_candidate_boosts(
    conn: &mut SqliteConnection,
    ambassador: Uuid,
    now: TimeMs,
) -> Result<Vec<CommissionBoost>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, dimension, value, user_id, active, start_ms, end_ms,
               max_uses, current_uses, created_at
        FROM commission_boosts
        WHERE active = 1
          AND start_ms <= ?
          AND (end_ms IS NULL OR end_ms >= ?)
          AND (max_uses IS NULL OR current_uses < max_uses)
          AND (user_id IS NULL OR user_id = ?)
        ORDER BY (user_id IS NULL) ASC, created_at ASC
        "#,
    )
    .bind(now.as_ms())
    .bind(now.as_ms())
    .bind(ambassador.to_string())
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(row_to_boost).collect()
}

pub async fn increment_boost_uses(
    conn: &mut SqliteConnection,
    boost_ids: &[Uuid],
) -> Result<(), sqlx::Error> {
    for id in boost_ids {
        sqlx::query("UPDATE commission_boosts SET current_uses = current_uses + 1 WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

impl Repository {
    /// Insert or replace a tier by name.
    pub async fn upsert_tier(&self, tier: &CommissionTier) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO commission_tiers (
                name, min_sales, ambassador_rate_affiliate, ambassador_rate_dropship, sponsor_rate
            ) VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                min_sales = excluded.min_sales,
                ambassador_rate_affiliate = excluded.ambassador_rate_affiliate,
                ambassador_rate_dropship = excluded.ambassador_rate_dropship,
                sponsor_rate = excluded.sponsor_rate
            "#,
        )
        .bind(&tier.name)
        .bind(tier.min_sales)
        .bind(tier.ambassador_rate_affiliate.to_canonical_string())
        .bind(tier.ambassador_rate_dropship.to_canonical_string())
        .bind(tier.sponsor_rate.to_canonical_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_program(&self, program: &AffiliateProgram) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO affiliate_programs (id, name, buyer_cashback_rate, avg_commission_rate)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(program.id.to_string())
        .bind(&program.name)
        .bind(program.buyer_cashback_rate.to_canonical_string())
        .bind(program.avg_commission_rate.to_canonical_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_boost(&self, boost: &CommissionBoost) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO commission_boosts (
                id, dimension, value, user_id, active, start_ms, end_ms,
                max_uses, current_uses, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(boost.id.to_string())
        .bind(boost.dimension.as_str())
        .bind(boost.value.to_canonical_string())
        .bind(boost.user_id.map(|u| u.to_string()))
        .bind(boost.active as i64)
        .bind(boost.start_ms.as_ms())
        .bind(boost.end_ms.map(|t| t.as_ms()))
        .bind(boost.max_uses)
        .bind(boost.current_uses)
        .bind(boost.created_at.as_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_boost(&self, id: Uuid) -> Result<Option<CommissionBoost>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, dimension, value, user_id, active, start_ms, end_ms,
                   max_uses, current_uses, created_at
            FROM commission_boosts WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_boost).transpose()
    }
}
