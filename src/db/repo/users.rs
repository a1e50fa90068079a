//! User rows: identity, sales counter, tier and cashback balance.

use super::{decimal_col, opt_uuid_col, parse_col, uuid_col, Repository};
use crate::domain::{Decimal, TimeMs, User};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

const USER_COLUMNS: &str =
    "id, email, role, total_sales, tier, cashback_balance, referred_by";

fn row_to_user(row: &SqliteRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: uuid_col(row, "id")?,
        email: row.try_get("email")?,
        role: parse_col(row, "role")?,
        total_sales: row.try_get("total_sales")?,
        tier: row.try_get("tier")?,
        cashback_balance: decimal_col(row, "cashback_balance")?,
        referred_by: opt_uuid_col(row, "referred_by")?,
    })
}

/// Take the write lock on a user row for the rest of the transaction.
///
/// SQLite has no row-level locks: the first write in a transaction takes the
/// database write lock instead, waiting out the busy timeout if another
/// writer holds it. Issue this before reading anything the transaction will
/// modify so the read sees the latest committed state.
///
/// Returns `false` if the user does not exist.
pub async fn lock_user(conn: &mut SqliteConnection, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE users SET locked_at = ? WHERE id = ?")
        .bind(TimeMs::now().as_ms())
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn fetch_user(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<User>, sqlx::Error> {
    let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(row_to_user).transpose()
}

pub async fn insert_user(conn: &mut SqliteConnection, user: &User) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO users (
            id, email, role, total_sales, tier, cashback_balance, referred_by, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user.id.to_string())
    .bind(&user.email)
    .bind(user.role.as_str())
    .bind(user.total_sales)
    .bind(&user.tier)
    .bind(user.cashback_balance.to_canonical_string())
    .bind(user.referred_by.map(|id| id.to_string()))
    .bind(TimeMs::now().as_ms())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn update_sales_and_tier(
    conn: &mut SqliteConnection,
    id: Uuid,
    total_sales: i64,
    tier: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET total_sales = ?, tier = ? WHERE id = ?")
        .bind(total_sales)
        .bind(tier)
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn update_cashback_balance(
    conn: &mut SqliteConnection,
    id: Uuid,
    balance: Decimal,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET cashback_balance = ? WHERE id = ?")
        .bind(balance.to_canonical_string())
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

impl Repository {
    /// Insert a new user.
    ///
    /// # Errors
    /// Returns an error on duplicate id/email or a dangling sponsor.
    pub async fn insert_user(&self, user: &User) -> Result<(), sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        insert_user(&mut conn, user).await
    }

    pub async fn get_user(&self, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        fetch_user(&mut conn, id).await
    }

    /// Re-point a user's sponsor. Existing conversions keep their snapshot.
    pub async fn set_sponsor(&self, id: Uuid, sponsor: Option<Uuid>) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET referred_by = ? WHERE id = ?")
            .bind(sponsor.map(|s| s.to_string()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
