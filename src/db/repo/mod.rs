//! Repository layer for database operations.
//!
//! `Repository` wraps the pool for one-shot reads and writes. Anything that
//! must run inside a caller-owned transaction is a free function taking
//! `&mut SqliteConnection`, so it can be driven with `&mut *tx`.
//!
//! Submodules by domain:
//! - `users.rs` - users, row locking, sales counters, balances
//! - `catalog.rs` - tiers, programs and boosts
//! - `conversions.rs` - conversion rows and status updates
//! - `ledger.rs` - cashback transactions, audit log, payouts
//! - `fraud.rs` - clicks and fraud flags
//! - `settings.rs` - key/value settings

pub mod catalog;
pub mod conversions;
pub mod fraud;
pub mod ledger;
pub mod settings;
pub mod users;

use crate::domain::{Decimal, TimeMs};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Sqlite, Transaction};
use sqlx::Row;
use std::fmt::Display;
use std::str::FromStr;
use uuid::Uuid;

/// Repository for database operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a transaction. Callers that read-modify-write a user row must
    /// call [`users::lock_user`] before their first read.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }
}

fn decode_err(column: &str, msg: impl Display) -> sqlx::Error {
    sqlx::Error::Decode(format!("column {}: {}", column, msg).into())
}

pub(crate) fn parse_col<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: Display,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>().map_err(|e| decode_err(column, e))
}

pub(crate) fn opt_parse_col<T>(row: &SqliteRow, column: &str) -> Result<Option<T>, sqlx::Error>
where
    T: FromStr,
    T::Err: Display,
{
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| s.parse::<T>().map_err(|e| decode_err(column, e)))
        .transpose()
}

pub(crate) fn uuid_col(row: &SqliteRow, column: &str) -> Result<Uuid, sqlx::Error> {
    parse_col::<Uuid>(row, column)
}

pub(crate) fn opt_uuid_col(row: &SqliteRow, column: &str) -> Result<Option<Uuid>, sqlx::Error> {
    opt_parse_col::<Uuid>(row, column)
}

pub(crate) fn decimal_col(row: &SqliteRow, column: &str) -> Result<Decimal, sqlx::Error> {
    parse_col::<Decimal>(row, column)
}

pub(crate) fn time_col(row: &SqliteRow, column: &str) -> Result<TimeMs, sqlx::Error> {
    Ok(TimeMs::new(row.try_get(column)?))
}

pub(crate) fn opt_time_col(row: &SqliteRow, column: &str) -> Result<Option<TimeMs>, sqlx::Error> {
    Ok(row.try_get::<Option<i64>, _>(column)?.map(TimeMs::new))
}
