//! Key/value settings rows.

use super::Repository;
use crate::domain::TimeMs;
use sqlx::Row;
use std::collections::HashMap;

impl Repository {
    pub async fn load_settings(&self) -> Result<HashMap<String, String>, sqlx::Error> {
        let rows = sqlx::query("SELECT key, value FROM settings")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| -> Result<(String, String), sqlx::Error> {
                Ok((r.try_get("key")?, r.try_get("value")?))
            })
            .collect()
    }

    pub async fn put_setting(&self, key: &str, value: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(TimeMs::now().as_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
