//! Key/value settings with a process-local read cache.
//!
//! The cache is owned by the store instance and dropped on every write made
//! through it. Writes made by another process are picked up after
//! [`SettingsStore::invalidate`].

use crate::db::Repository;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

pub struct SettingsStore {
    repo: Arc<Repository>,
    cache: RwLock<Option<HashMap<String, String>>>,
}

impl SettingsStore {
    pub fn new(repo: Arc<Repository>) -> Self {
        SettingsStore {
            repo,
            cache: RwLock::new(None),
        }
    }

    /// Look up a raw value.
    ///
    /// # Errors
    /// Returns an error if the settings table cannot be read.
    pub async fn get(&self, key: &str) -> Result<Option<String>, sqlx::Error> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            return Ok(cached.get(key).cloned());
        }

        let mut guard = self.cache.write().await;
        if guard.is_none() {
            *guard = Some(self.repo.load_settings().await?);
        }
        Ok(guard.as_ref().and_then(|m| m.get(key).cloned()))
    }

    /// Boolean flag lookup. Missing, unparsable or unreadable values yield
    /// `default`.
    pub async fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key).await {
            Ok(Some(value)) => match value.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => true,
                "false" | "0" | "no" | "off" => false,
                other => {
                    warn!(key, value = other, "Unrecognised boolean setting, using default");
                    default
                }
            },
            Ok(None) => default,
            Err(e) => {
                warn!(key, error = %e, "Failed to read setting, using default");
                default
            }
        }
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), sqlx::Error> {
        self.repo.put_setting(key, value).await?;
        self.invalidate().await;
        Ok(())
    }

    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }
}
