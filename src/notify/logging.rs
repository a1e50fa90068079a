//! Sink that only writes notifications to the log.

use super::{Notification, NotificationSink, NotifyError};
use async_trait::async_trait;
use tracing::info;

/// Default sink when no webhook is configured.
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(notification)
            .map_err(|e| NotifyError::Other(e.to_string()))?;
        info!(notification = notification.setting_key(), %payload, "Notification");
        Ok(())
    }
}
