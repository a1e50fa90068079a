//! In-memory sink for tests and local runs.

use super::{Notification, NotificationSink, NotifyError};
use async_trait::async_trait;
use std::sync::Mutex;

/// Records every delivered notification. Can be told to fail deliveries.
#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<Notification>>,
    fail: Mutex<bool>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose deliveries all fail with a transport error.
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.set_failing(true);
        sink
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap_or_else(|p| p.into_inner()) = fail;
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Setting keys of everything sent, in order. Handy for assertions.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.sent().iter().map(|n| n.setting_key()).collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        if *self.fail.lock().unwrap_or_else(|p| p.into_inner()) {
            return Err(NotifyError::Transport("recording sink set to fail".to_string()));
        }
        self.sent
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(notification.clone());
        Ok(())
    }
}
