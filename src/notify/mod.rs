//! Outbound notifications triggered by ledger events.
//!
//! `NotificationSink` is the delivery seam; `Notifier` decides whether an
//! event should produce a notification at all, based on settings.

use crate::domain::{Decimal, FraudFlag};
use crate::events::LedgerEvent;
use crate::settings::SettingsStore;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

pub mod logging;
pub mod recording;
pub mod webhook;

pub use logging::TracingSink;
pub use recording::RecordingSink;
pub use webhook::WebhookSink;

/// One message for a user or an admin.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    FirstSale {
        ambassador_id: Uuid,
        conversion_id: Uuid,
    },
    TierUp {
        ambassador_id: Uuid,
        tier: String,
        ambassador_rate: Decimal,
    },
    CashbackEarned {
        buyer_id: Uuid,
        conversion_id: Uuid,
        amount: Decimal,
        balance_after: Decimal,
    },
    FraudFlagged {
        flag: FraudFlag,
    },
    ConversionConfirmed {
        ambassador_id: Uuid,
        conversion_id: Uuid,
    },
    ConversionPaid {
        ambassador_id: Uuid,
        conversion_id: Uuid,
        amount: Decimal,
    },
    ConversionCancelled {
        ambassador_id: Uuid,
        conversion_id: Uuid,
        reason: Option<String>,
    },
    PayoutCompleted {
        payout_id: Uuid,
        conversion_count: usize,
        total: Decimal,
    },
}

impl Notification {
    /// Settings key that can switch this notification off.
    pub fn setting_key(&self) -> &'static str {
        match self {
            Notification::FirstSale { .. } => "notify.first_sale",
            Notification::TierUp { .. } => "notify.tier_up",
            Notification::CashbackEarned { .. } => "notify.cashback_earned",
            Notification::FraudFlagged { .. } => "notify.fraud_flagged",
            Notification::ConversionConfirmed { .. } => "notify.conversion_confirmed",
            Notification::ConversionPaid { .. } => "notify.conversion_paid",
            Notification::ConversionCancelled { .. } => "notify.conversion_cancelled",
            Notification::PayoutCompleted { .. } => "notify.payout_completed",
        }
    }
}

#[derive(Debug, Clone)]
pub enum NotifyError {
    /// Transport failure (connection refused, timeout).
    Transport(String),
    /// Receiver answered with a non-success status.
    Rejected { status: u16, message: String },
    Other(String),
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyError::Transport(msg) => write!(f, "Transport error: {}", msg),
            NotifyError::Rejected { status, message } => {
                write!(f, "Rejected with {}: {}", status, message)
            }
            NotifyError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for NotifyError {}

/// Delivery channel for notifications. One `Notification` variant exists per
/// trigger event.
#[async_trait]
pub trait NotificationSink: Send + Sync + fmt::Debug {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Turns ledger events into notifications, honouring `notify.*` settings.
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
    settings: Arc<SettingsStore>,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>, settings: Arc<SettingsStore>) -> Self {
        Notifier { sink, settings }
    }

    /// Notifications owed for one event. Fraud flags below high severity
    /// produce none.
    pub fn notifications_for(event: &LedgerEvent) -> Vec<Notification> {
        match event {
            LedgerEvent::ConversionCreated {
                conversion_id,
                ambassador_id,
                first_sale,
                tier_up,
                cashback,
            } => {
                let mut out = Vec::new();
                if *first_sale {
                    out.push(Notification::FirstSale {
                        ambassador_id: *ambassador_id,
                        conversion_id: *conversion_id,
                    });
                }
                if let Some(tier_up) = tier_up {
                    out.push(Notification::TierUp {
                        ambassador_id: *ambassador_id,
                        tier: tier_up.tier.clone(),
                        ambassador_rate: tier_up.ambassador_rate,
                    });
                }
                if let Some(credit) = cashback {
                    out.push(Notification::CashbackEarned {
                        buyer_id: credit.buyer_id,
                        conversion_id: *conversion_id,
                        amount: credit.amount,
                        balance_after: credit.balance_after,
                    });
                }
                out
            }
            LedgerEvent::ConversionConfirmed {
                conversion_id,
                ambassador_id,
            } => vec![Notification::ConversionConfirmed {
                ambassador_id: *ambassador_id,
                conversion_id: *conversion_id,
            }],
            LedgerEvent::ConversionPaid {
                conversion_id,
                ambassador_id,
                ambassador_share,
            } => vec![Notification::ConversionPaid {
                ambassador_id: *ambassador_id,
                conversion_id: *conversion_id,
                amount: *ambassador_share,
            }],
            LedgerEvent::ConversionCancelled {
                conversion_id,
                ambassador_id,
                reason,
                ..
            } => vec![Notification::ConversionCancelled {
                ambassador_id: *ambassador_id,
                conversion_id: *conversion_id,
                reason: reason.clone(),
            }],
            LedgerEvent::PayoutCompleted {
                payout_id,
                conversion_ids,
                total,
            } => vec![Notification::PayoutCompleted {
                payout_id: *payout_id,
                conversion_count: conversion_ids.len(),
                total: *total,
            }],
            LedgerEvent::FraudFlagged { flag } if flag.severity.alerts_admin() => {
                vec![Notification::FraudFlagged { flag: flag.clone() }]
            }
            LedgerEvent::FraudFlagged { .. } => Vec::new(),
        }
    }

    /// Send everything owed for `event`. Each send is independent; failures
    /// are logged and never retried.
    pub async fn handle(&self, event: &LedgerEvent) {
        for notification in Self::notifications_for(event) {
            let key = notification.setting_key();
            if !self.settings.get_bool(key, true).await {
                debug!(setting = key, "Notification disabled");
                continue;
            }
            if let Err(e) = self.sink.deliver(&notification).await {
                warn!(
                    event = event.name(),
                    notification = key,
                    error = %e,
                    "Notification delivery failed"
                );
            }
        }
    }

    /// Consume the event stream until the bus closes.
    pub fn spawn(self, mut rx: broadcast::Receiver<LedgerEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => self.handle(&event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        error!(skipped, "Notifier lagged behind the event bus; events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
