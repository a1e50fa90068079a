//! Post-commit event broadcast.
//!
//! Ledger writes publish here only after their transaction commits.
//! Consumers (fraud scanner, notifier) subscribe independently, so a slow or
//! failing consumer never touches the write path.

use crate::domain::{Decimal, FraudFlag};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// An ambassador moved into a new tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierUp {
    pub previous: String,
    pub tier: String,
    /// Affiliate rate of the new tier, for the notification copy.
    pub ambassador_rate: Decimal,
}

/// Cashback credited to a buyer by a conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CashbackCredit {
    pub buyer_id: Uuid,
    pub amount: Decimal,
    pub balance_after: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    ConversionCreated {
        conversion_id: Uuid,
        ambassador_id: Uuid,
        first_sale: bool,
        tier_up: Option<TierUp>,
        cashback: Option<CashbackCredit>,
    },
    ConversionConfirmed {
        conversion_id: Uuid,
        ambassador_id: Uuid,
    },
    ConversionPaid {
        conversion_id: Uuid,
        ambassador_id: Uuid,
        ambassador_share: Decimal,
    },
    ConversionCancelled {
        conversion_id: Uuid,
        ambassador_id: Uuid,
        reason: Option<String>,
        clawed_back: Option<Decimal>,
    },
    PayoutCompleted {
        payout_id: Uuid,
        conversion_ids: Vec<Uuid>,
        total: Decimal,
    },
    FraudFlagged {
        flag: FraudFlag,
    },
}

impl LedgerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::ConversionCreated { .. } => "conversion_created",
            LedgerEvent::ConversionConfirmed { .. } => "conversion_confirmed",
            LedgerEvent::ConversionPaid { .. } => "conversion_paid",
            LedgerEvent::ConversionCancelled { .. } => "conversion_cancelled",
            LedgerEvent::PayoutCompleted { .. } => "payout_completed",
            LedgerEvent::FraudFlagged { .. } => "fraud_flagged",
        }
    }
}

/// Fan-out of ledger events to every subscriber.
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<LedgerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish to all current subscribers. Dropped silently when nobody listens.
    pub fn publish(&self, event: LedgerEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
