//! Settlement status transitions, clawbacks and payout batches.

use crate::db::repo::ledger::{self, AuditEntry};
use crate::db::repo::conversions;
use crate::db::Repository;
use crate::domain::{CashbackType, Conversion, ConversionStatus, Decimal, TimeMs};
use crate::engine::Transition;
use crate::error::LedgerError;
use crate::events::{EventBus, LedgerEvent};
use crate::orchestration::cashback;
use serde::Serialize;
use serde_json::json;
use sqlx::SqliteConnection;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// A committed payout batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payout {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub conversion_ids: Vec<Uuid>,
    /// Ambassador plus sponsor shares across the batch.
    pub total: Decimal,
    pub created_at: TimeMs,
}

#[derive(Clone)]
pub struct LifecycleEngine {
    repo: Arc<Repository>,
    bus: Arc<EventBus>,
}

impl LifecycleEngine {
    pub fn new(repo: Arc<Repository>, bus: Arc<EventBus>) -> Self {
        Self { repo, bus }
    }

    /// `pending → confirmed`.
    pub async fn confirm_conversion(
        &self,
        id: Uuid,
        actor_id: Uuid,
    ) -> Result<Conversion, LedgerError> {
        let (conversion, _) = self.transition(id, actor_id, Transition::Confirm, None).await?;
        self.bus.publish(LedgerEvent::ConversionConfirmed {
            conversion_id: conversion.id,
            ambassador_id: conversion.ambassador_id,
        });
        Ok(conversion)
    }

    /// `confirmed → paid`, outside of a payout batch.
    pub async fn pay_conversion(&self, id: Uuid, actor_id: Uuid) -> Result<Conversion, LedgerError> {
        let (conversion, _) = self.transition(id, actor_id, Transition::Pay, None).await?;
        self.bus.publish(LedgerEvent::ConversionPaid {
            conversion_id: conversion.id,
            ambassador_id: conversion.ambassador_id,
            ambassador_share: conversion.shares.ambassador,
        });
        Ok(conversion)
    }

    /// `pending | confirmed → cancelled`, clawing back any buyer cashback.
    pub async fn cancel_conversion(
        &self,
        id: Uuid,
        actor_id: Uuid,
        reason: Option<String>,
    ) -> Result<Conversion, LedgerError> {
        let (conversion, clawed_back) = self
            .transition(id, actor_id, Transition::Cancel, reason.as_deref())
            .await?;
        self.bus.publish(LedgerEvent::ConversionCancelled {
            conversion_id: conversion.id,
            ambassador_id: conversion.ambassador_id,
            reason,
            clawed_back,
        });
        Ok(conversion)
    }

    /// Mark every conversion in `ids` paid under one payout record.
    ///
    /// All or nothing: one missing or non-confirmed conversion fails the
    /// whole batch and nothing is written.
    pub async fn pay_batch(&self, ids: &[Uuid], actor_id: Uuid) -> Result<Payout, LedgerError> {
        let mut unique: Vec<Uuid> = Vec::with_capacity(ids.len());
        for id in ids {
            if !unique.contains(id) {
                unique.push(*id);
            }
        }
        if unique.is_empty() {
            return Err(LedgerError::EmptyBatch);
        }

        let now = TimeMs::now();
        let payout_id = Uuid::new_v4();
        let mut tx = self.repo.begin().await?;
        let mut paid = Vec::with_capacity(unique.len());

        for id in &unique {
            if !conversions::lock_conversion(&mut *tx, *id).await? {
                return Err(LedgerError::not_found("conversion", id));
            }
            let current = conversions::fetch_conversion(&mut *tx, *id)
                .await?
                .ok_or_else(|| LedgerError::not_found("conversion", id))?;
            let next = Transition::Pay.apply(current.status)?;
            set_status(&mut *tx, &current, Transition::Pay, next, now, None).await?;
            write_audit(
                &mut *tx,
                actor_id,
                &current,
                Transition::Pay,
                next,
                Some(json!({ "payoutId": payout_id })),
                now,
            )
            .await?;
            paid.push(current);
        }

        let total: Decimal = paid
            .iter()
            .map(|c| c.shares.ambassador + c.shares.sponsor)
            .sum();
        ledger::insert_payout(&mut *tx, payout_id, actor_id, total, paid.len() as i64, now).await?;
        for conversion in &paid {
            conversions::set_payout(&mut *tx, conversion.id, payout_id).await?;
        }

        tx.commit().await?;

        info!(
            payout_id = %payout_id,
            actor_id = %actor_id,
            conversions = paid.len(),
            total = %total,
            "Payout completed"
        );

        for conversion in &paid {
            self.bus.publish(LedgerEvent::ConversionPaid {
                conversion_id: conversion.id,
                ambassador_id: conversion.ambassador_id,
                ambassador_share: conversion.shares.ambassador,
            });
        }
        self.bus.publish(LedgerEvent::PayoutCompleted {
            payout_id,
            conversion_ids: unique.clone(),
            total,
        });

        Ok(Payout {
            id: payout_id,
            actor_id,
            conversion_ids: unique,
            total,
            created_at: now,
        })
    }

    /// Apply one transition in its own transaction. Returns the updated row
    /// and, for cancellations, the cashback actually reversed.
    async fn transition(
        &self,
        id: Uuid,
        actor_id: Uuid,
        transition: Transition,
        reason: Option<&str>,
    ) -> Result<(Conversion, Option<Decimal>), LedgerError> {
        let now = TimeMs::now();
        let mut tx = self.repo.begin().await?;

        if !conversions::lock_conversion(&mut *tx, id).await? {
            return Err(LedgerError::not_found("conversion", id));
        }
        let current = conversions::fetch_conversion(&mut *tx, id)
            .await?
            .ok_or_else(|| LedgerError::not_found("conversion", id))?;
        let next = transition.apply(current.status)?;

        set_status(&mut *tx, &current, transition, next, now, reason).await?;

        let clawed_back = match (transition, current.buyer_user_id) {
            (Transition::Cancel, Some(buyer_id)) if current.has_buyer_credit() => {
                Some(claw_back(&mut *tx, buyer_id, &current, now).await?)
            }
            _ => None,
        };

        let details = reason.map(|r| json!({ "reason": r }));
        write_audit(&mut *tx, actor_id, &current, transition, next, details, now).await?;

        let updated = conversions::fetch_conversion(&mut *tx, id)
            .await?
            .ok_or_else(|| LedgerError::not_found("conversion", id))?;

        tx.commit().await?;

        info!(
            conversion_id = %id,
            actor_id = %actor_id,
            from = %current.status,
            to = %next,
            "Conversion status changed"
        );

        Ok((updated, clawed_back))
    }
}

/// Move `before` to `next`. The caller holds the conversion lock, so the
/// compare-and-set only misses if that lock was not taken.
async fn set_status(
    conn: &mut SqliteConnection,
    before: &Conversion,
    transition: Transition,
    next: ConversionStatus,
    now: TimeMs,
    reason: Option<&str>,
) -> Result<(), LedgerError> {
    if conversions::update_status(conn, before.id, before.status, next, now, reason).await? {
        return Ok(());
    }

    let actual = conversions::fetch_conversion(conn, before.id)
        .await?
        .ok_or_else(|| LedgerError::not_found("conversion", before.id))?;
    error!(
        conversion_id = %before.id,
        expected = %before.status.as_str(),
        actual = %actual.status.as_str(),
        action = transition.as_str(),
        "Conversion status changed under lock"
    );
    Err(LedgerError::InvalidStatus {
        from: actual.status,
        action: transition.as_str(),
    })
}

/// Reverse the buyer credit of a cancelled conversion.
///
/// Capped at the current balance so it never goes negative; returns the
/// amount actually reversed.
async fn claw_back(
    conn: &mut SqliteConnection,
    buyer_id: Uuid,
    conversion: &Conversion,
    now: TimeMs,
) -> Result<Decimal, LedgerError> {
    let buyer = cashback::lock_and_fetch(conn, buyer_id, "buyer").await?;

    let owed = conversion.shares.buyer;
    let reversed = owed.min(buyer.cashback_balance.max(Decimal::zero()));
    if reversed < owed {
        warn!(
            conversion_id = %conversion.id,
            buyer_id = %buyer_id,
            owed = %owed,
            balance = %buyer.cashback_balance,
            shortfall = %(owed - reversed),
            "Clawback exceeds cashback balance; reversing what is available"
        );
    }
    if reversed.is_zero() {
        return Ok(reversed);
    }

    let entry = cashback::post_entry(
        conn,
        &buyer,
        CashbackType::Clawback,
        -reversed,
        Some(conversion.id),
        None,
        now,
    )
    .await?;

    info!(
        conversion_id = %conversion.id,
        buyer_id = %buyer_id,
        amount = %reversed,
        balance_after = %entry.balance_after,
        "Cashback clawed back"
    );
    Ok(reversed)
}

async fn write_audit(
    conn: &mut SqliteConnection,
    actor_id: Uuid,
    before: &Conversion,
    transition: Transition,
    after: ConversionStatus,
    details: Option<serde_json::Value>,
    at: TimeMs,
) -> Result<(), sqlx::Error> {
    ledger::insert_audit(
        conn,
        &AuditEntry {
            actor_id,
            action: format!("conversion.{}", transition.as_str()),
            entity_type: "conversion".to_string(),
            entity_id: before.id.to_string(),
            old_value: Some(before.status.as_str().to_string()),
            new_value: Some(after.as_str().to_string()),
            details: details.map(|d| d.to_string()),
            created_at: at,
        },
    )
    .await
}
