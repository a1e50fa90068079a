//! Buyer cashback balance: withdrawals, admin adjustments and the ledger
//! consistency check.
//!
//! Every balance change goes through [`post_entry`], which writes the ledger
//! row and the new balance together. Callers hold the user's lock.

use crate::db::repo::ledger::{self, AuditEntry};
use crate::db::repo::users;
use crate::db::Repository;
use crate::domain::{CashbackTransaction, CashbackType, Decimal, TimeMs, User};
use crate::error::LedgerError;
use serde::Serialize;
use serde_json::json;
use sqlx::SqliteConnection;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Apply a signed `amount` to `user`'s balance and record it.
pub(crate) async fn post_entry(
    conn: &mut SqliteConnection,
    user: &User,
    kind: CashbackType,
    amount: Decimal,
    conversion_id: Option<Uuid>,
    note: Option<String>,
    now: TimeMs,
) -> Result<CashbackTransaction, sqlx::Error> {
    let entry = CashbackTransaction {
        id: Uuid::new_v4(),
        user_id: user.id,
        conversion_id,
        kind,
        amount,
        balance_after: (user.cashback_balance + amount).round_cents(),
        note,
        created_at: now,
    };
    ledger::insert_cashback_transaction(conn, &entry).await?;
    users::update_cashback_balance(conn, user.id, entry.balance_after).await?;
    Ok(entry)
}

/// Lock `user_id` and read it back.
pub(crate) async fn lock_and_fetch(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    what: &str,
) -> Result<User, LedgerError> {
    if !users::lock_user(conn, user_id).await? {
        return Err(LedgerError::not_found(what, user_id));
    }
    users::fetch_user(conn, user_id)
        .await?
        .ok_or_else(|| LedgerError::not_found(what, user_id))
}

/// Stored balance against the sum of the ledger rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceCheck {
    pub user_id: Uuid,
    pub stored: Decimal,
    pub ledger_sum: Decimal,
    pub consistent: bool,
}

#[derive(Debug, Clone)]
pub struct CashbackLedger {
    repo: Arc<Repository>,
}

impl CashbackLedger {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// Debit a withdrawal request.
    ///
    /// # Errors
    /// `InvalidAmount` unless `amount` is positive and in range, `InsufficientBalance` when
    /// it exceeds the balance.
    pub async fn withdraw(
        &self,
        user_id: Uuid,
        amount: Decimal,
        note: Option<String>,
    ) -> Result<CashbackTransaction, LedgerError> {
        let amount = amount.round_cents();
        if !amount.is_positive() || !amount.is_within_money_range() {
            return Err(LedgerError::InvalidAmount { amount });
        }

        let mut tx = self.repo.begin().await?;
        let user = lock_and_fetch(&mut *tx, user_id, "user").await?;
        if user.cashback_balance < amount {
            return Err(LedgerError::InsufficientBalance {
                balance: user.cashback_balance,
                requested: amount,
            });
        }

        let entry = post_entry(
            &mut *tx,
            &user,
            CashbackType::Withdrawal,
            -amount,
            None,
            note,
            TimeMs::now(),
        )
        .await?;
        tx.commit().await?;

        info!(
            user_id = %user_id,
            amount = %amount,
            balance_after = %entry.balance_after,
            "Cashback withdrawn"
        );
        Ok(entry)
    }

    /// Admin correction by a signed amount. Audited.
    ///
    /// # Errors
    /// `InvalidAmount` for zero or out of range, `InsufficientBalance` when a debit would take
    /// the balance below zero.
    pub async fn adjust(
        &self,
        user_id: Uuid,
        amount: Decimal,
        actor_id: Uuid,
        note: Option<String>,
    ) -> Result<CashbackTransaction, LedgerError> {
        let amount = amount.round_cents();
        if amount.is_zero() || !amount.is_within_money_range() {
            return Err(LedgerError::InvalidAmount { amount });
        }

        let now = TimeMs::now();
        let mut tx = self.repo.begin().await?;
        let user = lock_and_fetch(&mut *tx, user_id, "user").await?;
        if (user.cashback_balance + amount).is_negative() {
            return Err(LedgerError::InsufficientBalance {
                balance: user.cashback_balance,
                requested: amount.abs(),
            });
        }

        let entry = post_entry(
            &mut *tx,
            &user,
            CashbackType::Adjustment,
            amount,
            None,
            note.clone(),
            now,
        )
        .await?;

        ledger::insert_audit(
            &mut *tx,
            &AuditEntry {
                actor_id,
                action: "cashback.adjust".to_string(),
                entity_type: "user".to_string(),
                entity_id: user_id.to_string(),
                old_value: Some(user.cashback_balance.to_canonical_string()),
                new_value: Some(entry.balance_after.to_canonical_string()),
                details: Some(json!({ "amount": amount, "note": note }).to_string()),
                created_at: now,
            },
        )
        .await?;
        tx.commit().await?;

        info!(
            user_id = %user_id,
            actor_id = %actor_id,
            amount = %amount,
            balance_after = %entry.balance_after,
            "Cashback adjusted"
        );
        Ok(entry)
    }

    pub async fn balance(&self, user_id: Uuid) -> Result<Decimal, LedgerError> {
        let user = self
            .repo
            .get_user(user_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("user", user_id))?;
        Ok(user.cashback_balance)
    }

    /// Ledger rows in the order they were applied.
    pub async fn balance_history(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<CashbackTransaction>, LedgerError> {
        if self.repo.get_user(user_id).await?.is_none() {
            return Err(LedgerError::not_found("user", user_id));
        }
        Ok(self.repo.list_cashback_transactions(user_id).await?)
    }

    /// Recompute the balance from the ledger and compare.
    pub async fn verify_balance(&self, user_id: Uuid) -> Result<BalanceCheck, LedgerError> {
        let mut tx = self.repo.begin().await?;
        let user = users::fetch_user(&mut *tx, user_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("user", user_id))?;
        let rows = ledger::list_cashback_in(&mut *tx, user_id).await?;
        tx.commit().await?;

        let ledger_sum: Decimal = rows.iter().map(|r| r.amount).sum();
        let check = BalanceCheck {
            user_id,
            stored: user.cashback_balance,
            ledger_sum,
            consistent: ledger_sum == user.cashback_balance,
        };
        if !check.consistent {
            error!(
                user_id = %user_id,
                stored = %check.stored,
                ledger_sum = %check.ledger_sum,
                "Cashback balance does not match ledger"
            );
        }
        Ok(check)
    }
}
