//! Post-commit fraud scanning.
//!
//! Scans never fail their caller: each heuristic runs on its own, and a
//! failing one is logged without affecting the others.

use crate::db::Repository;
use crate::domain::{FlagStatus, FraudFlag, TimeMs};
use crate::engine::fraud::{
    check_click_spam, check_rapid_conversion, check_self_buy, check_self_referral,
};
use crate::engine::{Finding, FraudThresholds};
use crate::error::LedgerError;
use crate::events::{EventBus, LedgerEvent};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Admin outcome for a pending flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagReview {
    Dismiss,
    Confirm,
}

impl FlagReview {
    fn status(self) -> FlagStatus {
        match self {
            FlagReview::Dismiss => FlagStatus::Dismissed,
            FlagReview::Confirm => FlagStatus::Confirmed,
        }
    }
}

#[derive(Clone)]
pub struct FraudScanner {
    repo: Arc<Repository>,
    bus: Arc<EventBus>,
    thresholds: FraudThresholds,
}

impl FraudScanner {
    pub fn new(repo: Arc<Repository>, bus: Arc<EventBus>, thresholds: FraudThresholds) -> Self {
        Self {
            repo,
            bus,
            thresholds,
        }
    }

    pub fn thresholds(&self) -> &FraudThresholds {
        &self.thresholds
    }

    /// Run every heuristic against one conversion and its ambassador.
    ///
    /// Returns the flags this scan created. Errors are logged, never returned.
    pub async fn scan_conversion(&self, conversion_id: Uuid) -> Vec<FraudFlag> {
        let conversion = match self.repo.get_conversion(conversion_id).await {
            Ok(Some(c)) => c,
            Ok(None) => {
                warn!(conversion_id = %conversion_id, "Fraud scan skipped: conversion not found");
                return Vec::new();
            }
            Err(e) => {
                error!(conversion_id = %conversion_id, error = %e, "Fraud scan failed to load conversion");
                return Vec::new();
            }
        };
        let ambassador_id = conversion.ambassador_id;
        let now = TimeMs::now();

        let self_buy = async { self.flag_finding(ambassador_id, check_self_buy(&conversion)).await };

        let click_spam = async {
            let since = now.minus(self.thresholds.click_spam_window_ms);
            let clicks = self.repo.count_clicks_since(ambassador_id, since).await?;
            self.flag_finding(ambassador_id, check_click_spam(clicks, &self.thresholds))
                .await
        };

        let self_referral = async {
            let finding = self
                .repo
                .get_user(ambassador_id)
                .await?
                .and_then(|user| check_self_referral(&user));
            self.flag_finding(ambassador_id, finding).await
        };

        let rapid_conversion = async {
            let since = now.minus(self.thresholds.rapid_conversion_window_ms);
            let count = self.repo.count_conversions_since(ambassador_id, since).await?;
            self.flag_finding(ambassador_id, check_rapid_conversion(count, &self.thresholds))
                .await
        };

        let (self_buy, click_spam, self_referral, rapid_conversion) =
            futures::join!(self_buy, click_spam, self_referral, rapid_conversion);

        let mut created = Vec::new();
        for (check, result) in [
            ("self_buy", self_buy),
            ("click_spam", click_spam),
            ("self_referral", self_referral),
            ("rapid_conversion", rapid_conversion),
        ] {
            match result {
                Ok(Some(flag)) => created.push(flag),
                Ok(None) => {}
                Err(e) => error!(
                    conversion_id = %conversion_id,
                    check,
                    error = %e,
                    "Fraud check failed"
                ),
            }
        }
        created
    }

    async fn flag_finding(
        &self,
        user_id: Uuid,
        finding: Option<Finding>,
    ) -> Result<Option<FraudFlag>, sqlx::Error> {
        match finding {
            Some(finding) => self.flag_if_new(user_id, finding).await,
            None => Ok(None),
        }
    }

    /// Insert a pending flag unless one of the same type is already pending
    /// for `user_id`. Publishes `FraudFlagged` for a new flag.
    pub async fn flag_if_new(
        &self,
        user_id: Uuid,
        finding: Finding,
    ) -> Result<Option<FraudFlag>, sqlx::Error> {
        let severity = finding.kind.severity();
        let flag = self
            .repo
            .insert_flag_if_new(user_id, finding.kind, severity, &finding.details)
            .await?;

        if let Some(flag) = &flag {
            info!(
                flag_id = %flag.id,
                user_id = %user_id,
                kind = flag.kind.as_str(),
                severity = flag.severity.as_str(),
                "Fraud flag raised"
            );
            self.bus.publish(LedgerEvent::FraudFlagged { flag: flag.clone() });
        }
        Ok(flag)
    }

    /// Close a pending flag.
    ///
    /// # Errors
    /// `NotFound` when no pending flag has this id.
    pub async fn resolve_flag(&self, id: Uuid, review: FlagReview) -> Result<(), LedgerError> {
        if !self.repo.resolve_flag(id, review.status()).await? {
            return Err(LedgerError::not_found("pending fraud flag", id));
        }
        info!(flag_id = %id, status = review.status().as_str(), "Fraud flag resolved");
        Ok(())
    }

    /// Store one outbound click for the click-spam heuristic.
    pub async fn record_click(&self, ambassador_id: Uuid) -> Result<(), LedgerError> {
        if self.repo.get_user(ambassador_id).await?.is_none() {
            return Err(LedgerError::not_found("ambassador", ambassador_id));
        }
        self.repo.record_click(ambassador_id, TimeMs::now()).await?;
        Ok(())
    }

    /// Scan every created conversion until the bus closes.
    pub fn spawn(self, mut rx: broadcast::Receiver<LedgerEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(LedgerEvent::ConversionCreated { conversion_id, .. }) => {
                        self.scan_conversion(conversion_id).await;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        error!(skipped, "Fraud scanner lagged behind the event bus; scans dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
