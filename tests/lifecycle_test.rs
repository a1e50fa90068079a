use commission_ledger::db::init_db;
use commission_ledger::db::repo::conversions;
use commission_ledger::domain::{
    AffiliateProgram, CashbackType, CommissionTier, Conversion, ConversionStatus, Decimal, Role,
    SaleType, TimeMs, User,
};
use commission_ledger::engine::BuyerRateOverrides;
use commission_ledger::events::{EventBus, LedgerEvent};
use commission_ledger::orchestration::{
    CashbackLedger, ConversionOrchestrator, ConversionParams, LifecycleEngine, RateResolver,
};
use commission_ledger::{LedgerError, Repository};
use std::str::FromStr;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

struct Ledger {
    repo: Arc<Repository>,
    bus: Arc<EventBus>,
    orchestrator: ConversionOrchestrator,
    lifecycle: LifecycleEngine,
    cashback: CashbackLedger,
    program: AffiliateProgram,
    ambassador: User,
    buyer: User,
    admin: Uuid,
    _temp: TempDir,
}

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

async fn setup() -> Ledger {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));

    repo.upsert_tier(&CommissionTier {
        name: "beginner".to_string(),
        min_sales: 0,
        ambassador_rate_affiliate: d("25"),
        ambassador_rate_dropship: d("30"),
        sponsor_rate: d("10"),
    })
    .await
    .unwrap();
    let program = AffiliateProgram::new("Shop", d("10"), d("8"));
    repo.insert_program(&program).await.unwrap();

    let ambassador = User::new("a@x.io", Role::Ambassador).with_tier("beginner");
    let buyer = User::new("b@x.io", Role::Buyer);
    let admin = User::new("admin@x.io", Role::Admin);
    for user in [&ambassador, &buyer, &admin] {
        repo.insert_user(user).await.unwrap();
    }

    let bus = Arc::new(EventBus::new(64));
    let resolver = RateResolver::new(repo.clone(), d("10"));

    Ledger {
        orchestrator: ConversionOrchestrator::new(repo.clone(), resolver, bus.clone()),
        lifecycle: LifecycleEngine::new(repo.clone(), bus.clone()),
        cashback: CashbackLedger::new(repo.clone()),
        repo,
        bus,
        program,
        ambassador,
        buyer,
        admin: admin.id,
        _temp: temp_dir,
    }
}

/// Commission total 50 gives the buyer a 5.00 credit at 10%.
async fn convert(ledger: &Ledger, commission_total: &str) -> Conversion {
    ledger
        .orchestrator
        .create_conversion(ConversionParams {
            ambassador_id: ledger.ambassador.id,
            affiliate_program_id: ledger.program.id,
            buyer_user_id: Some(ledger.buyer.id),
            sale_type: SaleType::Affiliate,
            amount: d("500"),
            commission_total: Some(d(commission_total)),
            order_ref: None,
            overrides: BuyerRateOverrides::default(),
        })
        .await
        .unwrap()
        .conversion
}

async fn balance(ledger: &Ledger, user: Uuid) -> Decimal {
    ledger
        .repo
        .get_user(user)
        .await
        .unwrap()
        .unwrap()
        .cashback_balance
}

#[tokio::test]
async fn test_confirm_then_pay() {
    let ledger = setup().await;
    let conversion = convert(&ledger, "20").await;

    let confirmed = ledger
        .lifecycle
        .confirm_conversion(conversion.id, ledger.admin)
        .await
        .unwrap();
    assert_eq!(confirmed.status, ConversionStatus::Confirmed);
    assert!(confirmed.confirmed_at.is_some());
    assert!(confirmed.paid_at.is_none());

    let paid = ledger
        .lifecycle
        .pay_conversion(conversion.id, ledger.admin)
        .await
        .unwrap();
    assert_eq!(paid.status, ConversionStatus::Paid);
    assert!(paid.paid_at.is_some());
    assert_eq!(paid.shares, conversion.shares);

    let audit = ledger.repo.list_audit(&conversion.id.to_string()).await.unwrap();
    let actions: Vec<&str> = audit.iter().map(|a| a.action.as_str()).collect();
    assert_eq!(actions, vec!["conversion.confirm", "conversion.pay"]);
    assert_eq!(audit[0].actor_id, ledger.admin);
    assert_eq!(audit[0].old_value.as_deref(), Some("pending"));
    assert_eq!(audit[0].new_value.as_deref(), Some("confirmed"));
    assert_eq!(audit[1].new_value.as_deref(), Some("paid"));
}

#[tokio::test]
async fn test_pay_pending_is_rejected() {
    let ledger = setup().await;
    let conversion = convert(&ledger, "20").await;

    let err = ledger
        .lifecycle
        .pay_conversion(conversion.id, ledger.admin)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InvalidStatus {
            from: ConversionStatus::Pending,
            ..
        }
    ));

    let stored = ledger.repo.get_conversion(conversion.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ConversionStatus::Pending);
    assert!(ledger
        .repo
        .list_audit(&conversion.id.to_string())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_terminal_statuses_do_not_move() {
    let ledger = setup().await;
    let conversion = convert(&ledger, "20").await;
    ledger
        .lifecycle
        .confirm_conversion(conversion.id, ledger.admin)
        .await
        .unwrap();
    ledger
        .lifecycle
        .pay_conversion(conversion.id, ledger.admin)
        .await
        .unwrap();

    let err = ledger
        .lifecycle
        .cancel_conversion(conversion.id, ledger.admin, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidStatus { .. }));

    let cancelled = convert(&ledger, "20").await;
    ledger
        .lifecycle
        .cancel_conversion(cancelled.id, ledger.admin, None)
        .await
        .unwrap();
    let err = ledger
        .lifecycle
        .confirm_conversion(cancelled.id, ledger.admin)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InvalidStatus {
            from: ConversionStatus::Cancelled,
            ..
        }
    ));

    // Paid conversion keeps its buyer credit.
    let history = ledger
        .repo
        .list_cashback_for_conversion(conversion.id)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, CashbackType::Earned);
}

#[tokio::test]
async fn test_unknown_conversion_is_not_found() {
    let ledger = setup().await;
    let err = ledger
        .lifecycle
        .confirm_conversion(Uuid::new_v4(), ledger.admin)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

#[tokio::test]
async fn test_cancel_claws_back_buyer_cashback() {
    let ledger = setup().await;
    ledger
        .cashback
        .adjust(ledger.buyer.id, d("15"), ledger.admin, Some("goodwill".into()))
        .await
        .unwrap();
    let conversion = convert(&ledger, "50").await;
    assert_eq!(conversion.shares.buyer, d("5.00"));
    assert_eq!(balance(&ledger, ledger.buyer.id).await, d("20.00"));
    let mut events = ledger.bus.subscribe();

    let cancelled = ledger
        .lifecycle
        .cancel_conversion(conversion.id, ledger.admin, Some("refunded".into()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, ConversionStatus::Cancelled);
    assert_eq!(balance(&ledger, ledger.buyer.id).await, d("15.00"));

    let rows = ledger
        .repo
        .list_cashback_for_conversion(conversion.id)
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].kind, CashbackType::Clawback);
    assert_eq!(rows[1].amount, d("-5.00"));
    assert_eq!(rows[1].balance_after, d("15.00"));

    let audit = ledger.repo.list_audit(&conversion.id.to_string()).await.unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, "conversion.cancel");
    assert!(audit[0].details.as_deref().unwrap_or_default().contains("refunded"));

    match events.recv().await.unwrap() {
        LedgerEvent::ConversionCancelled {
            conversion_id,
            reason,
            clawed_back,
            ..
        } => {
            assert_eq!(conversion_id, conversion.id);
            assert_eq!(reason.as_deref(), Some("refunded"));
            assert_eq!(clawed_back, Some(d("5.00")));
        }
        other => panic!("unexpected event {:?}", other),
    }

    assert!(ledger.cashback.verify_balance(ledger.buyer.id).await.unwrap().consistent);
}

#[tokio::test]
async fn test_clawback_is_capped_at_balance() {
    let ledger = setup().await;
    let conversion = convert(&ledger, "20").await;
    ledger
        .cashback
        .withdraw(ledger.buyer.id, d("1.50"), None)
        .await
        .unwrap();
    assert_eq!(balance(&ledger, ledger.buyer.id).await, d("0.50"));

    ledger
        .lifecycle
        .cancel_conversion(conversion.id, ledger.admin, None)
        .await
        .unwrap();

    assert_eq!(balance(&ledger, ledger.buyer.id).await, Decimal::zero());
    let rows = ledger
        .repo
        .list_cashback_for_conversion(conversion.id)
        .await
        .unwrap();
    assert_eq!(rows.last().unwrap().amount, d("-0.50"));
}

#[tokio::test]
async fn test_clawback_with_empty_balance_writes_no_row() {
    let ledger = setup().await;
    let conversion = convert(&ledger, "20").await;
    ledger
        .cashback
        .withdraw(ledger.buyer.id, d("2"), None)
        .await
        .unwrap();

    ledger
        .lifecycle
        .cancel_conversion(conversion.id, ledger.admin, None)
        .await
        .unwrap();

    let rows = ledger
        .repo
        .list_cashback_for_conversion(conversion.id)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(balance(&ledger, ledger.buyer.id).await, Decimal::zero());
}

#[tokio::test]
async fn test_pay_batch() {
    let ledger = setup().await;
    let first = convert(&ledger, "20").await;
    let second = convert(&ledger, "40").await;
    for c in [&first, &second] {
        ledger
            .lifecycle
            .confirm_conversion(c.id, ledger.admin)
            .await
            .unwrap();
    }
    let mut events = ledger.bus.subscribe();

    let payout = ledger
        .lifecycle
        .pay_batch(&[first.id, second.id, first.id], ledger.admin)
        .await
        .unwrap();
    assert_eq!(payout.conversion_ids, vec![first.id, second.id]);
    assert_eq!(payout.total, d("15.00"));

    for c in [&first, &second] {
        let stored = ledger.repo.get_conversion(c.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ConversionStatus::Paid);
        let payout_id: Option<String> =
            sqlx::query_scalar("SELECT payout_id FROM conversions WHERE id = ?")
                .bind(c.id.to_string())
                .fetch_one(ledger.repo.pool())
                .await
                .unwrap();
        assert_eq!(payout_id, Some(payout.id.to_string()));
    }

    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        names.push(event.name());
    }
    assert_eq!(
        names,
        vec!["conversion_paid", "conversion_paid", "payout_completed"]
    );
}

#[tokio::test]
async fn test_pay_batch_is_all_or_nothing() {
    let ledger = setup().await;
    let confirmed = convert(&ledger, "20").await;
    let pending = convert(&ledger, "20").await;
    ledger
        .lifecycle
        .confirm_conversion(confirmed.id, ledger.admin)
        .await
        .unwrap();

    let err = ledger
        .lifecycle
        .pay_batch(&[confirmed.id, pending.id], ledger.admin)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidStatus { .. }));

    let stored = ledger.repo.get_conversion(confirmed.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ConversionStatus::Confirmed);
    let payouts: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payouts")
        .fetch_one(ledger.repo.pool())
        .await
        .unwrap();
    assert_eq!(payouts, 0);

    let err = ledger
        .lifecycle
        .pay_batch(&[confirmed.id, Uuid::new_v4()], ledger.admin)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

#[tokio::test]
async fn test_empty_batch_is_rejected() {
    let ledger = setup().await;
    let err = ledger.lifecycle.pay_batch(&[], ledger.admin).await.unwrap_err();
    assert!(matches!(err, LedgerError::EmptyBatch));
}

#[tokio::test]
async fn test_stale_status_cannot_be_applied_twice() {
    let ledger = setup().await;
    let conversion = convert(&ledger, "20").await;

    let (a, b) = tokio::join!(
        ledger.lifecycle.confirm_conversion(conversion.id, ledger.admin),
        ledger.lifecycle.confirm_conversion(conversion.id, ledger.admin),
    );
    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);

    let audit = ledger.repo.list_audit(&conversion.id.to_string()).await.unwrap();
    assert_eq!(audit.len(), 1);
}

#[tokio::test]
async fn test_status_update_is_compare_and_set() {
    let ledger = setup().await;
    let conversion = convert(&ledger, "20").await;
    let mut conn = ledger.repo.pool().acquire().await.unwrap();

    let moved = conversions::update_status(
        &mut *conn,
        conversion.id,
        ConversionStatus::Confirmed,
        ConversionStatus::Paid,
        TimeMs::now(),
        None,
    )
    .await
    .unwrap();
    assert!(!moved);
    let stored = ledger.repo.get_conversion(conversion.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ConversionStatus::Pending);
    assert!(stored.paid_at.is_none());

    let moved = conversions::update_status(
        &mut *conn,
        conversion.id,
        ConversionStatus::Pending,
        ConversionStatus::Confirmed,
        TimeMs::now(),
        None,
    )
    .await
    .unwrap();
    assert!(moved);
    drop(conn);

    // The engine refuses to replay a move from the old status.
    let err = ledger
        .lifecycle
        .confirm_conversion(conversion.id, ledger.admin)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InvalidStatus {
            from: ConversionStatus::Confirmed,
            ..
        }
    ));
}
