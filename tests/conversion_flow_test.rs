use commission_ledger::db::init_db;
use commission_ledger::domain::{
    AffiliateProgram, BoostDimension, CashbackType, CommissionBoost, CommissionTier,
    ConversionStatus, Decimal, Role, SaleType, TimeMs, User,
};
use commission_ledger::engine::{BuyerRateOverrides, RateSource};
use commission_ledger::events::{EventBus, LedgerEvent};
use commission_ledger::orchestration::{
    ConversionOrchestrator, ConversionParams, RateQuery, RateResolver, Recorded,
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
    program: AffiliateProgram,
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

    for tier in [
        CommissionTier {
            name: "beginner".to_string(),
            min_sales: 0,
            ambassador_rate_affiliate: d("25"),
            ambassador_rate_dropship: d("30"),
            sponsor_rate: d("10"),
        },
        CommissionTier {
            name: "active".to_string(),
            min_sales: 10,
            ambassador_rate_affiliate: d("30"),
            ambassador_rate_dropship: d("35"),
            sponsor_rate: d("10"),
        },
    ] {
        repo.upsert_tier(&tier).await.unwrap();
    }

    let program = AffiliateProgram::new("Shop", d("10"), d("8"));
    repo.insert_program(&program).await.unwrap();

    let bus = Arc::new(EventBus::new(64));
    let resolver = RateResolver::new(repo.clone(), d("10"));
    let orchestrator = ConversionOrchestrator::new(repo.clone(), resolver, bus.clone());

    Ledger {
        repo,
        bus,
        orchestrator,
        program,
        _temp: temp_dir,
    }
}

async fn add_user(repo: &Repository, user: User) -> User {
    repo.insert_user(&user).await.unwrap();
    user
}

fn params(ledger: &Ledger, ambassador: Uuid, buyer: Option<Uuid>) -> ConversionParams {
    ConversionParams {
        ambassador_id: ambassador,
        affiliate_program_id: ledger.program.id,
        buyer_user_id: buyer,
        sale_type: SaleType::Affiliate,
        amount: d("100"),
        commission_total: Some(d("20")),
        order_ref: None,
        overrides: BuyerRateOverrides::default(),
    }
}

#[tokio::test]
async fn test_reference_split_credits_buyer() {
    let ledger = setup().await;
    let sponsor = add_user(&ledger.repo, User::new("s@x.io", Role::Ambassador).with_tier("beginner")).await;
    let ambassador = add_user(
        &ledger.repo,
        User::new("a@x.io", Role::Ambassador)
            .with_tier("beginner")
            .with_sponsor(sponsor.id),
    )
    .await;
    let buyer = add_user(&ledger.repo, User::new("b@x.io", Role::Buyer)).await;
    let mut events = ledger.bus.subscribe();

    let outcome = ledger
        .orchestrator
        .create_conversion(params(&ledger, ambassador.id, Some(buyer.id)))
        .await
        .unwrap();

    let c = &outcome.conversion;
    assert_eq!(c.status, ConversionStatus::Pending);
    assert_eq!(c.shares.ambassador, d("5.00"));
    assert_eq!(c.shares.sponsor, d("2.00"));
    assert_eq!(c.shares.buyer, d("2.00"));
    assert_eq!(c.shares.platform, d("11.00"));
    assert_eq!(c.shares.total(), c.commission_total);
    assert_eq!(c.sponsor_id, Some(sponsor.id));
    assert_eq!(c.rates.platform, d("55"));
    assert!(outcome.first_sale);

    let stored = ledger.repo.get_conversion(c.id).await.unwrap().unwrap();
    assert_eq!(&stored, c);

    let buyer_after = ledger.repo.get_user(buyer.id).await.unwrap().unwrap();
    assert_eq!(buyer_after.cashback_balance, d("2.00"));

    let history = ledger.repo.list_cashback_transactions(buyer.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, CashbackType::Earned);
    assert_eq!(history[0].amount, d("2.00"));
    assert_eq!(history[0].balance_after, d("2.00"));
    assert_eq!(history[0].conversion_id, Some(c.id));

    let amb_after = ledger.repo.get_user(ambassador.id).await.unwrap().unwrap();
    assert_eq!(amb_after.total_sales, 1);

    match events.recv().await.unwrap() {
        LedgerEvent::ConversionCreated {
            conversion_id,
            first_sale,
            cashback,
            tier_up,
            ..
        } => {
            assert_eq!(conversion_id, c.id);
            assert!(first_sale);
            assert!(tier_up.is_none());
            let credit = cashback.expect("cashback credit");
            assert_eq!(credit.buyer_id, buyer.id);
            assert_eq!(credit.balance_after, d("2.00"));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_sponsor_is_snapshotted() {
    let ledger = setup().await;
    let first = add_user(&ledger.repo, User::new("s1@x.io", Role::Ambassador)).await;
    let second = add_user(&ledger.repo, User::new("s2@x.io", Role::Ambassador)).await;
    let ambassador = add_user(
        &ledger.repo,
        User::new("a@x.io", Role::Ambassador).with_sponsor(first.id),
    )
    .await;

    let outcome = ledger
        .orchestrator
        .create_conversion(params(&ledger, ambassador.id, None))
        .await
        .unwrap();

    ledger
        .repo
        .set_sponsor(ambassador.id, Some(second.id))
        .await
        .unwrap();

    let stored = ledger
        .repo
        .get_conversion(outcome.conversion.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.sponsor_id, Some(first.id));
}

#[tokio::test]
async fn test_no_sponsor_means_zero_sponsor_share_despite_boost() {
    let ledger = setup().await;
    ledger
        .repo
        .insert_boost(&CommissionBoost::global(
            BoostDimension::SponsorRate,
            d("15"),
            TimeMs::new(0),
        ))
        .await
        .unwrap();
    let ambassador = add_user(&ledger.repo, User::new("a@x.io", Role::Ambassador)).await;

    let outcome = ledger
        .orchestrator
        .create_conversion(params(&ledger, ambassador.id, None))
        .await
        .unwrap();

    assert_eq!(outcome.conversion.sponsor_id, None);
    assert_eq!(outcome.conversion.shares.sponsor, Decimal::zero());
    assert_eq!(outcome.conversion.rates.sponsor, Decimal::zero());
    // Buyer share is still carved out; it is simply not credited to anyone.
    assert_eq!(outcome.conversion.shares.buyer, d("2.00"));
    assert_eq!(outcome.conversion.shares.platform, d("13.00"));
}

#[tokio::test]
async fn test_tier_up_reported_once() {
    let ledger = setup().await;
    let ambassador = add_user(
        &ledger.repo,
        User::new("a@x.io", Role::Ambassador)
            .with_tier("beginner")
            .with_total_sales(9),
    )
    .await;

    let first = ledger
        .orchestrator
        .create_conversion(params(&ledger, ambassador.id, None))
        .await
        .unwrap();
    let tier_up = first.tier_up.expect("tier-up at 10 sales");
    assert_eq!(tier_up.previous, "beginner");
    assert_eq!(tier_up.tier, "active");
    assert_eq!(tier_up.ambassador_rate, d("30"));
    assert!(!first.first_sale);
    // The sale that crosses the threshold is still priced at the old tier.
    assert_eq!(first.conversion.shares.ambassador, d("5.00"));

    let stored = ledger.repo.get_user(ambassador.id).await.unwrap().unwrap();
    assert_eq!(stored.total_sales, 10);
    assert_eq!(stored.tier, "active");

    let second = ledger
        .orchestrator
        .create_conversion(params(&ledger, ambassador.id, None))
        .await
        .unwrap();
    assert!(second.tier_up.is_none());
    assert_eq!(second.conversion.shares.ambassador, d("6.00"));

    let stored = ledger.repo.get_user(ambassador.id).await.unwrap().unwrap();
    assert_eq!(stored.total_sales, 11);
}

#[tokio::test]
async fn test_dropship_tier_up_quotes_dropship_rate() {
    let ledger = setup().await;
    let ambassador = add_user(
        &ledger.repo,
        User::new("a@x.io", Role::Ambassador)
            .with_tier("beginner")
            .with_total_sales(9),
    )
    .await;

    let mut p = params(&ledger, ambassador.id, None);
    p.sale_type = SaleType::Dropship;
    let outcome = ledger.orchestrator.create_conversion(p).await.unwrap();

    let tier_up = outcome.tier_up.expect("tier-up at 10 sales");
    assert_eq!(tier_up.tier, "active");
    assert_eq!(tier_up.ambassador_rate, d("35"));
    assert_eq!(outcome.conversion.shares.ambassador, d("6.00"));
}

#[tokio::test]
async fn test_unset_tier_is_not_a_tier_up() {
    let ledger = setup().await;
    let ambassador = add_user(&ledger.repo, User::new("a@x.io", Role::Ambassador)).await;

    let outcome = ledger
        .orchestrator
        .create_conversion(params(&ledger, ambassador.id, None))
        .await
        .unwrap();

    assert!(outcome.tier_up.is_none());
    let stored = ledger.repo.get_user(ambassador.id).await.unwrap().unwrap();
    assert_eq!(stored.tier, "beginner");
}

#[tokio::test]
async fn test_distribution_exceeded_rolls_back_everything() {
    let ledger = setup().await;
    let boost = CommissionBoost::global(BoostDimension::AmbassadorRate, d("95"), TimeMs::new(0));
    ledger.repo.insert_boost(&boost).await.unwrap();
    let ambassador = add_user(&ledger.repo, User::new("a@x.io", Role::Ambassador)).await;
    let buyer = add_user(&ledger.repo, User::new("b@x.io", Role::Buyer)).await;
    let mut events = ledger.bus.subscribe();

    let err = ledger
        .orchestrator
        .create_conversion(params(&ledger, ambassador.id, Some(buyer.id)))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::DistributionExceeded { .. }));

    assert!(ledger
        .repo
        .list_conversions_for_ambassador(ambassador.id)
        .await
        .unwrap()
        .is_empty());
    let amb = ledger.repo.get_user(ambassador.id).await.unwrap().unwrap();
    assert_eq!(amb.total_sales, 0);
    let buyer = ledger.repo.get_user(buyer.id).await.unwrap().unwrap();
    assert_eq!(buyer.cashback_balance, Decimal::zero());
    assert!(ledger
        .repo
        .list_cashback_transactions(buyer.id)
        .await
        .unwrap()
        .is_empty());
    let boost = ledger.repo.get_boost(boost.id).await.unwrap().unwrap();
    assert_eq!(boost.current_uses, 0);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_missing_buyer_writes_nothing() {
    let ledger = setup().await;
    let ambassador = add_user(&ledger.repo, User::new("a@x.io", Role::Ambassador)).await;

    let err = ledger
        .orchestrator
        .create_conversion(params(&ledger, ambassador.id, Some(Uuid::new_v4())))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));

    let amb = ledger.repo.get_user(ambassador.id).await.unwrap().unwrap();
    assert_eq!(amb.total_sales, 0);
    assert!(ledger
        .repo
        .list_conversions_for_ambassador(ambassador.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_unknown_ambassador_is_not_found() {
    let ledger = setup().await;
    let err = ledger
        .orchestrator
        .create_conversion(params(&ledger, Uuid::new_v4(), None))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

#[tokio::test]
async fn test_duplicate_order_ref() {
    let ledger = setup().await;
    let ambassador = add_user(&ledger.repo, User::new("a@x.io", Role::Ambassador)).await;
    let mut p = params(&ledger, ambassador.id, None);
    p.order_ref = Some("ORD-1".to_string());

    let first = ledger.orchestrator.create_conversion(p.clone()).await.unwrap();

    let err = ledger
        .orchestrator
        .create_conversion(p.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateOrder { ref order_ref } if order_ref == "ORD-1"));

    match ledger.orchestrator.record_once(p.clone()).await.unwrap() {
        Recorded::Duplicate(existing) => assert_eq!(existing.id, first.conversion.id),
        Recorded::Created(_) => panic!("expected duplicate"),
    }

    // Same order ref under another program is a different sale.
    let other = AffiliateProgram::new("Other", d("10"), d("8"));
    ledger.repo.insert_program(&other).await.unwrap();
    p.affiliate_program_id = other.id;
    assert!(matches!(
        ledger.orchestrator.record_once(p).await.unwrap(),
        Recorded::Created(_)
    ));

    let amb = ledger.repo.get_user(ambassador.id).await.unwrap().unwrap();
    assert_eq!(amb.total_sales, 2);
}

#[tokio::test]
async fn test_commission_total_derived_from_program() {
    let ledger = setup().await;
    let ambassador = add_user(&ledger.repo, User::new("a@x.io", Role::Ambassador)).await;
    let mut p = params(&ledger, ambassador.id, None);
    p.amount = d("200");
    p.commission_total = None;

    let outcome = ledger.orchestrator.create_conversion(p.clone()).await.unwrap();
    assert_eq!(outcome.conversion.commission_total, d("16.00"));
    assert_eq!(outcome.conversion.shares.total(), d("16.00"));

    // Without a program there is nothing to derive from.
    p.affiliate_program_id = Uuid::new_v4();
    let err = ledger.orchestrator.create_conversion(p).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

#[tokio::test]
async fn test_user_boost_wins_and_is_counted() {
    let ledger = setup().await;
    let ambassador = add_user(&ledger.repo, User::new("a@x.io", Role::Ambassador)).await;

    let mut personal = CommissionBoost::global(BoostDimension::AmbassadorRate, d("30"), TimeMs::new(0))
        .for_user(ambassador.id)
        .with_max_uses(1);
    personal.created_at = TimeMs::new(2_000);
    let mut global = CommissionBoost::global(BoostDimension::AmbassadorRate, d("40"), TimeMs::new(0));
    global.created_at = TimeMs::new(1_000);
    ledger.repo.insert_boost(&global).await.unwrap();
    ledger.repo.insert_boost(&personal).await.unwrap();

    let first = ledger
        .orchestrator
        .create_conversion(params(&ledger, ambassador.id, None))
        .await
        .unwrap();
    assert_eq!(first.conversion.rates.ambassador, d("30"));
    assert_eq!(
        ledger.repo.get_boost(personal.id).await.unwrap().unwrap().current_uses,
        1
    );
    assert_eq!(
        ledger.repo.get_boost(global.id).await.unwrap().unwrap().current_uses,
        0
    );

    // Personal boost is exhausted; the global one takes over.
    let second = ledger
        .orchestrator
        .create_conversion(params(&ledger, ambassador.id, None))
        .await
        .unwrap();
    assert_eq!(second.conversion.rates.ambassador, d("40"));
    assert_eq!(
        ledger.repo.get_boost(global.id).await.unwrap().unwrap().current_uses,
        1
    );
}

#[tokio::test]
async fn test_resolver_reports_sources() {
    let ledger = setup().await;
    let ambassador = add_user(&ledger.repo, User::new("a@x.io", Role::Ambassador)).await;
    let resolver = RateResolver::new(ledger.repo.clone(), d("7"));

    let rates = resolver
        .resolve_rates(&RateQuery {
            ambassador_id: ambassador.id,
            program_id: ledger.program.id,
            sale_type: SaleType::Dropship,
            overrides: BuyerRateOverrides {
                product_rate: None,
                category_rate: Some(d("12")),
            },
        })
        .await
        .unwrap();
    assert_eq!(rates.ambassador.value, d("30"));
    assert_eq!(rates.ambassador.source, RateSource::Tier);
    assert_eq!(rates.sponsor.source, RateSource::NoSponsor);
    assert_eq!(rates.buyer.value, d("12"));
    assert_eq!(rates.buyer.source, RateSource::CategoryOverride);

    let fallback = resolver
        .resolve_rates(&RateQuery {
            ambassador_id: ambassador.id,
            program_id: Uuid::new_v4(),
            sale_type: SaleType::Affiliate,
            overrides: BuyerRateOverrides::default(),
        })
        .await
        .unwrap();
    assert_eq!(fallback.buyer.value, d("7"));
    assert_eq!(fallback.buyer.source, RateSource::GlobalDefault);

    let missing = resolver
        .resolve_rates(&RateQuery {
            ambassador_id: Uuid::new_v4(),
            program_id: ledger.program.id,
            sale_type: SaleType::Affiliate,
            overrides: BuyerRateOverrides::default(),
        })
        .await
        .unwrap_err();
    assert!(matches!(missing, LedgerError::NotFound(_)));
}

#[tokio::test]
async fn test_missing_base_tier_is_no_tier_found() {
    let ledger = setup().await;
    sqlx::query("DELETE FROM commission_tiers WHERE min_sales = 0")
        .execute(ledger.repo.pool())
        .await
        .unwrap();
    let ambassador = add_user(&ledger.repo, User::new("a@x.io", Role::Ambassador)).await;

    let err = ledger
        .orchestrator
        .create_conversion(params(&ledger, ambassador.id, None))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NoTierFound(0)));
}

#[tokio::test]
async fn test_oversized_amounts_are_rejected() {
    let ledger = setup().await;
    let ambassador = add_user(&ledger.repo, User::new("a@x.io", Role::Ambassador)).await;
    let buyer = add_user(&ledger.repo, User::new("b@x.io", Role::Buyer)).await;
    let huge = d("79228162514264337593543950335");

    let mut p = params(&ledger, ambassador.id, Some(buyer.id));
    p.commission_total = Some(huge);
    let err = ledger.orchestrator.create_conversion(p).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount { amount } if amount == huge));

    let mut p = params(&ledger, ambassador.id, Some(buyer.id));
    p.amount = huge;
    p.commission_total = None;
    let err = ledger.orchestrator.create_conversion(p).await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount { .. }));

    let amb = ledger.repo.get_user(ambassador.id).await.unwrap().unwrap();
    assert_eq!(amb.total_sales, 0);
    let buyer = ledger.repo.get_user(buyer.id).await.unwrap().unwrap();
    assert_eq!(buyer.cashback_balance, Decimal::zero());

    // Within range, a large total still splits without loss.
    let mut p = params(&ledger, ambassador.id, None);
    p.commission_total = Some(d("1000000000000"));
    let outcome = ledger.orchestrator.create_conversion(p).await.unwrap();
    assert_eq!(outcome.conversion.shares.ambassador, d("250000000000.00"));
    assert_eq!(outcome.conversion.shares.total(), d("1000000000000"));
}
