pub mod cashback;
pub mod conversions;
pub mod fraud;
pub mod health;
pub mod rates;
pub mod settings;

use crate::config::Config;
use crate::db::Repository;
use crate::events::EventBus;
use crate::orchestration::{
    CashbackLedger, ConversionOrchestrator, FraudScanner, LifecycleEngine, RateResolver,
};
use crate::settings::SettingsStore;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub resolver: RateResolver,
    pub conversions: Arc<ConversionOrchestrator>,
    pub lifecycle: Arc<LifecycleEngine>,
    pub cashback: Arc<CashbackLedger>,
    pub fraud: Arc<FraudScanner>,
    pub settings: Arc<SettingsStore>,
}

impl AppState {
    pub fn new(
        repo: Arc<Repository>,
        config: Config,
        bus: Arc<EventBus>,
        settings: Arc<SettingsStore>,
    ) -> Self {
        let resolver = RateResolver::new(repo.clone(), config.default_buyer_cashback_rate);
        Self {
            conversions: Arc::new(ConversionOrchestrator::new(
                repo.clone(),
                resolver.clone(),
                bus.clone(),
            )),
            lifecycle: Arc::new(LifecycleEngine::new(repo.clone(), bus.clone())),
            cashback: Arc::new(CashbackLedger::new(repo.clone())),
            fraud: Arc::new(FraudScanner::new(repo.clone(), bus, config.fraud)),
            resolver,
            settings,
            config,
            repo,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/conversions", post(conversions::create_conversion))
        .route("/v1/conversions/:id", get(conversions::get_conversion))
        .route(
            "/v1/conversions/:id/confirm",
            post(conversions::confirm_conversion),
        )
        .route("/v1/conversions/:id/pay", post(conversions::pay_conversion))
        .route(
            "/v1/conversions/:id/cancel",
            post(conversions::cancel_conversion),
        )
        .route("/v1/payouts", post(conversions::create_payout))
        .route("/v1/rates/resolve", post(rates::resolve_rates))
        .route("/v1/users/:id/cashback", get(cashback::get_cashback))
        .route(
            "/v1/users/:id/cashback/withdraw",
            post(cashback::withdraw),
        )
        .route("/v1/users/:id/cashback/adjust", post(cashback::adjust))
        .route("/v1/users/:id/fraud-flags", get(fraud::list_flags))
        .route("/v1/fraud-flags/:id/resolve", post(fraud::resolve_flag))
        .route("/v1/clicks", post(fraud::record_click))
        .route("/v1/settings/:key", put(settings::put_setting))
        .layer(cors)
        .with_state(state)
}
