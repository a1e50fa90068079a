pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod events;
pub mod notify;
pub mod orchestration;
pub mod settings;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    AffiliateProgram, CashbackTransaction, CashbackType, CommissionBoost, CommissionTier,
    Conversion, ConversionStatus, Decimal, FraudFlag, FraudType, Role, SaleType, TimeMs, User,
};
pub use error::{AppError, LedgerError};
pub use events::{EventBus, LedgerEvent};
pub use notify::{NotificationSink, Notifier, RecordingSink, TracingSink, WebhookSink};
pub use orchestration::{
    CashbackLedger, ConversionOrchestrator, ConversionParams, FraudScanner, LifecycleEngine,
    RateResolver,
};
pub use settings::SettingsStore;
