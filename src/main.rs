use anyhow::Context;
use commission_ledger::notify::{NotificationSink, Notifier, TracingSink, WebhookSink};
use commission_ledger::{api, config::Config, db::init_db, EventBus, Repository, SettingsStore};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("Fatal: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_env().context("Configuration error")?;
    let port = config.port;

    let pool = init_db(&config.database_path)
        .await
        .context("Failed to initialize database")?;
    let repo = Arc::new(Repository::new(pool));
    let settings = Arc::new(SettingsStore::new(repo.clone()));
    let bus = Arc::new(EventBus::new(config.event_bus_capacity));

    let sink: Arc<dyn NotificationSink> = match &config.notify_webhook_url {
        Some(url) => {
            tracing::info!(url = %url, "Delivering notifications by webhook");
            Arc::new(WebhookSink::new(reqwest::Client::new(), url.clone()))
        }
        None => Arc::new(TracingSink),
    };

    let state = api::AppState::new(repo, config, bus.clone(), settings.clone());

    // Post-commit consumers. Each owns its own receiver.
    let _notifier = Notifier::new(sink, settings).spawn(bus.subscribe());
    let _scanner = state.fraud.as_ref().clone().spawn(bus.subscribe());

    let app = api::create_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
