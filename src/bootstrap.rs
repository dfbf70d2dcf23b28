use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{sync::Arc, time::Duration};
use tracing::{error, info};

use crate::{
    api::handler::AppState,
    backfill::ingester::BackfillIngester,
    config::Config,
    error::AppResult,
    execution::engine::ExecutionEngine,
    ledger::{
        client::{LedgerClient, XrplHttpClient},
        codes::ResultClassifier,
    },
    scheduler::ScanScheduler,
    store::{
        models::Network,
        repository::{EscrowStore, PgEscrowStore},
    },
};

pub async fn initialize_app_state(config: &Config) -> AppResult<AppState> {
    info!("Initializing application components ...");

    let pool = initialize_database(&config.database_url).await?;
    let store: Arc<dyn EscrowStore> = Arc::new(PgEscrowStore::new(pool));

    let timeout = Duration::from_secs(config.ledger_timeout_secs);

    let production_client: Arc<dyn LedgerClient> = Arc::new(XrplHttpClient::new(
        &config.xrpl_endpoint,
        config.production_credential.clone(),
        Network::Production,
        config.backfill_page_limit,
        timeout,
        config.proxy_url.as_deref(),
    )?);
    info!("✅ Production ledger client ready ({})", config.xrpl_endpoint);

    let test_client: Arc<dyn LedgerClient> = Arc::new(XrplHttpClient::new(
        &config.xrpl_test_endpoint,
        config.test_credential.clone(),
        Network::Test,
        config.backfill_page_limit,
        timeout,
        config.proxy_url.as_deref(),
    )?);
    info!("✅ Test ledger client ready ({})", config.xrpl_test_endpoint);

    let mut engine = ExecutionEngine::new(
        store.clone(),
        ResultClassifier::default(),
        config.due_skew_minutes,
    );
    engine.register_client(Network::Production, production_client.clone());
    engine.register_client(Network::Test, test_client);
    let engine = Arc::new(engine);
    info!(
        "✅ Execution engine initialized (due window skew {} min)",
        config.due_skew_minutes
    );

    let ingester = Arc::new(BackfillIngester::new(
        store,
        production_client,
        config.watched_account.clone(),
        config.destination_tag_sentinel,
    ));

    let scheduler = ScanScheduler::new(config.scan_interval_minutes, engine.clone());
    scheduler.start();
    info!(
        "✅ Due scan scheduler started (every {} min)",
        config.scan_interval_minutes
    );

    if config.backfill_on_start {
        let startup_ingester = ingester.clone();
        tokio::spawn(async move {
            if let Err(e) = startup_ingester.ingest().await {
                error!("Startup backfill failed: {}", e);
            }
        });
        info!("✅ Startup backfill scheduled");
    }

    Ok(AppState { engine, ingester })
}

async fn initialize_database(database_url: &str) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .connect(database_url)
        .await?;

    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}
