use commission_engine::api::{create_router, AppState};
use commission_engine::config::Settings;
use commission_engine::observability::{init_logging, init_metrics, HealthChecker, LogConfig};
use commission_engine::outbox::{OutboxWorker, OutboxWorkerConfig, SideEffectHandler};
use commission_engine::providers::{BankTransferClient, CryptoPayoutClient, PayoutRails};
use commission_engine::services::SettingsService;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let settings = Settings::new()?;
    init_logging(&LogConfig::from(&settings.application))?;
    info!("Configuration loaded");

    let pool = PgPoolOptions::new()
        .max_connections(settings.database.pool_size)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&settings.database.url)
        .await?;
    info!("Database connection established");

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations applied successfully");

    let metrics_handle = init_metrics()?;

    let withdrawal_settings = SettingsService::new(pool.clone()).current().await?;
    let timeout = Duration::from_millis(settings.providers.timeout_ms);
    let mut rails = PayoutRails::new(timeout);
    if settings.providers.bank_transfer.api_key.is_empty() {
        warn!("Bank transfer rail not configured");
    } else {
        rails = rails.with_rail(Arc::new(BankTransferClient::new(&settings.providers.bank_transfer, timeout)?));
    }
    if settings.providers.crypto.api_key.is_empty() {
        warn!("Crypto rail not configured");
    } else {
        rails = rails.with_rail(Arc::new(CryptoPayoutClient::new(
            &settings.providers.crypto,
            &withdrawal_settings.crypto_coin,
            timeout,
        )?));
    }
    let rails = Arc::new(rails);

    let worker = Arc::new(OutboxWorker::new(
        pool.clone(),
        Arc::new(SideEffectHandler::new(pool.clone())),
        OutboxWorkerConfig::from(&settings.outbox),
    ));
    let worker_task = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.start().await })
    };

    let health_checker = Arc::new(HealthChecker::new(pool.clone(), rails.clone()));
    let state = AppState::new(pool, rails)
        .with_metrics(metrics_handle)
        .with_health_checker(health_checker);

    let address = format!("{}:{}", settings.application.host, settings.application.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(address = %address, "HTTP server listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
        })
        .await?;

    worker.stop();
    worker_task.await?;
    Ok(())
}
