use chrono::Duration as ChronoDuration;
use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skinmarket_backend::{
    config::AppConfig,
    handlers,
    jobs::{history_snapshot_sync::start_history_snapshot_job, price_sync::start_price_sync_job},
    services::{
        alert_dedup::{AlertConfig, AlertDeduplicator},
        alert_dispatch::{spawn_alert_dispatcher, AlertLayer, AlertSink, LogAlertSink, WebhookAlertSink},
        catalog::SeaOrmProductCatalog,
        clock::{SharedClock, SystemClock},
        history_snapshot::{DailyHistorySnapshotter, SeaOrmHistoryStore},
        key_pool::{KeyPool, SeaOrmCredentialStore},
        kv_store::MemoryKvStore,
        platform_store::SeaOrmPlatformStore,
        price_api::{PriceApiClient, PriceApiConfig},
        rate_budget::RateBudget,
        reconciler::{BatchReconciler, ReconcilerConfig},
        session_guard::SessionVersionGuard,
        sync_status::{jobs, SyncStatusCursorStore},
    },
    AppState, RateLimitSettings,
};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env().expect("Invalid configuration");

    let clock: SharedClock = Arc::new(SystemClock);

    // Alerts ride on the tracing pipeline
    let alert_dedup = Arc::new(AlertDeduplicator::new(
        AlertConfig {
            cooldown: ChronoDuration::seconds(config.alert_cooldown_secs),
            max_per_minute: config.alert_max_per_minute,
            batch_window: (config.alert_batch_window_secs > 0)
                .then(|| ChronoDuration::seconds(config.alert_batch_window_secs)),
        },
        clock.clone(),
    ));
    let (alert_layer, alert_rx) = AlertLayer::new(alert_dedup.clone(), clock.clone(), Level::WARN);

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,skinmarket_backend=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(alert_layer)
        .init();

    for warning in &config.warnings {
        tracing::warn!("{}", warning);
    }

    let alert_sink: Arc<dyn AlertSink> = match &config.alert_webhook_url {
        Some(url) => Arc::new(
            WebhookAlertSink::new(url.clone()).expect("Failed to build alert webhook client"),
        ),
        None => Arc::new(LogAlertSink),
    };
    spawn_alert_dispatcher(alert_dedup, alert_sink, alert_rx);

    // Connect to database
    tracing::info!("Connecting to database...");
    let db = Database::connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    tracing::info!("Running migrations...");
    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    let kv = Arc::new(MemoryKvStore::new(clock.clone()));
    let platforms = Arc::new(SeaOrmPlatformStore::new(db.clone()));
    let history = Arc::new(SeaOrmHistoryStore::new(db.clone()));

    let price_api = PriceApiClient::new(PriceApiConfig {
        base_url: config.price_api_base_url.clone(),
        rate_limit_code: config.price_api_rate_limit_code,
        timeout: config.price_api_timeout,
        retries: config.price_api_retries,
    })
    .expect("Failed to build price API client");

    let key_pool = KeyPool::new(
        Arc::new(SeaOrmCredentialStore::new(db.clone())),
        Arc::new(SyncStatusCursorStore::new(db.clone())),
        clock.clone(),
        ChronoDuration::seconds(config.key_cooldown_secs),
        jobs::PRICE_SYNC,
    );

    let reconciler = Arc::new(BatchReconciler::new(
        Arc::new(SeaOrmProductCatalog::new(db.clone())),
        key_pool,
        Arc::new(price_api),
        platforms.clone(),
        clock.clone(),
        ReconcilerConfig {
            page_delay: config.price_sync_page_delay,
            ..ReconcilerConfig::default()
        },
    ));
    start_price_sync_job(db.clone(), reconciler, config.price_sync_interval);

    let snapshotter = Arc::new(DailyHistorySnapshotter::new(
        platforms.clone(),
        history.clone(),
        clock.clone(),
        config.history_retention_days,
    ));
    start_history_snapshot_job(db.clone(), snapshotter, config.history_snapshot_interval);

    // Expired rate-limit windows and session versions
    let purge_kv = kv.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            ticker.tick().await;
            let purged = purge_kv.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "Purged expired KV entries");
            }
        }
    });

    let state = AppState {
        platforms,
        history,
        clock: clock.clone(),
        rate_budget: RateBudget::new(kv.clone(), clock.clone(), "ratelimit"),
        rate_limit: RateLimitSettings {
            window: config.api_rate_limit_window,
            max_requests: config.api_rate_limit_max_requests,
        },
        sessions: Arc::new(SessionVersionGuard::new(kv, clock, config.session_ttl)),
    };

    let app = handlers::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind listener");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received");
    })
    .await
    .expect("Server error");
}
