use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tracing::info;

use domain::services::events::{EventBus, LogSubscriber};
use persistence::repositories::SettingRepository;

use plexguard_api::app::{create_app, AppState};
use plexguard_api::config::Config;
use plexguard_api::jobs::{CleanupDevicesJob, JobScheduler, PoolMetricsJob, SessionPollLoop};
use plexguard_api::middleware::logging::init_logging;
use plexguard_api::services::enforcement::EnforcementService;
use plexguard_api::services::plex::PlexClient;
use plexguard_api::services::settings::SettingsStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    init_logging(&config.logging);

    info!("Starting PlexGuard v{}", env!("CARGO_PKG_VERSION"));

    let pool = persistence::db::create_pool(&config.database_config()).await?;

    info!("Running database migrations...");
    sqlx::migrate!("../persistence/src/migrations").run(&pool).await?;

    let settings = SettingsStore::new(SettingRepository::new(pool.clone()));
    settings.ensure_defaults().await?;

    let mut event_bus = EventBus::new();
    event_bus.subscribe(LogSubscriber);
    let events = Arc::new(event_bus);

    let plex = PlexClient::new(Arc::clone(&settings));
    let enforcement = EnforcementService::new(
        pool.clone(),
        Arc::clone(&plex),
        Arc::clone(&settings),
        Arc::clone(&events),
    );

    // Maintenance jobs.
    let mut scheduler = JobScheduler::new();
    scheduler.register(CleanupDevicesJob::new(pool.clone(), Arc::clone(&settings)));
    scheduler.register(PoolMetricsJob::new(pool.clone()));
    scheduler.start();

    // The enforcement poll loop.
    let (poll_shutdown_tx, poll_shutdown_rx) = watch::channel(false);
    let poll_handle = SessionPollLoop::new(
        Arc::clone(&enforcement),
        Arc::clone(&settings),
        poll_shutdown_rx,
    )
    .spawn();

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        settings,
        plex,
        enforcement,
        events,
    };
    let app = create_app(state);

    let addr = config.socket_addr()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let the in-flight tick finish, then stop the background tasks.
    info!("Shutting down");
    let _ = poll_shutdown_tx.send(true);
    let _ = poll_handle.await;
    scheduler.shutdown();
    scheduler.wait_for_shutdown(Duration::from_secs(10)).await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
