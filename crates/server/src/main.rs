use anyhow::Result;
use cadence_shared::{PgStore, bootstrap};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

#[tokio::main]
async fn main() -> Result<()> {
    bootstrap::init_env();

    // The guard must be kept alive for the duration of the program to ensure logs are flushed
    let _guard = init_tracing();

    tracing::info!("Starting Cadence unified server");

    let config = config::UnifiedConfig::from_env()?;
    tracing::info!("Configuration loaded");

    // One pool shared by both services
    let pool = bootstrap::init_db(&config.core).await?;

    // Run migrations ONCE
    bootstrap::run_migrations(&pool).await?;

    let store = PgStore::new(pool);

    // Create shutdown coordination
    let shutdown = CancellationToken::new();

    let api_handle = spawn_api(store.clone(), config.clone(), shutdown.clone());
    let worker_handle = spawn_worker(store, config, shutdown.clone());

    tracing::info!("All services started");

    wait_for_shutdown().await;
    tracing::info!("Shutdown signal received");

    shutdown.cancel();

    let (api_result, worker_result) = tokio::join!(api_handle, worker_handle);
    for (name, result) in [("API", api_result), ("Worker", worker_result)] {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("{} service failed: {:#}", name, e),
            Err(e) => tracing::error!("{} task panicked: {}", name, e),
        }
    }

    tracing::info!("All services stopped gracefully");
    Ok(())
}

fn spawn_api(
    store: PgStore,
    config: config::UnifiedConfig,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<Result<()>> {
    tokio::spawn(async move {
        let state = api::AppState::new(store, config.core.scheduling);
        let api_config = config.to_api_config();

        tokio::select! {
            result = api::run_api(state, &api_config) => {
                tracing::error!("API service exited: {:?}", result);
                result.map_err(|e| anyhow::anyhow!(e))
            }
            _ = shutdown.cancelled() => {
                tracing::info!("API service shutting down");
                Ok(())
            }
        }
    })
}

fn spawn_worker(
    store: PgStore,
    config: config::UnifiedConfig,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<Result<()>> {
    tokio::spawn(async move {
        let worker_config = config.to_worker_config();
        worker::run_worker(store, worker_config, Some(shutdown)).await
    })
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Single subscriber for the whole process; the file layer writes JSON
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,api=debug,worker=debug,cadence_core=debug,sqlx=warn".into());

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(true);

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    let enable_file_logging = std::env::var("ENABLE_FILE_LOGGING")
        .map(|v| v.to_lowercase() != "false" && v != "0")
        .unwrap_or(true);

    if enable_file_logging {
        let log_dir = std::env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string());
        let file_appender = tracing_appender::rolling::daily(log_dir, "cadence.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(non_blocking)
            .json();

        registry.with(file_layer).init();
        Some(guard)
    } else {
        registry.init();
        None
    }
}
