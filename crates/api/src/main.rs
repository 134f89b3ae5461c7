use anyhow::{Context, Result};
use api::AppState;
use cadence_shared::{PgStore, bootstrap};

#[tokio::main]
async fn main() -> Result<()> {
    bootstrap::init_env();
    let _guard = bootstrap::init_tracing("api");

    tracing::info!("Starting Cadence API server");

    // Load configuration
    let config = api::config::Config::from_env()?;
    tracing::info!(
        "Server configuration loaded: {}:{}",
        config.host,
        config.port
    );

    let pool = bootstrap::init_db(&config).await?;
    bootstrap::run_migrations(&pool).await?;

    let state = AppState::new(PgStore::new(pool), config.scheduling);

    // Start server using library function
    api::run_api(state, &config)
        .await
        .context("API server exited with an error")?;

    Ok(())
}
