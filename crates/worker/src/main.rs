//! Cadence worker binary (standalone mode)
//!
//! Runs the scheduled passes on their own. Set `WORKER_RUN_ONCE=true` to run
//! one pass and exit, e.g. from cron.

use anyhow::Result;
use cadence_shared::{PgStore, bootstrap};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    bootstrap::init_env();
    let _guard = bootstrap::init_tracing("worker");

    info!("Starting Cadence worker (standalone mode)");

    let config = worker::Config::from_env()?;

    let pool = bootstrap::init_db(&config).await?;
    bootstrap::run_migrations(&pool).await?;

    // No shutdown token in standalone mode
    worker::run_worker(PgStore::new(pool), config, None).await?;

    Ok(())
}
