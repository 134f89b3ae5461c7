use anyhow::{Context, Result};
use cadence_core::config::CoreConfig;
use std::env;

#[derive(Debug, Clone)]
pub struct UnifiedConfig {
    pub core: CoreConfig,
    pub api: ApiConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origin: String,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval_secs: u64,
}

impl UnifiedConfig {
    pub fn from_env() -> Result<Self> {
        let core = CoreConfig::from_env()?;

        Ok(Self {
            core,
            api: ApiConfig {
                host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
                port: env::var("API_PORT")
                    .unwrap_or_else(|_| "3000".into())
                    .parse()
                    .context("API_PORT must be a valid port")?,
                cors_allowed_origin: env::var("CORS_ALLOWED_ORIGIN").unwrap_or_else(|_| "*".into()),
            },
            worker: WorkerConfig {
                poll_interval_secs: env::var("WORKER_POLL_INTERVAL_SECS")
                    .unwrap_or_else(|_| "300".into())
                    .parse()
                    .context("WORKER_POLL_INTERVAL_SECS must be a valid integer")?,
            },
        })
    }

    pub fn to_api_config(&self) -> api::config::Config {
        api::config::Config {
            core: self.core.clone(),
            host: self.api.host.clone(),
            port: self.api.port,
            cors_allowed_origin: self.api.cors_allowed_origin.clone(),
        }
    }

    /// The embedded worker always loops; one-shot runs use the standalone binary
    pub fn to_worker_config(&self) -> worker::Config {
        worker::Config {
            core: self.core.clone(),
            poll_interval_secs: self.worker.poll_interval_secs,
            run_once: false,
        }
    }
}
