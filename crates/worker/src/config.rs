//! Configuration for worker process
//!
//! Loads configuration from environment variables

use anyhow::{Context, Result};
use cadence_core::config::CoreConfig;
use std::env;
use std::ops::Deref;

/// Worker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Core configuration
    pub core: CoreConfig,

    /// Seconds between passes
    pub poll_interval_secs: u64,

    /// Run a single pass and exit, for cron-style invocation
    pub run_once: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let core = CoreConfig::from_env()?;
        Self::with_core(core)
    }

    /// Load the worker settings on top of an already loaded core config
    pub fn with_core(core: CoreConfig) -> Result<Self> {
        Ok(Self {
            core,
            poll_interval_secs: env::var("WORKER_POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .context("WORKER_POLL_INTERVAL_SECS must be a valid integer")?,

            run_once: env::var("WORKER_RUN_ONCE")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1"))
                .unwrap_or(false),
        })
    }
}

impl Deref for Config {
    type Target = CoreConfig;

    fn deref(&self) -> &Self::Target {
        &self.core
    }
}
