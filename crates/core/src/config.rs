//! Shared configuration logic
//!
//! Handles loading of common environment variables.

use crate::error::ConfigError;
use chrono::Duration;
use std::env;

/// Common configuration used across services
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections (default: 20)
    pub db_max_connections: u32,

    /// Scheduling policy
    pub scheduling: SchedulingConfig,
}

impl CoreConfig {
    /// Load common configuration from environment variables
    ///
    /// This will also initialize dotenv if it hasn't been done yet.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?,
            db_max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 20)?,
            scheduling: SchedulingConfig::from_env()?,
        })
    }
}

/// Policy knobs of the materialization engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulingConfig {
    /// Rolling materialization window in days, starting today (default: 84)
    pub window_days: u32,

    /// Length of an appointment stored without an explicit end (default: 60)
    pub default_duration_minutes: i64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            window_days: 84,
            default_duration_minutes: crate::models::DEFAULT_DURATION_MINUTES,
        }
    }
}

impl SchedulingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            window_days: parse_var("MATERIALIZE_WINDOW_DAYS", defaults.window_days)?,
            default_duration_minutes: parse_var(
                "APPOINTMENT_DEFAULT_DURATION_MINUTES",
                defaults.default_duration_minutes,
            )?,
        })
    }

    pub fn default_duration(&self) -> Duration {
        Duration::minutes(self.default_duration_minutes)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            value,
        }),
        Err(_) => Ok(default),
    }
}
