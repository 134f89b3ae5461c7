//! Cadence Core - Scheduling domain logic
//!
//! Recurring rules, occurrence generation, and the engine that materializes
//! occurrences into appointments and financial projections. All persistence
//! goes through the [`store::Store`] trait.

pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod payload;
pub mod recurrence;
pub mod rule;
pub mod store;
pub mod timezone;
pub mod types;

pub use config::{CoreConfig, SchedulingConfig};
pub use error::{ConfigError, SchedulingError, SchedulingResult, StoreError, ValidationErrors};
pub use payload::sanitize_appointment_payload;
pub use recurrence::{Occurrences, occurrences_between};
pub use store::Store;
pub use timezone::{parse_timezone, to_absolute_instant, to_local_parts, validate_timezone};
