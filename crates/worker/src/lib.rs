//! Cadence Worker - scheduled maintenance passes
//!
//! Each pass completes past appointments, then tops up the materialization
//! window and the financial projections of every owner with active rules.

mod config;

pub use config::Config;

use anyhow::{Context, Result};
use cadence_core::{SchedulingConfig, Store};
use cadence_core::engine::{derive_financial_projections, materialize, sweep_past_appointments};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Totals of one worker pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub owners: u32,
    pub swept: u64,
    pub created: u32,
    pub updated: u32,
    pub finance_created: u32,
    pub finance_updated: u32,
    pub errors: Vec<String>,
}

/// Run one pass over every owner with active rules
///
/// A failing owner is logged and recorded; the remaining owners still run.
pub async fn run_once<S: Store>(
    store: &S,
    scheduling: &SchedulingConfig,
    now: DateTime<Utc>,
) -> Result<PassReport> {
    let mut report = PassReport::default();

    match sweep_past_appointments(store, now, scheduling.default_duration()).await {
        Ok(sweep) => report.swept = sweep.updated,
        Err(e) => {
            warn!("Sweep failed: {}", e);
            report.errors.push(format!("sweep: {}", e));
        }
    }

    let owners = store
        .find_owners_with_active_rules()
        .await
        .context("Failed to list owners with active rules")?;

    for owner_id in owners {
        report.owners += 1;

        match materialize(store, scheduling, owner_id, None, now, None).await {
            Ok(m) => {
                report.created += m.created;
                report.updated += m.updated;
                report.errors.extend(m.errors);
            }
            Err(e) => {
                warn!("Materialization failed for owner {}: {}", owner_id, e);
                report.errors.push(format!("owner {}: materialize: {}", owner_id, e));
                continue;
            }
        }

        match derive_financial_projections(store, owner_id, now).await {
            Ok(p) => {
                report.finance_created += p.finance_created;
                report.finance_updated += p.finance_updated;
                report.errors.extend(p.errors);
            }
            Err(e) => {
                warn!("Projection failed for owner {}: {}", owner_id, e);
                report.errors.push(format!("owner {}: projections: {}", owner_id, e));
            }
        }
    }

    Ok(report)
}

/// Run the background worker service
///
/// Runs passes on the poll interval until cancelled, or a single pass when
/// `config.run_once` is set.
///
/// # Arguments
/// * `store` - Persistent storage
/// * `config` - Worker configuration
/// * `shutdown` - Optional cancellation token for graceful shutdown
pub async fn run_worker<S: Store>(
    store: S,
    config: Config,
    shutdown: Option<CancellationToken>,
) -> Result<()> {
    info!(
        "Starting worker: poll_interval={}s, window_days={}, run_once={}",
        config.poll_interval_secs, config.scheduling.window_days, config.run_once
    );

    let poll_interval = Duration::from_secs(config.poll_interval_secs);

    loop {
        if let Some(ref token) = shutdown
            && token.is_cancelled()
        {
            info!("Worker received shutdown signal");
            break;
        }

        match run_once(&store, &config.scheduling, Utc::now()).await {
            Ok(report) if report.errors.is_empty() => info!(
                owners = report.owners,
                swept = report.swept,
                created = report.created,
                updated = report.updated,
                finance_created = report.finance_created,
                finance_updated = report.finance_updated,
                "Worker pass completed"
            ),
            Ok(report) => warn!(
                owners = report.owners,
                created = report.created,
                errors = report.errors.len(),
                "Worker pass completed with errors: {:?}",
                report.errors
            ),
            Err(e) => error!("Worker pass failed: {:#}", e),
        }

        if config.run_once {
            break;
        }

        match shutdown {
            Some(ref token) => {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("Worker received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
            None => tokio::time::sleep(poll_interval).await,
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::config::CoreConfig;
    use cadence_core::models::{AppointmentStatus, NewAppointment};
    use cadence_core::rule::RuleDraft;
    use cadence_core::store::memory::MemoryStore;
    use cadence_core::timezone::Timezone;
    use cadence_core::types::OwnerId;
    use chrono::{NaiveDate, NaiveTime, TimeZone};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn scheduling() -> SchedulingConfig {
        SchedulingConfig {
            window_days: 14,
            ..SchedulingConfig::default()
        }
    }

    fn config(run_once: bool) -> Config {
        Config {
            core: CoreConfig {
                database_url: "postgres://localhost".to_string(),
                db_max_connections: 1,
                scheduling: scheduling(),
            },
            poll_interval_secs: 3600,
            run_once,
        }
    }

    /// Mon & Thu 18:00 UTC from `start_date`
    async fn seed_rule(store: &MemoryStore, owner_id: OwnerId, start_date: &str, active: bool) {
        let rule = RuleDraft {
            title: "Yoga".to_string(),
            client_id: None,
            weekdays: vec![1, 4],
            time_of_day: "18:00".to_string(),
            timezone: "UTC".to_string(),
            interval_weeks: 1,
            start_date: start_date.to_string(),
            end_date: None,
            max_occurrences: None,
            amount: Some(Decimal::from(30)),
            active,
        }
        .validate()
        .unwrap();
        store.create_rule(owner_id, &rule).await.unwrap();
    }

    fn monday_morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_pass_covers_every_owner() {
        let store = MemoryStore::new();
        let alice = OwnerId::from(Uuid::new_v4());
        let bob = OwnerId::from(Uuid::new_v4());
        let idle = OwnerId::from(Uuid::new_v4());
        seed_rule(&store, alice, "2026-03-02", true).await;
        seed_rule(&store, bob, "2026-03-02", true).await;
        seed_rule(&store, idle, "2026-03-02", false).await;

        let report = run_once(&store, &scheduling(), monday_morning()).await.unwrap();

        assert_eq!(report.owners, 2);
        // 03-02, 03-05, 03-09, 03-12 for each active owner
        assert_eq!(report.created, 8);
        assert_eq!(report.finance_created, 8);
        assert!(report.errors.is_empty());
        assert!(store.appointments().iter().all(|a| a.owner_id != idle));
    }

    #[tokio::test]
    async fn test_pass_is_idempotent() {
        let store = MemoryStore::new();
        let owner = OwnerId::from(Uuid::new_v4());
        seed_rule(&store, owner, "2026-03-02", true).await;

        let first = run_once(&store, &scheduling(), monday_morning()).await.unwrap();
        let second = run_once(&store, &scheduling(), monday_morning()).await.unwrap();

        assert_eq!(first.created, 4);
        assert_eq!(second.created, 0);
        assert_eq!(second.finance_created, 0);
        assert_eq!(store.appointments().len(), 4);
        assert_eq!(store.financial_entries().len(), 4);
    }

    #[tokio::test]
    async fn test_pass_sweeps_past_appointments() {
        let store = MemoryStore::new();
        let owner = OwnerId::from(Uuid::new_v4());
        let start_at = Utc.with_ymd_and_hms(2026, 2, 27, 9, 0, 0).unwrap();
        store
            .create_appointment(&NewAppointment {
                owner_id: owner,
                recurring_rule_id: None,
                client_id: None,
                client_name: Some("Walk-in".to_string()),
                service: None,
                start_at,
                end_at: None,
                occurrence_date: NaiveDate::from_ymd_opt(2026, 2, 27).unwrap(),
                time_of_day: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                timezone: Timezone::new("UTC").unwrap(),
                amount: None,
                payment_method: None,
                notes: None,
                status: AppointmentStatus::Scheduled,
            })
            .await
            .unwrap();

        let report = run_once(&store, &scheduling(), monday_morning()).await.unwrap();

        assert_eq!(report.swept, 1);
        assert_eq!(report.owners, 0);
        assert_eq!(store.appointments()[0].status, AppointmentStatus::Completed);
    }

    #[tokio::test]
    async fn test_run_once_mode_returns() {
        let store = MemoryStore::new();
        let owner = OwnerId::from(Uuid::new_v4());
        let today = Utc::now().date_naive().to_string();
        seed_rule(&store, owner, &today, true).await;

        run_worker(store.clone(), config(true), None).await.unwrap();

        assert!(!store.appointments().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_worker_stops() {
        let store = MemoryStore::new();
        let token = CancellationToken::new();
        token.cancel();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            run_worker(store.clone(), config(false), Some(token)),
        )
        .await;

        assert!(matches!(result, Ok(Ok(()))));
        assert!(store.appointments().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_interrupts_sleep() {
        let store = MemoryStore::new();
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_worker(store.clone(), config(false), Some(token.clone())));

        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }
}
