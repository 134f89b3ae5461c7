//! Past-appointment status sweeper

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::SchedulingResult;
use crate::store::Store;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub updated: u64,
}

/// Persist `completed` for every `scheduled` appointment that has ended
///
/// One bulk store update; running it again right away updates nothing.
pub async fn sweep_past_appointments<S: Store>(
    store: &S,
    now: DateTime<Utc>,
    default_duration: Duration,
) -> SchedulingResult<SweepReport> {
    let updated = store.complete_past_appointments(now, default_duration).await?;
    if updated > 0 {
        info!("Marked {} past appointment(s) as completed", updated);
    }
    Ok(SweepReport { updated })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulingConfig;
    use crate::engine::fixtures::{monday_morning, setup};
    use crate::engine::materialize;
    use crate::models::{AppointmentPatch, AppointmentStatus};

    #[tokio::test]
    async fn test_sweep_completes_ended_and_is_idempotent() {
        let (store, owner, _, _) = setup(None, None).await;
        materialize(
            &store,
            &SchedulingConfig::default(),
            owner,
            None,
            monday_morning(),
            Some(14),
        )
        .await
        .unwrap();
        let hour = Duration::minutes(60);

        // Friday: Monday and Thursday sessions are over
        let friday = monday_morning() + Duration::days(4);
        let first = sweep_past_appointments(&store, friday, hour).await.unwrap();
        let second = sweep_past_appointments(&store, friday, hour).await.unwrap();

        assert_eq!(first.updated, 2);
        assert_eq!(second.updated, 0);

        let statuses: Vec<_> = store.appointments().iter().map(|a| a.status).collect();
        assert_eq!(
            statuses,
            vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Completed,
                AppointmentStatus::Scheduled,
                AppointmentStatus::Scheduled,
            ]
        );
    }

    #[tokio::test]
    async fn test_sweep_leaves_other_statuses() {
        let (store, owner, _, _) = setup(None, None).await;
        materialize(
            &store,
            &SchedulingConfig::default(),
            owner,
            None,
            monday_morning(),
            Some(7),
        )
        .await
        .unwrap();
        let rows = store.appointments();
        for (row, status) in rows.iter().zip([AppointmentStatus::NoShow, AppointmentStatus::Cancelled]) {
            store
                .update_appointment(
                    row.id,
                    &AppointmentPatch {
                        status: Some(status),
                        ..AppointmentPatch::default()
                    },
                )
                .await
                .unwrap();
        }

        let report = sweep_past_appointments(
            &store,
            monday_morning() + Duration::days(30),
            Duration::minutes(60),
        )
        .await
        .unwrap();

        assert_eq!(report.updated, 0);
    }
}
