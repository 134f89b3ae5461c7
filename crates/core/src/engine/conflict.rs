//! Time-slot conflict detection

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SchedulingResult;
use crate::models::{Appointment, AppointmentStatus};
use crate::store::Store;
use crate::timezone::{Timezone, to_absolute_instant};
use crate::types::{AppointmentId, OwnerId};

/// A proposed slot, expressed in the owner's local wall-clock time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ConflictCandidate {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub timezone: Timezone,
}

/// An existing appointment that overlaps a candidate slot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictingAppointment {
    pub id: AppointmentId,
    pub client_name: Option<String>,
    pub service: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub occurrence_date: NaiveDate,
    pub time_of_day: NaiveTime,
    pub timezone: Timezone,
    pub status: AppointmentStatus,
}

impl ConflictingAppointment {
    fn from_appointment(appointment: Appointment, default_duration: Duration) -> Self {
        Self {
            end_at: appointment.effective_end(default_duration),
            id: appointment.id,
            client_name: appointment.client_name,
            service: appointment.service,
            start_at: appointment.start_at,
            occurrence_date: appointment.occurrence_date,
            time_of_day: appointment.time_of_day,
            timezone: appointment.timezone,
            status: appointment.status,
        }
    }
}

/// Half-open interval overlap: touching endpoints do not conflict
pub fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// Appointments of `owner_id` overlapping the candidate slot
///
/// The candidate lasts `default_duration`. Cancelled appointments never
/// block a slot, and `exclude_id` lets an appointment being edited ignore
/// itself.
pub async fn detect_conflicts<S: Store>(
    store: &S,
    candidate: &ConflictCandidate,
    owner_id: OwnerId,
    exclude_id: Option<AppointmentId>,
    default_duration: Duration,
) -> SchedulingResult<Vec<ConflictingAppointment>> {
    let start = to_absolute_instant(candidate.date, candidate.time, candidate.timezone.tz());
    let end = start + default_duration;

    let rows = store
        .find_overlapping_appointments(owner_id, start, end, default_duration)
        .await?;

    Ok(rows
        .into_iter()
        .filter(|a| Some(a.id) != exclude_id)
        .filter(|a| a.status != AppointmentStatus::Cancelled)
        .filter(|a| overlaps(start, end, a.start_at, a.effective_end(default_duration)))
        .map(|a| ConflictingAppointment::from_appointment(a, default_duration))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures::{date, time};
    use crate::models::NewAppointment;
    use crate::store::memory::MemoryStore;
    use chrono::TimeZone;

    fn hour() -> Duration {
        Duration::minutes(60)
    }

    fn sao_paulo() -> Timezone {
        Timezone::new("America/Sao_Paulo").unwrap()
    }

    async fn book(store: &MemoryStore, owner: OwnerId, hh: u32, mm: u32) -> Appointment {
        let tz = sao_paulo();
        let day = date(2026, 3, 10);
        let start_at = to_absolute_instant(day, time(hh, mm), tz.tz());
        store
            .create_appointment(&NewAppointment {
                owner_id: owner,
                recurring_rule_id: None,
                client_id: None,
                client_name: Some("Bruno".to_string()),
                service: Some("Consult".to_string()),
                start_at,
                end_at: None,
                occurrence_date: day,
                time_of_day: time(hh, mm),
                timezone: tz,
                amount: None,
                payment_method: None,
                notes: None,
                status: AppointmentStatus::Scheduled,
            })
            .await
            .unwrap()
    }

    fn candidate(hh: u32, mm: u32) -> ConflictCandidate {
        ConflictCandidate {
            date: date(2026, 3, 10),
            time: time(hh, mm),
            timezone: sao_paulo(),
        }
    }

    #[test]
    fn test_overlap_is_half_open() {
        let t = |h| Utc.with_ymd_and_hms(2026, 3, 10, h, 0, 0).unwrap();
        assert!(overlaps(t(10), t(11), t(10), t(11)));
        assert!(overlaps(t(10), t(12), t(11), t(13)));
        assert!(!overlaps(t(10), t(11), t(11), t(12)));
        assert!(!overlaps(t(11), t(12), t(10), t(11)));
    }

    #[test]
    fn test_overlap_is_symmetric() {
        let t = |h, m| Utc.with_ymd_and_hms(2026, 3, 10, h, m, 0).unwrap();
        let slots = [
            (t(9, 0), t(10, 0)),
            (t(9, 30), t(10, 30)),
            (t(10, 0), t(11, 0)),
            (t(8, 0), t(12, 0)),
        ];
        for (a_start, a_end) in slots {
            for (b_start, b_end) in slots {
                assert_eq!(
                    overlaps(a_start, a_end, b_start, b_end),
                    overlaps(b_start, b_end, a_start, a_end)
                );
            }
        }
    }

    #[tokio::test]
    async fn test_detects_partial_overlap() {
        let store = MemoryStore::new();
        let owner = OwnerId::new();
        let existing = book(&store, owner, 14, 0).await;

        let found = detect_conflicts(&store, &candidate(14, 30), owner, None, hour())
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, existing.id);
        assert_eq!(found[0].end_at, existing.start_at + hour());
        assert_eq!(found[0].client_name.as_deref(), Some("Bruno"));
    }

    #[tokio::test]
    async fn test_back_to_back_is_free() {
        let store = MemoryStore::new();
        let owner = OwnerId::new();
        book(&store, owner, 14, 0).await;

        let before = detect_conflicts(&store, &candidate(13, 0), owner, None, hour())
            .await
            .unwrap();
        let after = detect_conflicts(&store, &candidate(15, 0), owner, None, hour())
            .await
            .unwrap();

        assert!(before.is_empty());
        assert!(after.is_empty());
    }

    #[tokio::test]
    async fn test_exclude_self_when_editing() {
        let store = MemoryStore::new();
        let owner = OwnerId::new();
        let existing = book(&store, owner, 14, 0).await;

        let found = detect_conflicts(&store, &candidate(14, 0), owner, Some(existing.id), hour())
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_does_not_block() {
        let store = MemoryStore::new();
        let owner = OwnerId::new();
        let existing = book(&store, owner, 14, 0).await;
        store
            .update_appointment(
                existing.id,
                &crate::models::AppointmentPatch {
                    status: Some(AppointmentStatus::Cancelled),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let found = detect_conflicts(&store, &candidate(14, 0), owner, None, hour())
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_other_owner_invisible() {
        let store = MemoryStore::new();
        book(&store, OwnerId::new(), 14, 0).await;

        let found = detect_conflicts(&store, &candidate(14, 0), OwnerId::new(), None, hour())
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_candidate_timezone_is_honored() {
        let store = MemoryStore::new();
        let owner = OwnerId::new();
        // 14:00 in Sao Paulo is 17:00 UTC
        book(&store, owner, 14, 0).await;

        let utc_candidate = ConflictCandidate {
            date: date(2026, 3, 10),
            time: time(17, 0),
            timezone: Timezone::default(),
        };
        let found = detect_conflicts(&store, &utc_candidate, owner, None, hour())
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }
}
