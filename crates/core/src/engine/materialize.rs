//! Materialization of rule occurrences into appointments
//!
//! Brings the appointment collection into agreement with what each active
//! rule says should exist inside a rolling window. Inserts are keyed on
//! `(recurring_rule_id, occurrence_date)` at the store, so concurrent runs
//! over overlapping windows cannot duplicate rows.

use chrono::{DateTime, Days, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::local_today;
use super::projection::effective_amount;
use crate::config::SchedulingConfig;
use crate::error::{SchedulingResult, StoreError};
use crate::models::{Appointment, AppointmentPatch, AppointmentStatus, NewAppointment, RecurringRule};
use crate::recurrence::Occurrences;
use crate::rule::RulePolicy;
use crate::store::{Store, UpsertOutcome};
use crate::timezone::to_absolute_instant;
use crate::types::{OwnerId, RuleId};

/// Counts reported by [`materialize`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaterializeReport {
    pub created: u32,
    /// Existing rows moved to an edited rule's new time or timezone
    pub updated: u32,
    /// Existing rows left untouched
    pub skipped: u32,
    pub window_days: u32,
    pub errors: Vec<String>,
}

/// Materialize occurrences of an owner's active rules
///
/// Covers `[today, today + window_days)` in each rule's own timezone and never
/// creates appointments that already started. When `window_days` is `None`
/// the configured window applies. Existing rows are never modified; a key
/// conflict counts as skipped.
pub async fn materialize<S: Store>(
    store: &S,
    config: &SchedulingConfig,
    owner_id: OwnerId,
    rule_id: Option<RuleId>,
    now: DateTime<Utc>,
    window_days: Option<u32>,
) -> SchedulingResult<MaterializeReport> {
    let window_days = window_days.unwrap_or(config.window_days);
    let mut report = MaterializeReport {
        window_days,
        ..MaterializeReport::default()
    };

    let rules = store.find_active_rules(owner_id, rule_id).await?;
    debug!("Materializing {} rule(s) for owner {}", rules.len(), owner_id);

    for rule in &rules {
        materialize_rule(store, config, rule, None, now, window_days, &mut report).await;
    }

    info!(
        owner_id = %owner_id,
        created = report.created,
        updated = report.updated,
        skipped = report.skipped,
        failed = report.errors.len(),
        window_days,
        "Materialization finished"
    );

    Ok(report)
}

/// Materialize one rule right after its schedule was edited
///
/// Same as [`materialize`] for that rule, except that future scheduled rows
/// still sitting exactly where `previous` placed them move to the new time
/// and timezone and count as updated. Rows the user moved, confirmed or
/// otherwise touched keep their slot.
pub async fn materialize_edited_rule<S: Store>(
    store: &S,
    config: &SchedulingConfig,
    rule: &RecurringRule,
    previous: &RulePolicy,
    now: DateTime<Utc>,
) -> SchedulingResult<MaterializeReport> {
    let mut report = MaterializeReport {
        window_days: config.window_days,
        ..MaterializeReport::default()
    };
    if rule.active {
        materialize_rule(store, config, rule, Some(previous), now, config.window_days, &mut report)
            .await;
    }

    info!(
        rule_id = %rule.id,
        created = report.created,
        updated = report.updated,
        skipped = report.skipped,
        failed = report.errors.len(),
        "Rematerialized edited rule"
    );

    Ok(report)
}

async fn materialize_rule<S: Store>(
    store: &S,
    config: &SchedulingConfig,
    rule: &RecurringRule,
    previous: Option<&RulePolicy>,
    now: DateTime<Utc>,
    window_days: u32,
    report: &mut MaterializeReport,
) {
    if window_days == 0 {
        return;
    }

    let today = local_today(rule, now);
    let Some(window_end) = today.checked_add_days(Days::new(u64::from(window_days) - 1)) else {
        return;
    };

    let client = match rule.client_id {
        Some(client_id) => match store.find_client(client_id).await {
            Ok(client) => client,
            Err(e) => {
                warn!("Failed to load client {} for rule {}: {}", client_id, rule.id, e);
                report
                    .errors
                    .push(format!("rule {}: failed to load client: {}", rule.id, e));
                return;
            }
        },
        None => None,
    };

    let amount = effective_amount(rule, client.as_ref().and_then(|c| c.package_price));
    let duration = config.default_duration();
    let tz = rule.policy.timezone.tz();

    for date in Occurrences::new(&rule.policy, today, window_end) {
        let start_at = to_absolute_instant(date, rule.policy.time_of_day, tz);
        if start_at <= now {
            continue;
        }
        let Some(end_at) = start_at.checked_add_signed(duration) else {
            report
                .errors
                .push(format!("rule {} on {}: end out of range", rule.id, date));
            continue;
        };
        let new = NewAppointment {
            owner_id: rule.owner_id,
            recurring_rule_id: Some(rule.id),
            client_id: rule.client_id,
            client_name: client.as_ref().map(|c| c.name.clone()),
            service: (!rule.title.is_empty()).then(|| rule.title.clone()),
            start_at,
            end_at: Some(end_at),
            occurrence_date: date,
            time_of_day: rule.policy.time_of_day,
            timezone: rule.policy.timezone,
            amount: (!amount.is_zero()).then_some(amount),
            payment_method: None,
            notes: None,
            status: AppointmentStatus::Scheduled,
        };

        match store.upsert_appointment(&new).await {
            Ok(UpsertOutcome::Created(created)) => {
                debug!("Created appointment {} for rule {} on {}", created.id, rule.id, date);
                report.created += 1;
            }
            Ok(UpsertOutcome::Conflict(existing)) => {
                let Some(previous) = previous else {
                    report.skipped += 1;
                    continue;
                };
                match realign(store, &existing, previous, &new, now, duration).await {
                    Ok(true) => report.updated += 1,
                    Ok(false) => report.skipped += 1,
                    Err(e) => {
                        warn!("Failed to realign appointment {}: {}", existing.id, e);
                        report
                            .errors
                            .push(format!("rule {} on {}: {}", rule.id, date, e));
                    }
                }
            }
            // A concurrent run won the insert race
            Err(StoreError::UniqueViolation(_)) => report.skipped += 1,
            Err(e) => {
                warn!("Failed to materialize rule {} on {}: {}", rule.id, date, e);
                report
                    .errors
                    .push(format!("rule {} on {}: {}", rule.id, date, e));
            }
        }
    }
}

/// Whether a row still sits exactly where `previous` put it
fn placed_by(existing: &Appointment, previous: &RulePolicy) -> bool {
    existing.time_of_day == previous.time_of_day
        && existing.timezone == previous.timezone
        && existing.start_at
            == to_absolute_instant(
                existing.occurrence_date,
                previous.time_of_day,
                previous.timezone.tz(),
            )
}

/// Move an untouched, still-scheduled row from the previous slot to the
/// rule's current one
///
/// Returns whether the row changed.
async fn realign<S: Store>(
    store: &S,
    existing: &Appointment,
    previous: &RulePolicy,
    wanted: &NewAppointment,
    now: DateTime<Utc>,
    default_duration: Duration,
) -> Result<bool, StoreError> {
    if existing.start_at <= now
        || existing.status != AppointmentStatus::Scheduled
        || !placed_by(existing, previous)
        || existing.start_at == wanted.start_at
    {
        return Ok(false);
    }

    let length = existing
        .end_at
        .map_or(default_duration, |end| end - existing.start_at);
    let Some(end_at) = wanted.start_at.checked_add_signed(length) else {
        return Ok(false);
    };
    let patch = AppointmentPatch {
        start_at: Some(wanted.start_at),
        end_at: Some(end_at),
        time_of_day: Some(wanted.time_of_day),
        timezone: Some(wanted.timezone),
        ..AppointmentPatch::default()
    };

    Ok(store.update_appointment(existing.id, &patch).await?.is_some())
}
