//! Pruning of future occurrences and reconciliation of financial projections

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::local_today;
use crate::error::{SchedulingError, SchedulingResult};
use crate::models::{AppointmentStatus, FinancialKind, FinancialStatus, RecurringRule};
use crate::recurrence::Occurrences;
use crate::store::{FinanceFilter, Store};
use crate::types::{AppointmentId, FinancialEntryId, OwnerId, RuleId};

/// Counts reported by [`prune_on_deactivate`] and [`prune_stale_occurrences`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub appointments_removed: u64,
    pub finance_removed: u64,
    pub errors: Vec<String>,
}

/// Counts reported by [`reconcile_financial_entries`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Expected entries with nothing left to back them
    pub future_removed: u64,
    pub duplicates_removed: u64,
    pub errors: Vec<String>,
}

/// Remove the untouched future of a rule that was just deactivated
///
/// Appointments that already happened, or read as completed, are history and
/// stay. Expected entries linked to removed appointments go first so a failure
/// never leaves an entry pointing at nothing.
pub async fn prune_on_deactivate<S: Store>(
    store: &S,
    rule_id: RuleId,
    now: DateTime<Utc>,
    default_duration: Duration,
) -> SchedulingResult<PruneReport> {
    let rule = store
        .find_rule(rule_id)
        .await?
        .ok_or(SchedulingError::RuleNotFound(rule_id))?;

    let today = local_today(&rule, now);
    let doomed: Vec<AppointmentId> = store
        .find_future_appointments(rule.owner_id, Some(rule.id), today)
        .await?
        .into_iter()
        .filter(|a| a.effective_status(now, default_duration) != AppointmentStatus::Completed)
        .map(|a| a.id)
        .collect();

    let report = remove_appointments(store, &doomed).await;
    info!(
        rule_id = %rule_id,
        appointments_removed = report.appointments_removed,
        finance_removed = report.finance_removed,
        "Pruned deactivated rule"
    );
    Ok(report)
}

/// Remove future appointments of an edited rule on dates it no longer fires
///
/// Completed rows are left alone, as are rows on dates the rule still
/// produces, so the following materialization only adds what is missing.
pub async fn prune_stale_occurrences<S: Store>(
    store: &S,
    rule: &RecurringRule,
    now: DateTime<Utc>,
    default_duration: Duration,
) -> SchedulingResult<PruneReport> {
    let today = local_today(rule, now);
    let future = store
        .find_future_appointments(rule.owner_id, Some(rule.id), today)
        .await?;

    let Some(horizon) = future.iter().map(|a| a.occurrence_date).max() else {
        return Ok(PruneReport::default());
    };
    let wanted: HashSet<NaiveDate> = Occurrences::new(&rule.policy, today, horizon).collect();

    let stale: Vec<AppointmentId> = future
        .iter()
        .filter(|a| !wanted.contains(&a.occurrence_date))
        .filter(|a| a.effective_status(now, default_duration) != AppointmentStatus::Completed)
        .map(|a| a.id)
        .collect();

    debug!("Rule {} has {} stale occurrence(s)", rule.id, stale.len());
    Ok(remove_appointments(store, &stale).await)
}

async fn remove_appointments<S: Store>(store: &S, ids: &[AppointmentId]) -> PruneReport {
    let mut report = PruneReport::default();
    if ids.is_empty() {
        return report;
    }

    let entries: Vec<FinancialEntryId> = match store
        .find_financial_entries(&FinanceFilter::AppointmentIds(ids.to_vec()))
        .await
    {
        Ok(entries) => entries
            .into_iter()
            .filter(|e| e.status == FinancialStatus::Expected)
            .map(|e| e.id)
            .collect(),
        Err(e) => {
            warn!("Failed to load financial entries for pruning: {}", e);
            report.errors.push(format!("load financial entries: {}", e));
            return report;
        }
    };

    if !entries.is_empty() {
        match store.delete_financial_entries(&entries).await {
            Ok(removed) => report.finance_removed = removed,
            Err(e) => {
                warn!("Failed to delete expected financial entries: {}", e);
                report.errors.push(format!("delete financial entries: {}", e));
                return report;
            }
        }
    }

    match store.delete_appointments(ids).await {
        Ok(removed) => report.appointments_removed = removed,
        Err(e) => {
            warn!("Failed to delete appointments: {}", e);
            report.errors.push(format!("delete appointments: {}", e));
        }
    }

    report
}

/// Clear stale expected projections and collapse duplicate entries
///
/// First removes expected entries due today or later that neither an existing
/// appointment nor an active rule backs. Then, for each `(note, due_date,
/// kind)` group, keeps the most recently created row and deletes the rest in
/// a single call so a group is deduplicated entirely or not at all.
pub async fn reconcile_financial_entries<S: Store>(
    store: &S,
    owner_id: OwnerId,
    today: NaiveDate,
) -> SchedulingResult<ReconcileReport> {
    let mut report = ReconcileReport::default();

    let expected = store
        .find_financial_entries(&FinanceFilter::DueFrom {
            owner_id,
            from: today,
            status: Some(FinancialStatus::Expected),
        })
        .await?;

    let appointment_ids: Vec<AppointmentId> =
        expected.iter().filter_map(|e| e.appointment_id).collect();
    let live_appointments: HashSet<AppointmentId> = if appointment_ids.is_empty() {
        HashSet::new()
    } else {
        store
            .find_appointments_by_ids(&appointment_ids)
            .await?
            .into_iter()
            .filter(|a| a.status != AppointmentStatus::Cancelled)
            .map(|a| a.id)
            .collect()
    };
    let active_rules: HashSet<RuleId> = store
        .find_active_rules(owner_id, None)
        .await?
        .into_iter()
        .map(|r| r.id)
        .collect();

    let stale: Vec<FinancialEntryId> = expected
        .iter()
        .filter(|e| match (e.appointment_id, e.recurring_rule_id) {
            (Some(appointment_id), _) => !live_appointments.contains(&appointment_id),
            (None, Some(rule_id)) => !active_rules.contains(&rule_id),
            (None, None) => true,
        })
        .map(|e| e.id)
        .collect();

    if !stale.is_empty() {
        match store.delete_financial_entries(&stale).await {
            Ok(removed) => report.future_removed = removed,
            Err(e) => {
                warn!("Failed to delete stale projections for {}: {}", owner_id, e);
                report.errors.push(format!("stale projections: {}", e));
            }
        }
    }

    let remaining = store
        .find_financial_entries(&FinanceFilter::Owner(owner_id))
        .await?;

    let mut groups: HashMap<(String, NaiveDate, FinancialKind), Vec<_>> = HashMap::new();
    for entry in remaining {
        groups
            .entry((entry.note.clone(), entry.due_date, entry.kind))
            .or_default()
            .push(entry);
    }

    for ((note, due_date, _), mut group) in groups {
        if group.len() < 2 {
            continue;
        }
        // newest first; id breaks ties between rows created in the same instant
        group.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let extra: Vec<FinancialEntryId> = group.iter().skip(1).map(|e| e.id).collect();

        match store.delete_financial_entries(&extra).await {
            Ok(removed) => report.duplicates_removed += removed,
            Err(e) => {
                warn!("Failed to deduplicate '{}' on {}: {}", note, due_date, e);
                report
                    .errors
                    .push(format!("duplicates of '{}' on {}: {}", note, due_date, e));
            }
        }
    }

    info!(
        owner_id = %owner_id,
        future_removed = report.future_removed,
        duplicates_removed = report.duplicates_removed,
        failed = report.errors.len(),
        "Financial reconciliation finished"
    );

    Ok(report)
}
