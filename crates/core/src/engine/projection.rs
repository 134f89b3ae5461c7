//! Financial projections derived from materialized appointments

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::local_today;
use crate::error::SchedulingResult;
use crate::models::{
    Appointment, AppointmentPatch, AppointmentStatus, FinancialEntry, FinancialKind,
    FinancialStatus, NewFinancialEntry, RecurringRule,
};
use crate::store::{FinanceFilter, Store};
use crate::types::{AppointmentId, OwnerId};

/// Counts reported by [`derive_financial_projections`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectionReport {
    pub appointments_updated: u32,
    pub finance_updated: u32,
    pub finance_created: u32,
    pub rules_considered: u32,
    /// Completed appointments and appointments with a user-set amount
    pub skipped: u32,
    pub errors: Vec<String>,
}

/// Amount a rule's occurrences are billed at
///
/// The rule's own amount wins, then the client's package price, then zero.
pub fn effective_amount(rule: &RecurringRule, package_price: Option<Decimal>) -> Decimal {
    rule.amount.or(package_price).unwrap_or(Decimal::ZERO)
}

/// Human-readable label of the projection for an appointment
pub(crate) fn entry_note(appointment: &Appointment) -> String {
    match (appointment.service.as_deref(), appointment.client_name.as_deref()) {
        (Some(service), Some(client)) => format!("{} - {}", service, client),
        (Some(label), None) | (None, Some(label)) => label.to_string(),
        (None, None) => "Appointment".to_string(),
    }
}

fn is_billable(appointment: &Appointment) -> bool {
    matches!(
        appointment.status,
        AppointmentStatus::Scheduled | AppointmentStatus::Confirmed
    )
}

/// Fill in missing amounts and expected income entries for an owner's future
/// rule-linked appointments
///
/// Completed appointments and amounts the user customized are never touched.
/// Running it twice in a row changes nothing the second time.
pub async fn derive_financial_projections<S: Store>(
    store: &S,
    owner_id: OwnerId,
    now: DateTime<Utc>,
) -> SchedulingResult<ProjectionReport> {
    let mut report = ProjectionReport::default();

    let rules = store.find_active_rules(owner_id, None).await?;
    for rule in &rules {
        report.rules_considered += 1;
        if let Err(e) = derive_for_rule(store, rule, now, &mut report).await {
            warn!("Failed to derive projections for rule {}: {}", rule.id, e);
            report.errors.push(format!("rule {}: {}", rule.id, e));
        }
    }

    info!(
        owner_id = %owner_id,
        appointments_updated = report.appointments_updated,
        finance_updated = report.finance_updated,
        finance_created = report.finance_created,
        skipped = report.skipped,
        failed = report.errors.len(),
        "Projection derivation finished"
    );

    Ok(report)
}

async fn derive_for_rule<S: Store>(
    store: &S,
    rule: &RecurringRule,
    now: DateTime<Utc>,
    report: &mut ProjectionReport,
) -> SchedulingResult<()> {
    let package_price = match rule.client_id {
        Some(client_id) => store
            .find_client(client_id)
            .await?
            .and_then(|c| c.package_price),
        None => None,
    };
    let effective = effective_amount(rule, package_price);
    let today = local_today(rule, now);

    let mut appointments = store
        .find_future_appointments(rule.owner_id, Some(rule.id), today)
        .await?;
    debug!(
        "Rule {} has {} future appointment(s), effective amount {}",
        rule.id,
        appointments.len(),
        effective
    );

    for appointment in appointments.iter_mut() {
        if appointment.status == AppointmentStatus::Completed || !appointment.lacks_amount() {
            report.skipped += 1;
            continue;
        }
        if !is_billable(appointment) || effective <= Decimal::ZERO {
            continue;
        }
        match store
            .update_appointment(appointment.id, &AppointmentPatch::amount(effective))
            .await
        {
            Ok(Some(updated)) => {
                *appointment = updated;
                report.appointments_updated += 1;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Failed to set amount on appointment {}: {}", appointment.id, e);
                report
                    .errors
                    .push(format!("appointment {}: {}", appointment.id, e));
            }
        }
    }

    let ids: Vec<AppointmentId> = appointments.iter().map(|a| a.id).collect();
    if ids.is_empty() {
        return Ok(());
    }
    let entries = store
        .find_financial_entries(&FinanceFilter::AppointmentIds(ids))
        .await?;

    let mut linked: HashMap<AppointmentId, Vec<&FinancialEntry>> = HashMap::new();
    for entry in &entries {
        if let Some(id) = entry.appointment_id {
            linked.entry(id).or_default().push(entry);
        }
    }

    for appointment in &appointments {
        if appointment.status == AppointmentStatus::Completed {
            continue;
        }
        let amount = appointment
            .amount
            .filter(|a| *a > Decimal::ZERO)
            .unwrap_or(effective);

        match linked.get(&appointment.id) {
            Some(entries) => {
                for entry in entries {
                    if entry.status != FinancialStatus::Expected
                        || !entry.lacks_amount()
                        || amount <= Decimal::ZERO
                    {
                        continue;
                    }
                    match store.update_financial_entry_amount(entry.id, amount).await {
                        Ok(true) => report.finance_updated += 1,
                        Ok(false) => {}
                        Err(e) => {
                            warn!("Failed to correct financial entry {}: {}", entry.id, e);
                            report.errors.push(format!("entry {}: {}", entry.id, e));
                        }
                    }
                }
            }
            None => {
                let Some(amount) = appointment.amount.filter(|a| *a > Decimal::ZERO) else {
                    continue;
                };
                if !is_billable(appointment) {
                    continue;
                }
                let entry = NewFinancialEntry {
                    owner_id: appointment.owner_id,
                    due_date: appointment.occurrence_date,
                    amount: Some(amount),
                    status: FinancialStatus::Expected,
                    kind: FinancialKind::Income,
                    note: entry_note(appointment),
                    appointment_id: Some(appointment.id),
                    recurring_rule_id: appointment.recurring_rule_id,
                };
                match store.insert_financial_entry(&entry).await {
                    Ok(_) => report.finance_created += 1,
                    Err(e) => {
                        warn!(
                            "Failed to create financial entry for appointment {}: {}",
                            appointment.id, e
                        );
                        report
                            .errors
                            .push(format!("appointment {}: {}", appointment.id, e));
                    }
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulingConfig;
    use crate::engine::fixtures::{monday_morning, setup};
    use crate::engine::materialize;
    use crate::types::FinancialEntryId;

    async fn materialized(
        amount: Option<Decimal>,
        package_price: Option<Decimal>,
    ) -> (crate::store::memory::MemoryStore, OwnerId, RecurringRule) {
        let (store, owner, _, rule) = setup(amount, package_price).await;
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
        (store, owner, rule)
    }

    #[test]
    fn test_effective_amount_precedence() {
        let rule = |amount| RecurringRule {
            id: Default::default(),
            owner_id: Default::default(),
            client_id: None,
            title: String::new(),
            policy: crate::engine::fixtures::mon_thu_rule(None, None).policy,
            amount,
            active: true,
            created_at: monday_morning(),
            updated_at: monday_morning(),
        };

        assert_eq!(
            effective_amount(&rule(Some(Decimal::from(50))), Some(Decimal::from(90))),
            Decimal::from(50)
        );
        assert_eq!(effective_amount(&rule(None), Some(Decimal::from(90))), Decimal::from(90));
        assert_eq!(effective_amount(&rule(None), None), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_creates_one_entry_per_appointment() {
        let (store, owner, rule) = materialized(Some(Decimal::from(50)), None).await;

        let report = derive_financial_projections(&store, owner, monday_morning())
            .await
            .unwrap();

        assert_eq!(report.rules_considered, 1);
        assert_eq!(report.finance_created, 4);
        assert!(report.errors.is_empty());

        let entries = store.financial_entries();
        assert_eq!(entries.len(), 4);
        for entry in &entries {
            assert_eq!(entry.amount, Some(Decimal::from(50)));
            assert_eq!(entry.status, FinancialStatus::Expected);
            assert_eq!(entry.kind, FinancialKind::Income);
            assert_eq!(entry.recurring_rule_id, Some(rule.id));
            assert_eq!(entry.note, "Pilates - Carla");
        }
    }

    #[tokio::test]
    async fn test_second_run_changes_nothing() {
        let (store, owner, _) = materialized(Some(Decimal::from(50)), None).await;

        derive_financial_projections(&store, owner, monday_morning())
            .await
            .unwrap();
        let appointments = store.appointments();
        let entries = store.financial_entries();

        let second = derive_financial_projections(&store, owner, monday_morning())
            .await
            .unwrap();

        assert_eq!(second.appointments_updated, 0);
        assert_eq!(second.finance_created, 0);
        assert_eq!(second.finance_updated, 0);
        assert_eq!(store.appointments(), appointments);
        assert_eq!(store.financial_entries(), entries);
    }

    #[tokio::test]
    async fn test_fills_missing_amounts_after_price_set() {
        let (store, owner, rule) = materialized(None, None).await;
        assert!(store.appointments().iter().all(|a| a.amount.is_none()));

        let mut priced = crate::engine::fixtures::mon_thu_rule(rule.client_id, Some(Decimal::from(70)));
        priced.title = rule.title.clone();
        store.update_rule(rule.id, &priced).await.unwrap();

        let report = derive_financial_projections(&store, owner, monday_morning())
            .await
            .unwrap();

        assert_eq!(report.appointments_updated, 4);
        assert_eq!(report.finance_created, 4);
        assert!(store
            .appointments()
            .iter()
            .all(|a| a.amount == Some(Decimal::from(70))));
    }

    #[tokio::test]
    async fn test_customized_and_completed_are_untouched() {
        let (store, owner, _) = materialized(None, Some(Decimal::from(40))).await;
        let rows = store.appointments();

        // custom price
        store
            .update_appointment(rows[0].id, &AppointmentPatch::amount(Decimal::from(99)))
            .await
            .unwrap();
        // completed with no amount
        store
            .update_appointment(
                rows[1].id,
                &AppointmentPatch {
                    status: Some(AppointmentStatus::Completed),
                    amount: Some(Decimal::ZERO),
                    ..AppointmentPatch::default()
                },
            )
            .await
            .unwrap();

        let report = derive_financial_projections(&store, owner, monday_morning())
            .await
            .unwrap();

        // every row is either completed or already priced
        assert_eq!(report.appointments_updated, 0);
        assert_eq!(report.skipped, 4);

        let after = store.appointments();
        assert_eq!(after[0].amount, Some(Decimal::from(99)));
        assert_eq!(after[1].amount, Some(Decimal::ZERO));

        let entries = store.financial_entries();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.appointment_id != Some(rows[1].id)));
        let custom = entries
            .iter()
            .find(|e| e.appointment_id == Some(rows[0].id))
            .unwrap();
        assert_eq!(custom.amount, Some(Decimal::from(99)));
    }

    #[tokio::test]
    async fn test_corrects_zero_amount_entries() {
        let (store, owner, rule) = materialized(Some(Decimal::from(50)), None).await;
        let first = store.appointments()[0].clone();
        let stale_id = FinancialEntryId::new();
        store.seed_financial_entry(FinancialEntry {
            id: stale_id,
            owner_id: owner,
            due_date: first.occurrence_date,
            amount: Some(Decimal::ZERO),
            status: FinancialStatus::Expected,
            kind: FinancialKind::Income,
            note: entry_note(&first),
            appointment_id: Some(first.id),
            recurring_rule_id: Some(rule.id),
            created_at: monday_morning(),
        });

        let report = derive_financial_projections(&store, owner, monday_morning())
            .await
            .unwrap();

        assert_eq!(report.finance_updated, 1);
        assert_eq!(report.finance_created, 3);
        let corrected = store
            .financial_entries()
            .into_iter()
            .find(|e| e.id == stale_id)
            .unwrap();
        assert_eq!(corrected.amount, Some(Decimal::from(50)));
    }

    #[tokio::test]
    async fn test_zero_effective_creates_nothing() {
        let (store, owner, _) = materialized(None, None).await;
        let report = derive_financial_projections(&store, owner, monday_morning())
            .await
            .unwrap();
        assert_eq!(report.appointments_updated, 0);
        assert_eq!(report.finance_created, 0);
        assert!(store.financial_entries().is_empty());
    }

    #[test]
    fn test_entry_note() {
        let (date, time) = (monday_morning().date_naive(), monday_morning().time());
        let mut appointment = Appointment {
            id: AppointmentId::new(),
            owner_id: OwnerId::new(),
            recurring_rule_id: None,
            client_id: None,
            client_name: Some("Carla".to_string()),
            service: Some("Pilates".to_string()),
            start_at: monday_morning(),
            end_at: None,
            occurrence_date: date,
            time_of_day: time,
            timezone: Default::default(),
            amount: None,
            payment_method: None,
            notes: None,
            status: AppointmentStatus::Scheduled,
            created_at: monday_morning(),
            updated_at: monday_morning(),
        };
        assert_eq!(entry_note(&appointment), "Pilates - Carla");
        appointment.service = None;
        assert_eq!(entry_note(&appointment), "Carla");
        appointment.client_name = None;
        assert_eq!(entry_note(&appointment), "Appointment");
    }
}
