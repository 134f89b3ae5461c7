//! In-process [`Store`] implementation
//!
//! Keeps every collection behind one mutex, so the uniqueness check and the
//! insert happen atomically just like the database's unique index. Used by
//! tests and for running the API without a database.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;

use super::{FinanceFilter, Store, StoreResult, UpsertOutcome};
use crate::error::StoreError;
use crate::models::{
    Appointment, AppointmentPatch, AppointmentStatus, Client, FinancialEntry, NewAppointment,
    NewFinancialEntry, RecurringRule,
};
use crate::rule::ValidRule;
use crate::types::{AppointmentId, ClientId, FinancialEntryId, OwnerId, RuleId};

#[derive(Debug, Default)]
struct State {
    rules: HashMap<RuleId, RecurringRule>,
    clients: HashMap<ClientId, Client>,
    appointments: HashMap<AppointmentId, Appointment>,
    entries: HashMap<FinancialEntryId, FinancialEntry>,
    failing_dates: HashSet<NaiveDate>,
}

/// Shared in-memory store; clones refer to the same data
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store poisoned".to_string()))
    }

    /// Register a client record
    pub fn insert_client(&self, client: Client) {
        if let Ok(mut state) = self.lock() {
            state.clients.insert(client.id, client);
        }
    }

    /// Put a fully-formed appointment in place, bypassing the insert path
    pub fn seed_appointment(&self, appointment: Appointment) {
        if let Ok(mut state) = self.lock() {
            state.appointments.insert(appointment.id, appointment);
        }
    }

    /// Put a fully-formed financial entry in place, keeping its `created_at`
    pub fn seed_financial_entry(&self, entry: FinancialEntry) {
        if let Ok(mut state) = self.lock() {
            state.entries.insert(entry.id, entry);
        }
    }

    /// Make appointment inserts for `date` fail as if the store were unreachable
    pub fn fail_inserts_on(&self, date: NaiveDate) {
        if let Ok(mut state) = self.lock() {
            state.failing_dates.insert(date);
        }
    }

    /// Snapshot of every appointment, ordered by start
    pub fn appointments(&self) -> Vec<Appointment> {
        let mut all: Vec<Appointment> = self
            .lock()
            .map(|s| s.appointments.values().cloned().collect())
            .unwrap_or_default();
        all.sort_by_key(|a| (a.start_at, a.id));
        all
    }

    /// Snapshot of every financial entry, ordered by due date
    pub fn financial_entries(&self) -> Vec<FinancialEntry> {
        let mut all: Vec<FinancialEntry> = self
            .lock()
            .map(|s| s.entries.values().cloned().collect())
            .unwrap_or_default();
        all.sort_by_key(|e| (e.due_date, e.created_at, e.id));
        all
    }
}

fn materialize_row(new: &NewAppointment) -> Appointment {
    let now = Utc::now();
    Appointment {
        id: AppointmentId::new(),
        owner_id: new.owner_id,
        recurring_rule_id: new.recurring_rule_id,
        client_id: new.client_id,
        client_name: new.client_name.clone(),
        service: new.service.clone(),
        start_at: new.start_at,
        end_at: new.end_at,
        occurrence_date: new.occurrence_date,
        time_of_day: new.time_of_day,
        timezone: new.timezone,
        amount: new.amount,
        payment_method: new.payment_method.clone(),
        notes: new.notes.clone(),
        status: new.status,
        created_at: now,
        updated_at: now,
    }
}

fn sorted_by_start(mut rows: Vec<Appointment>) -> Vec<Appointment> {
    rows.sort_by_key(|a| (a.start_at, a.id));
    rows
}

impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        self.lock().map(|_| ())
    }

    async fn find_active_rules(
        &self,
        owner_id: OwnerId,
        rule_id: Option<RuleId>,
    ) -> StoreResult<Vec<RecurringRule>> {
        let state = self.lock()?;
        let mut rules: Vec<RecurringRule> = state
            .rules
            .values()
            .filter(|r| r.owner_id == owner_id && r.active)
            .filter(|r| rule_id.is_none_or(|id| r.id == id))
            .cloned()
            .collect();
        rules.sort_by_key(|r| (r.created_at, r.id));
        Ok(rules)
    }

    async fn find_rule(&self, rule_id: RuleId) -> StoreResult<Option<RecurringRule>> {
        Ok(self.lock()?.rules.get(&rule_id).cloned())
    }

    async fn find_owners_with_active_rules(&self) -> StoreResult<Vec<OwnerId>> {
        let state = self.lock()?;
        let mut owners: Vec<OwnerId> = state
            .rules
            .values()
            .filter(|r| r.active)
            .map(|r| r.owner_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        owners.sort();
        Ok(owners)
    }

    async fn create_rule(&self, owner_id: OwnerId, rule: &ValidRule) -> StoreResult<RecurringRule> {
        let now = Utc::now();
        let row = RecurringRule {
            id: RuleId::new(),
            owner_id,
            client_id: rule.client_id,
            title: rule.title.clone(),
            policy: rule.policy.clone(),
            amount: rule.amount,
            active: rule.active,
            created_at: now,
            updated_at: now,
        };
        self.lock()?.rules.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_rule(
        &self,
        rule_id: RuleId,
        rule: &ValidRule,
    ) -> StoreResult<Option<RecurringRule>> {
        let mut state = self.lock()?;
        Ok(state.rules.get_mut(&rule_id).map(|row| {
            row.client_id = rule.client_id;
            row.title = rule.title.clone();
            row.policy = rule.policy.clone();
            row.amount = rule.amount;
            row.active = rule.active;
            row.updated_at = Utc::now();
            row.clone()
        }))
    }

    async fn find_client(&self, client_id: ClientId) -> StoreResult<Option<Client>> {
        Ok(self.lock()?.clients.get(&client_id).cloned())
    }

    async fn upsert_appointment(&self, appointment: &NewAppointment) -> StoreResult<UpsertOutcome> {
        let mut state = self.lock()?;
        if state.failing_dates.contains(&appointment.occurrence_date) {
            return Err(StoreError::Unavailable(format!(
                "injected failure for {}",
                appointment.occurrence_date
            )));
        }

        if let Some(rule_id) = appointment.recurring_rule_id {
            let existing = state.appointments.values().find(|a| {
                a.recurring_rule_id == Some(rule_id)
                    && a.occurrence_date == appointment.occurrence_date
            });
            if let Some(existing) = existing {
                return Ok(UpsertOutcome::Conflict(existing.clone()));
            }
        }

        let row = materialize_row(appointment);
        state.appointments.insert(row.id, row.clone());
        Ok(UpsertOutcome::Created(row))
    }

    async fn create_appointment(&self, appointment: &NewAppointment) -> StoreResult<Appointment> {
        match self.upsert_appointment(appointment).await? {
            UpsertOutcome::Created(row) => Ok(row),
            UpsertOutcome::Conflict(_) => Err(StoreError::UniqueViolation(
                "appointments_rule_occurrence_key".to_string(),
            )),
        }
    }

    async fn get_appointment(&self, id: AppointmentId) -> StoreResult<Option<Appointment>> {
        Ok(self.lock()?.appointments.get(&id).cloned())
    }

    async fn list_appointments(
        &self,
        owner_id: OwnerId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<Appointment>> {
        let state = self.lock()?;
        let rows = state
            .appointments
            .values()
            .filter(|a| a.owner_id == owner_id)
            .filter(|a| from.is_none_or(|f| a.start_at >= f))
            .filter(|a| to.is_none_or(|t| a.start_at < t))
            .cloned()
            .collect();
        Ok(sorted_by_start(rows))
    }

    async fn find_future_appointments(
        &self,
        owner_id: OwnerId,
        rule_id: Option<RuleId>,
        from: NaiveDate,
    ) -> StoreResult<Vec<Appointment>> {
        let state = self.lock()?;
        let rows = state
            .appointments
            .values()
            .filter(|a| a.owner_id == owner_id && a.occurrence_date >= from)
            .filter(|a| rule_id.is_none_or(|id| a.recurring_rule_id == Some(id)))
            .cloned()
            .collect();
        Ok(sorted_by_start(rows))
    }

    async fn find_appointments_by_ids(&self, ids: &[AppointmentId]) -> StoreResult<Vec<Appointment>> {
        let state = self.lock()?;
        let rows = ids
            .iter()
            .filter_map(|id| state.appointments.get(id).cloned())
            .collect();
        Ok(sorted_by_start(rows))
    }

    async fn find_overlapping_appointments(
        &self,
        owner_id: OwnerId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        default_duration: Duration,
    ) -> StoreResult<Vec<Appointment>> {
        let state = self.lock()?;
        let rows = state
            .appointments
            .values()
            .filter(|a| a.owner_id == owner_id)
            .filter(|a| a.start_at < end && start < a.effective_end(default_duration))
            .cloned()
            .collect();
        Ok(sorted_by_start(rows))
    }

    async fn update_appointment(
        &self,
        id: AppointmentId,
        patch: &AppointmentPatch,
    ) -> StoreResult<Option<Appointment>> {
        let mut state = self.lock()?;

        if let Some(current) = state.appointments.get(&id) {
            let mut updated = current.clone();
            patch.apply_to(&mut updated);
            let clashes = updated.recurring_rule_id.is_some()
                && state.appointments.values().any(|other| {
                    other.id != id
                        && other.recurring_rule_id == updated.recurring_rule_id
                        && other.occurrence_date == updated.occurrence_date
                });
            if clashes {
                return Err(StoreError::UniqueViolation(
                    "appointments_rule_occurrence_key".to_string(),
                ));
            }
            updated.updated_at = Utc::now();
            state.appointments.insert(id, updated.clone());
            Ok(Some(updated))
        } else {
            Ok(None)
        }
    }

    async fn delete_appointments(&self, ids: &[AppointmentId]) -> StoreResult<u64> {
        let mut state = self.lock()?;
        Ok(ids
            .iter()
            .filter(|id| state.appointments.remove(*id).is_some())
            .count() as u64)
    }

    async fn complete_past_appointments(
        &self,
        now: DateTime<Utc>,
        default_duration: Duration,
    ) -> StoreResult<u64> {
        let mut state = self.lock()?;
        let mut updated = 0;
        for appointment in state.appointments.values_mut() {
            if appointment.status == AppointmentStatus::Scheduled
                && appointment.effective_end(default_duration) <= now
            {
                appointment.status = AppointmentStatus::Completed;
                appointment.updated_at = now;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn find_financial_entries(&self, filter: &FinanceFilter) -> StoreResult<Vec<FinancialEntry>> {
        let state = self.lock()?;
        let mut rows: Vec<FinancialEntry> = state
            .entries
            .values()
            .filter(|e| match filter {
                FinanceFilter::AppointmentIds(ids) => {
                    e.appointment_id.is_some_and(|id| ids.contains(&id))
                }
                FinanceFilter::Owner(owner_id) => e.owner_id == *owner_id,
                FinanceFilter::DueFrom {
                    owner_id,
                    from,
                    status,
                } => {
                    e.owner_id == *owner_id
                        && e.due_date >= *from
                        && status.is_none_or(|s| e.status == s)
                }
            })
            .cloned()
            .collect();
        rows.sort_by_key(|e| (e.due_date, e.created_at, e.id));
        Ok(rows)
    }

    async fn insert_financial_entry(&self, entry: &NewFinancialEntry) -> StoreResult<FinancialEntry> {
        let row = FinancialEntry {
            id: FinancialEntryId::new(),
            owner_id: entry.owner_id,
            due_date: entry.due_date,
            amount: entry.amount,
            status: entry.status,
            kind: entry.kind,
            note: entry.note.clone(),
            appointment_id: entry.appointment_id,
            recurring_rule_id: entry.recurring_rule_id,
            created_at: Utc::now(),
        };
        self.lock()?.entries.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_financial_entry_amount(
        &self,
        id: FinancialEntryId,
        amount: Decimal,
    ) -> StoreResult<bool> {
        let mut state = self.lock()?;
        Ok(state
            .entries
            .get_mut(&id)
            .map(|entry| entry.amount = Some(amount))
            .is_some())
    }

    async fn delete_financial_entries(&self, ids: &[FinancialEntryId]) -> StoreResult<u64> {
        let mut state = self.lock()?;
        Ok(ids
            .iter()
            .filter(|id| state.entries.remove(*id).is_some())
            .count() as u64)
    }
}
