//! Store collaborator interface
//!
//! The scheduling engine reads and writes rules, appointments and financial
//! entries only through [`Store`]. Implementations own row-level isolation per
//! owner and the `(recurring_rule_id, occurrence_date)` uniqueness constraint;
//! the engine never emulates either with check-then-insert.

pub mod memory;

use std::future::Future;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::error::StoreError;
use crate::models::{
    Appointment, AppointmentPatch, Client, FinancialEntry, FinancialStatus, NewAppointment,
    NewFinancialEntry, RecurringRule,
};
use crate::rule::ValidRule;
use crate::types::{AppointmentId, ClientId, FinancialEntryId, OwnerId, RuleId};

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of an idempotent appointment insert
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    /// A new row was written
    Created(Appointment),
    /// A row with the same `(recurring_rule_id, occurrence_date)` already exists
    Conflict(Appointment),
}

/// Selection of financial entries
#[derive(Debug, Clone, PartialEq)]
pub enum FinanceFilter {
    /// Entries linked to any of these appointments
    AppointmentIds(Vec<AppointmentId>),
    /// Every entry of an owner
    Owner(OwnerId),
    /// Entries of an owner due on or after `from`, optionally with one status
    DueFrom {
        owner_id: OwnerId,
        from: NaiveDate,
        status: Option<FinancialStatus>,
    },
}

/// Operations the scheduling core needs from persistent storage
pub trait Store: Send + Sync {
    /// Cheap connectivity check
    fn ping(&self) -> impl Future<Output = StoreResult<()>> + Send;

    /// Active rules of an owner, optionally narrowed to one rule
    fn find_active_rules(
        &self,
        owner_id: OwnerId,
        rule_id: Option<RuleId>,
    ) -> impl Future<Output = StoreResult<Vec<RecurringRule>>> + Send;

    fn find_rule(&self, rule_id: RuleId)
    -> impl Future<Output = StoreResult<Option<RecurringRule>>> + Send;

    fn find_owners_with_active_rules(&self)
    -> impl Future<Output = StoreResult<Vec<OwnerId>>> + Send;

    fn create_rule(
        &self,
        owner_id: OwnerId,
        rule: &ValidRule,
    ) -> impl Future<Output = StoreResult<RecurringRule>> + Send;

    /// Replace the editable fields of a rule, including its active flag
    fn update_rule(
        &self,
        rule_id: RuleId,
        rule: &ValidRule,
    ) -> impl Future<Output = StoreResult<Option<RecurringRule>>> + Send;

    fn find_client(&self, client_id: ClientId)
    -> impl Future<Output = StoreResult<Option<Client>>> + Send;

    /// Insert keyed on `(recurring_rule_id, occurrence_date)`; an existing
    /// row is returned untouched as [`UpsertOutcome::Conflict`]
    fn upsert_appointment(
        &self,
        appointment: &NewAppointment,
    ) -> impl Future<Output = StoreResult<UpsertOutcome>> + Send;

    /// Plain insert for one-off appointments
    fn create_appointment(
        &self,
        appointment: &NewAppointment,
    ) -> impl Future<Output = StoreResult<Appointment>> + Send;

    fn get_appointment(
        &self,
        id: AppointmentId,
    ) -> impl Future<Output = StoreResult<Option<Appointment>>> + Send;

    /// Appointments of an owner ordered by start, optionally bounded by start instant
    fn list_appointments(
        &self,
        owner_id: OwnerId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> impl Future<Output = StoreResult<Vec<Appointment>>> + Send;

    /// Appointments with `occurrence_date >= from`, optionally of one rule
    fn find_future_appointments(
        &self,
        owner_id: OwnerId,
        rule_id: Option<RuleId>,
        from: NaiveDate,
    ) -> impl Future<Output = StoreResult<Vec<Appointment>>> + Send;

    fn find_appointments_by_ids(
        &self,
        ids: &[AppointmentId],
    ) -> impl Future<Output = StoreResult<Vec<Appointment>>> + Send;

    /// Appointments of an owner whose `[start, end)` intersects `[start, end)`
    fn find_overlapping_appointments(
        &self,
        owner_id: OwnerId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        default_duration: Duration,
    ) -> impl Future<Output = StoreResult<Vec<Appointment>>> + Send;

    fn update_appointment(
        &self,
        id: AppointmentId,
        patch: &AppointmentPatch,
    ) -> impl Future<Output = StoreResult<Option<Appointment>>> + Send;

    /// Delete in one statement; returns the number of rows removed
    fn delete_appointments(
        &self,
        ids: &[AppointmentId],
    ) -> impl Future<Output = StoreResult<u64>> + Send;

    /// Bulk-mark `scheduled` rows whose end is at or before `now` as `completed`
    fn complete_past_appointments(
        &self,
        now: DateTime<Utc>,
        default_duration: Duration,
    ) -> impl Future<Output = StoreResult<u64>> + Send;

    fn find_financial_entries(
        &self,
        filter: &FinanceFilter,
    ) -> impl Future<Output = StoreResult<Vec<FinancialEntry>>> + Send;

    fn insert_financial_entry(
        &self,
        entry: &NewFinancialEntry,
    ) -> impl Future<Output = StoreResult<FinancialEntry>> + Send;

    fn update_financial_entry_amount(
        &self,
        id: FinancialEntryId,
        amount: Decimal,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Delete in one statement; returns the number of rows removed
    fn delete_financial_entries(
        &self,
        ids: &[FinancialEntryId],
    ) -> impl Future<Output = StoreResult<u64>> + Send;
}
