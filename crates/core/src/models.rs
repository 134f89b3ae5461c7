//! Core domain models for Cadence
//!
//! These models represent the core business entities and map to database tables.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::rule::RulePolicy;
use crate::timezone::Timezone;
use crate::types::{AppointmentId, ClientId, FinancialEntryId, OwnerId, RuleId};

/// Length assumed for an appointment stored without an explicit end
pub const DEFAULT_DURATION_MINUTES: i64 = 60;

/// Recurring rule entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[derive(sqlx::FromRow)]
pub struct RecurringRule {
    pub id: RuleId,
    pub owner_id: OwnerId,
    pub client_id: Option<ClientId>,
    pub title: String,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub policy: RulePolicy,
    pub amount: Option<Decimal>, // falls back to the client's package price
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Client entity (read-only to the scheduling core)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[derive(sqlx::FromRow)]
pub struct Client {
    pub id: ClientId,
    pub owner_id: OwnerId,
    pub name: String,
    pub package_price: Option<Decimal>,
}

/// Appointment status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(sqlx::Type)]
#[sqlx(type_name = "appointment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    NoShow,
    Cancelled,
}

/// Appointment entity, either materialized from a rule or standalone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[derive(sqlx::FromRow)]
pub struct Appointment {
    pub id: AppointmentId,
    pub owner_id: OwnerId,
    pub recurring_rule_id: Option<RuleId>,
    pub client_id: Option<ClientId>,
    pub client_name: Option<String>,
    pub service: Option<String>,
    pub start_at: DateTime<Utc>,     // authoritative instant
    pub end_at: Option<DateTime<Utc>>,
    pub occurrence_date: NaiveDate,  // local date in `timezone`
    pub time_of_day: NaiveTime,
    #[sqlx(try_from = "String")]
    pub timezone: Timezone,          // display only
    pub amount: Option<Decimal>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// End instant, falling back to `start_at + default_duration`
    pub fn effective_end(&self, default_duration: Duration) -> DateTime<Utc> {
        self.end_at.unwrap_or(self.start_at + default_duration)
    }

    /// Status a reader should see right now
    ///
    /// A `scheduled` appointment whose end has passed reads as `completed`
    /// even before the sweeper persists it.
    pub fn effective_status(&self, now: DateTime<Utc>, default_duration: Duration) -> AppointmentStatus {
        if self.status == AppointmentStatus::Scheduled && self.effective_end(default_duration) <= now {
            AppointmentStatus::Completed
        } else {
            self.status
        }
    }

    /// Amount is unset or zero
    pub fn lacks_amount(&self) -> bool {
        self.amount.is_none_or(|a| a.is_zero())
    }
}

/// Fields for inserting an appointment
#[derive(Debug, Clone, PartialEq)]
pub struct NewAppointment {
    pub owner_id: OwnerId,
    pub recurring_rule_id: Option<RuleId>,
    pub client_id: Option<ClientId>,
    pub client_name: Option<String>,
    pub service: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub occurrence_date: NaiveDate,
    pub time_of_day: NaiveTime,
    pub timezone: Timezone,
    pub amount: Option<Decimal>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
    pub status: AppointmentStatus,
}

/// Partial update of an appointment; `None` leaves a column unchanged
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppointmentPatch {
    pub recurring_rule_id: Option<RuleId>,
    pub client_id: Option<ClientId>,
    pub client_name: Option<String>,
    pub service: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub occurrence_date: Option<NaiveDate>,
    pub time_of_day: Option<NaiveTime>,
    pub timezone: Option<Timezone>,
    pub amount: Option<Decimal>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
    pub status: Option<AppointmentStatus>,
}

impl AppointmentPatch {
    pub fn amount(amount: Decimal) -> Self {
        Self {
            amount: Some(amount),
            ..Self::default()
        }
    }

    /// Apply the patch to an in-memory row
    pub fn apply_to(&self, appointment: &mut Appointment) {
        if let Some(v) = self.recurring_rule_id {
            appointment.recurring_rule_id = Some(v);
        }
        if let Some(v) = self.client_id {
            appointment.client_id = Some(v);
        }
        if let Some(v) = &self.client_name {
            appointment.client_name = Some(v.clone());
        }
        if let Some(v) = &self.service {
            appointment.service = Some(v.clone());
        }
        if let Some(v) = self.start_at {
            appointment.start_at = v;
        }
        if let Some(v) = self.end_at {
            appointment.end_at = Some(v);
        }
        if let Some(v) = self.occurrence_date {
            appointment.occurrence_date = v;
        }
        if let Some(v) = self.time_of_day {
            appointment.time_of_day = v;
        }
        if let Some(v) = self.timezone {
            appointment.timezone = v;
        }
        if let Some(v) = self.amount {
            appointment.amount = Some(v);
        }
        if let Some(v) = &self.payment_method {
            appointment.payment_method = Some(v.clone());
        }
        if let Some(v) = &self.notes {
            appointment.notes = Some(v.clone());
        }
        if let Some(v) = self.status {
            appointment.status = v;
        }
    }
}

/// Financial entry status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(sqlx::Type)]
#[sqlx(type_name = "finance_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FinancialStatus {
    Expected,
    Realized,
    Cancelled,
}

/// Financial entry category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(sqlx::Type)]
#[sqlx(type_name = "finance_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FinancialKind {
    Income,
    Expense,
}

/// Financial entry entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[derive(sqlx::FromRow)]
pub struct FinancialEntry {
    pub id: FinancialEntryId,
    pub owner_id: OwnerId,
    pub due_date: NaiveDate,
    pub amount: Option<Decimal>,
    pub status: FinancialStatus,
    pub kind: FinancialKind,
    pub note: String,
    pub appointment_id: Option<AppointmentId>,
    pub recurring_rule_id: Option<RuleId>, // originating rule, if any
    pub created_at: DateTime<Utc>,
}

impl FinancialEntry {
    pub fn lacks_amount(&self) -> bool {
        self.amount.is_none_or(|a| a.is_zero())
    }
}

/// Fields for inserting a financial entry
#[derive(Debug, Clone, PartialEq)]
pub struct NewFinancialEntry {
    pub owner_id: OwnerId,
    pub due_date: NaiveDate,
    pub amount: Option<Decimal>,
    pub status: FinancialStatus,
    pub kind: FinancialKind,
    pub note: String,
    pub appointment_id: Option<AppointmentId>,
    pub recurring_rule_id: Option<RuleId>,
}
