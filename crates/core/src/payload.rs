//! Appointment write payloads
//!
//! Callers send appointments as loose JSON objects. Before anything is parsed
//! the rule link is normalized to the single canonical key, so persistence
//! never sees the legacy alias.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{SchedulingError, SchedulingResult, ValidationErrors};
use crate::models::{Appointment, AppointmentPatch, AppointmentStatus, NewAppointment};
use crate::timezone::{Timezone, parse_local_date, parse_local_time, to_absolute_instant};
use crate::types::{ClientId, OwnerId, RuleId};

/// Canonical rule-linkage key
pub const RULE_LINK_KEY: &str = "recurring_rule_id";

/// Older clients still send this name for the rule link
pub const LEGACY_RULE_LINK_KEY: &str = "recurrence_id";

/// Merge the legacy rule-link key into the canonical one and drop it
///
/// When both keys carry a value the canonical one wins. Every other key is
/// passed through untouched.
///
/// # Examples
///
/// ```
/// use cadence_core::payload::sanitize_appointment_payload;
/// use serde_json::json;
///
/// let raw = json!({ "recurrence_id": "7f3c1d6e-52a4-4c1b-9a47-0c4f1b2a9e10", "notes": "x" });
/// let clean = sanitize_appointment_payload(raw.as_object().unwrap().clone());
/// assert!(clean.get("recurrence_id").is_none());
/// assert_eq!(clean["recurring_rule_id"], "7f3c1d6e-52a4-4c1b-9a47-0c4f1b2a9e10");
/// ```
pub fn sanitize_appointment_payload(mut payload: Map<String, Value>) -> Map<String, Value> {
    if let Some(legacy) = payload.remove(LEGACY_RULE_LINK_KEY) {
        let canonical_set = payload.get(RULE_LINK_KEY).is_some_and(|v| !v.is_null());
        if !canonical_set && !legacy.is_null() {
            payload.insert(RULE_LINK_KEY.to_string(), legacy);
        }
    }
    payload
}

/// Sanitize a raw payload and deserialize it
pub fn parse_payload<T: DeserializeOwned>(payload: Map<String, Value>) -> SchedulingResult<T> {
    serde_json::from_value(Value::Object(sanitize_appointment_payload(payload)))
        .map_err(|e| SchedulingError::invalid("payload", e.to_string()))
}

/// Fields accepted when creating an appointment
#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentDraft {
    pub recurring_rule_id: Option<RuleId>,
    pub client_id: Option<ClientId>,
    pub client_name: Option<String>,
    pub service: Option<String>,
    pub date: String,
    pub time: String,
    pub timezone: String,
    pub duration_minutes: Option<i64>,
    pub amount: Option<Decimal>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
    pub status: Option<AppointmentStatus>,
}

/// Fields accepted when editing an appointment; absent fields stay as stored
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentChanges {
    pub recurring_rule_id: Option<RuleId>,
    pub client_id: Option<ClientId>,
    pub client_name: Option<String>,
    pub service: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub timezone: Option<String>,
    pub duration_minutes: Option<i64>,
    pub amount: Option<Decimal>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
    pub status: Option<AppointmentStatus>,
}

struct Slot {
    date: Option<NaiveDate>,
    time: Option<NaiveTime>,
    timezone: Option<Timezone>,
    length: Option<Duration>,
}

fn check_slot(
    date: Option<&str>,
    time: Option<&str>,
    timezone: Option<&str>,
    duration_minutes: Option<i64>,
    amount: Option<Decimal>,
) -> SchedulingResult<Slot> {
    let mut errors = ValidationErrors::new();

    let date = date
        .map(|raw| parse_local_date(raw).map_err(|_| errors.push("date", "expected YYYY-MM-DD")))
        .transpose()
        .ok()
        .flatten();
    let time = time
        .map(|raw| {
            parse_local_time(raw)
                .map(|t| t.with_second(0).unwrap_or(t))
                .map_err(|_| errors.push("time", "expected HH:mm"))
        })
        .transpose()
        .ok()
        .flatten();
    let timezone = timezone
        .map(|raw| {
            Timezone::new(raw).map_err(|_| errors.push("timezone", format!("unsupported timezone: {}", raw)))
        })
        .transpose()
        .ok()
        .flatten();
    let length = match duration_minutes {
        Some(n) if n > 0 => Duration::try_minutes(n).or_else(|| {
            errors.push("duration_minutes", "too long");
            None
        }),
        Some(_) => {
            errors.push("duration_minutes", "must be positive");
            None
        }
        None => None,
    };
    if amount.is_some_and(|a| a.is_sign_negative() && !a.is_zero()) {
        errors.push("amount", "must not be negative");
    }

    errors.into_result(Slot {
        date,
        time,
        timezone,
        length,
    })
}

fn end_of(start_at: DateTime<Utc>, length: Duration) -> SchedulingResult<DateTime<Utc>> {
    start_at
        .checked_add_signed(length)
        .ok_or_else(|| SchedulingError::invalid("duration_minutes", "appointment ends out of range"))
}

impl AppointmentDraft {
    /// Validate and resolve the local slot to an absolute start instant
    pub fn into_new(self, owner_id: OwnerId, default_duration: Duration) -> SchedulingResult<NewAppointment> {
        let slot = check_slot(
            Some(&self.date),
            Some(&self.time),
            Some(&self.timezone),
            self.duration_minutes,
            self.amount,
        )?;
        let (Some(date), Some(time), Some(timezone)) = (slot.date, slot.time, slot.timezone) else {
            return Err(SchedulingError::invalid("date", "date, time and timezone are required"));
        };

        let start_at = to_absolute_instant(date, time, timezone.tz());
        Ok(NewAppointment {
            owner_id,
            recurring_rule_id: self.recurring_rule_id,
            client_id: self.client_id,
            client_name: self.client_name,
            service: self.service,
            start_at,
            end_at: Some(end_of(start_at, slot.length.unwrap_or(default_duration))?),
            occurrence_date: date,
            time_of_day: time,
            timezone,
            amount: self.amount,
            payment_method: self.payment_method,
            notes: self.notes,
            status: self.status.unwrap_or(AppointmentStatus::Scheduled),
        })
    }
}

impl AppointmentChanges {
    /// Validate the changes against the stored row and build a patch
    ///
    /// Moving any part of the local slot recomputes the start instant from
    /// the merged date, time and timezone. The appointment keeps its length
    /// unless a new duration is given.
    pub fn into_patch(self, current: &Appointment, default_duration: Duration) -> SchedulingResult<AppointmentPatch> {
        let slot = check_slot(
            self.date.as_deref(),
            self.time.as_deref(),
            self.timezone.as_deref(),
            self.duration_minutes,
            self.amount,
        )?;

        let moved = slot.date.is_some() || slot.time.is_some() || slot.timezone.is_some();
        let mut patch = AppointmentPatch {
            recurring_rule_id: self.recurring_rule_id,
            client_id: self.client_id,
            client_name: self.client_name,
            service: self.service,
            amount: self.amount,
            payment_method: self.payment_method,
            notes: self.notes,
            status: self.status,
            ..AppointmentPatch::default()
        };

        if moved || slot.length.is_some() {
            let date = slot.date.unwrap_or(current.occurrence_date);
            let time = slot.time.unwrap_or(current.time_of_day);
            let timezone = slot.timezone.unwrap_or(current.timezone);
            let start_at = if moved {
                to_absolute_instant(date, time, timezone.tz())
            } else {
                current.start_at
            };
            let length = slot
                .length
                .unwrap_or_else(|| current.effective_end(default_duration) - current.start_at);

            patch.start_at = Some(start_at);
            patch.end_at = Some(end_of(start_at, length)?);
            if moved {
                patch.occurrence_date = Some(date);
                patch.time_of_day = Some(time);
                patch.timezone = Some(timezone);
            }
        }

        Ok(patch)
    }
}
