//! Recurrence rule model and ingress validation
//!
//! A rule arrives as a loosely typed [`RuleDraft`] and is validated exactly
//! once into a [`ValidRule`]. Everything downstream works with the validated
//! [`RulePolicy`] and never re-checks its shape.

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{SchedulingError, SchedulingResult, ValidationErrors};
use crate::timezone::{parse_local_date, parse_local_time, Timezone};
use crate::types::ClientId;

/// Set of weekdays, numbered 0 = Sunday through 6 = Saturday
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const ALL: WeekdaySet = WeekdaySet(0b0111_1111);

    /// Build a set from day numbers, rejecting anything outside 0..=6
    pub fn from_days<I>(days: I) -> SchedulingResult<Self>
    where
        I: IntoIterator,
        I::Item: Into<i64>,
    {
        let mut bits = 0u8;
        for day in days {
            let day = day.into();
            if !(0..=6).contains(&day) {
                return Err(SchedulingError::invalid(
                    "weekdays",
                    format!("weekday {} is outside 0 (Sunday) ..= 6 (Saturday)", day),
                ));
            }
            bits |= 1 << day;
        }
        Ok(WeekdaySet(bits))
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn contains(&self, weekday: Weekday) -> bool {
        self.0 & (1 << weekday.num_days_from_sunday()) != 0
    }

    /// Day numbers in ascending order
    pub fn days(&self) -> Vec<u8> {
        (0..7u8).filter(|d| self.0 & (1 << d) != 0).collect()
    }

    /// Representation stored in the `weekdays smallint[]` column
    pub fn to_db(&self) -> Vec<i16> {
        self.days().into_iter().map(i16::from).collect()
    }
}

impl TryFrom<Vec<u8>> for WeekdaySet {
    type Error = SchedulingError;

    fn try_from(days: Vec<u8>) -> Result<Self, Self::Error> {
        Self::from_days(days)
    }
}

impl TryFrom<Vec<i16>> for WeekdaySet {
    type Error = SchedulingError;

    fn try_from(days: Vec<i16>) -> Result<Self, Self::Error> {
        Self::from_days(days)
    }
}

impl From<WeekdaySet> for Vec<u8> {
    fn from(set: WeekdaySet) -> Self {
        set.days()
    }
}

/// The validated recurrence policy of a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RulePolicy {
    #[sqlx(try_from = "Vec<i16>")]
    pub weekdays: WeekdaySet,
    pub time_of_day: NaiveTime,
    #[sqlx(try_from = "String")]
    pub timezone: Timezone,
    /// Every Nth week, counted from `start_date`
    pub interval_weeks: i32,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    /// Maximum number of instances the rule ever produces
    pub max_occurrences: Option<i32>,
}

impl RulePolicy {
    /// Whether the rule fires on `date`, ignoring the occurrence cap
    pub fn fires_on(&self, date: NaiveDate) -> bool {
        if date < self.start_date || self.end_date.is_some_and(|end| date > end) {
            return false;
        }
        if !self.weekdays.contains(date.weekday()) {
            return false;
        }
        let weeks_elapsed = (date - self.start_date).num_days() / 7;
        weeks_elapsed % i64::from(self.interval_weeks.max(1)) == 0
    }
}

fn default_interval() -> i64 {
    1
}

fn default_active() -> bool {
    true
}

/// Rule payload as received from a caller, before validation
#[derive(Debug, Clone, Deserialize)]
pub struct RuleDraft {
    #[serde(default)]
    pub title: String,
    pub client_id: Option<ClientId>,
    #[serde(default)]
    pub weekdays: Vec<i64>,
    pub time_of_day: String,
    pub timezone: String,
    #[serde(default = "default_interval")]
    pub interval_weeks: i64,
    pub start_date: String,
    pub end_date: Option<String>,
    pub max_occurrences: Option<i64>,
    pub amount: Option<Decimal>,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// A rule payload that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRule {
    pub title: String,
    pub client_id: Option<ClientId>,
    pub policy: RulePolicy,
    pub amount: Option<Decimal>,
    pub active: bool,
}

impl RuleDraft {
    /// Check every field and report all problems at once
    pub fn validate(&self) -> SchedulingResult<ValidRule> {
        let mut errors = ValidationErrors::new();

        let weekdays = match WeekdaySet::from_days(self.weekdays.iter().copied()) {
            Ok(set) if set.is_empty() => {
                errors.push("weekdays", "at least one weekday is required");
                None
            }
            Ok(set) => Some(set),
            Err(SchedulingError::Validation(e)) => {
                for field in e.fields() {
                    errors.push(field.field.clone(), field.message.clone());
                }
                None
            }
            Err(e) => return Err(e),
        };

        let time_of_day = parse_local_time(&self.time_of_day)
            .map(|t| t.with_second(0).unwrap_or(t))
            .map_err(|_| errors.push("time_of_day", "expected HH:mm between 00:00 and 23:59"))
            .ok();

        let timezone = Timezone::new(&self.timezone)
            .map_err(|_| errors.push("timezone", format!("unsupported timezone: {}", self.timezone)))
            .ok();

        let interval_weeks = match i32::try_from(self.interval_weeks) {
            Ok(n) if n >= 1 => Some(n),
            _ => {
                errors.push("interval_weeks", "must be at least 1");
                None
            }
        };

        let start_date = parse_local_date(&self.start_date)
            .map_err(|_| errors.push("start_date", "expected YYYY-MM-DD"))
            .ok();

        let end_date = match self.end_date.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => parse_local_date(raw).map(Some),
        }
        .map_err(|_| errors.push("end_date", "expected YYYY-MM-DD"))
        .ok()
        .flatten();

        if let (Some(start), Some(end)) = (start_date, end_date)
            && end < start
        {
            errors.push("end_date", "must not be before start_date");
        }

        let max_occurrences = match self.max_occurrences {
            None => None,
            Some(n) => match i32::try_from(n) {
                Ok(n) if n >= 1 => Some(n),
                _ => {
                    errors.push("max_occurrences", "must be at least 1");
                    None
                }
            },
        };

        if self.amount.is_some_and(|a| a.is_sign_negative() && !a.is_zero()) {
            errors.push("amount", "must not be negative");
        }

        match (weekdays, time_of_day, timezone, interval_weeks, start_date) {
            (Some(weekdays), Some(time_of_day), Some(timezone), Some(interval_weeks), Some(start_date))
                if errors.is_empty() =>
            {
                Ok(ValidRule {
                    title: self.title.trim().to_string(),
                    client_id: self.client_id,
                    policy: RulePolicy {
                        weekdays,
                        time_of_day,
                        timezone,
                        interval_weeks,
                        start_date,
                        end_date,
                        max_occurrences,
                    },
                    amount: self.amount,
                    active: self.active,
                })
            }
            _ => Err(SchedulingError::Validation(errors)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> RuleDraft {
        RuleDraft {
            title: "  Pilates  ".to_string(),
            client_id: None,
            weekdays: vec![1, 4],
            time_of_day: "18:00".to_string(),
            timezone: "America/Sao_Paulo".to_string(),
            interval_weeks: 1,
            start_date: "2025-01-06".to_string(),
            end_date: None,
            max_occurrences: None,
            amount: None,
            active: true,
        }
    }

    fn field_names(err: SchedulingError) -> Vec<String> {
        match err {
            SchedulingError::Validation(e) => e.fields().iter().map(|f| f.field.clone()).collect(),
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_weekday_set_deduplicates() {
        let set = WeekdaySet::from_days([4i64, 1, 4]).unwrap();
        assert_eq!(set.days(), vec![1, 4]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(Weekday::Mon));
        assert!(set.contains(Weekday::Thu));
        assert!(!set.contains(Weekday::Sun));
    }

    #[test]
    fn test_weekday_set_rejects_out_of_range() {
        assert!(WeekdaySet::from_days([7i64]).is_err());
        assert!(WeekdaySet::from_days([-1i64]).is_err());
    }

    #[test]
    fn test_weekday_set_serde_as_list() {
        let set: WeekdaySet = serde_json::from_str("[0, 6]").unwrap();
        assert!(set.contains(Weekday::Sun));
        assert!(set.contains(Weekday::Sat));
        assert_eq!(serde_json::to_string(&set).unwrap(), "[0,6]");
    }

    #[test]
    fn test_valid_draft() {
        let rule = draft().validate().unwrap();
        assert_eq!(rule.title, "Pilates");
        assert_eq!(rule.policy.time_of_day, NaiveTime::from_hms_opt(18, 0, 0).unwrap());
        assert_eq!(rule.policy.timezone.as_str(), "America/Sao_Paulo");
        assert_eq!(rule.policy.weekdays.days(), vec![1, 4]);
    }

    #[test]
    fn test_empty_weekdays_rejected() {
        let mut d = draft();
        d.weekdays.clear();
        assert_eq!(field_names(d.validate().unwrap_err()), vec!["weekdays"]);
    }

    #[test]
    fn test_all_problems_reported_together() {
        let mut d = draft();
        d.time_of_day = "25:00".to_string();
        d.timezone = "Nowhere/City".to_string();
        d.interval_weeks = 0;
        d.end_date = Some("2024-12-31".to_string());

        let fields = field_names(d.validate().unwrap_err());
        assert!(fields.contains(&"time_of_day".to_string()));
        assert!(fields.contains(&"timezone".to_string()));
        assert!(fields.contains(&"interval_weeks".to_string()));
        assert!(fields.contains(&"end_date".to_string()));
    }

    #[test]
    fn test_end_before_start_rejected() {
        let mut d = draft();
        d.end_date = Some("2025-01-05".to_string());
        assert_eq!(field_names(d.validate().unwrap_err()), vec!["end_date"]);
    }

    #[test]
    fn test_end_equal_to_start_allowed() {
        let mut d = draft();
        d.end_date = Some("2025-01-06".to_string());
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_zero_cap_rejected() {
        let mut d = draft();
        d.max_occurrences = Some(0);
        assert_eq!(field_names(d.validate().unwrap_err()), vec!["max_occurrences"]);
    }

    #[test]
    fn test_negative_amount_rejected() {
        let mut d = draft();
        d.amount = Some(Decimal::from(-10));
        assert_eq!(field_names(d.validate().unwrap_err()), vec!["amount"]);
    }

    #[test]
    fn test_draft_defaults_from_json() {
        let json = r#"{
            "weekdays": [2],
            "time_of_day": "09:30",
            "timezone": "Europe/Lisbon",
            "start_date": "2025-02-04"
        }"#;
        let d: RuleDraft = serde_json::from_str(json).unwrap();
        assert_eq!(d.interval_weeks, 1);
        assert!(d.active);
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_fires_on_respects_interval_from_start() {
        let policy = draft().validate().unwrap().policy;
        let mut biweekly = policy.clone();
        biweekly.interval_weeks = 2;

        let monday = NaiveDate::from_ymd_opt(2025, 1, 13).unwrap();
        assert!(policy.fires_on(monday));
        assert!(!biweekly.fires_on(monday));
        assert!(biweekly.fires_on(NaiveDate::from_ymd_opt(2025, 1, 20).unwrap()));
        assert!(!policy.fires_on(NaiveDate::from_ymd_opt(2025, 1, 5).unwrap()));
    }
}
