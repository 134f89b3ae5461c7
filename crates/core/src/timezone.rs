//! Timezone handling utilities
//!
//! Converts between a local (date, time, IANA zone) triple and an absolute
//! instant. All offset arithmetic goes through the zone rules in `chrono-tz`.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{SchedulingError, SchedulingResult};

/// Parse an IANA timezone string (e.g., "America/Sao_Paulo", "Europe/London")
///
/// # Examples
///
/// ```
/// use cadence_core::timezone::parse_timezone;
///
/// let tz = parse_timezone("America/Sao_Paulo").unwrap();
/// assert_eq!(tz.name(), "America/Sao_Paulo");
/// ```
pub fn parse_timezone(tz_str: &str) -> SchedulingResult<Tz> {
    tz_str
        .parse::<Tz>()
        .map_err(|_| SchedulingError::invalid("timezone", format!("unsupported timezone: {}", tz_str)))
}

/// Parse a local calendar date in `YYYY-MM-DD` form
pub fn parse_local_date(date_str: &str) -> SchedulingResult<NaiveDate> {
    NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d").map_err(|_| {
        SchedulingError::invalid("date", format!("expected YYYY-MM-DD, got '{}'", date_str))
    })
}

/// Parse a local time of day in `HH:mm` (or `HH:mm:ss`) form
pub fn parse_local_time(time_str: &str) -> SchedulingResult<NaiveTime> {
    let trimmed = time_str.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|_| {
            SchedulingError::invalid("time_of_day", format!("expected HH:mm, got '{}'", time_str))
        })
}

/// Interpret a local date and time in `tz` and return the absolute instant
///
/// Ambiguous wall-clock times (the repeated hour when clocks fall back) map to
/// the earlier instant. Wall-clock times inside a spring-forward gap are read
/// with the offset in force before the gap, which lands them the length of the
/// gap later (02:30 in a one-hour gap becomes 03:30).
///
/// # Examples
///
/// ```
/// use chrono::{NaiveDate, NaiveTime};
/// use cadence_core::timezone::{parse_timezone, to_absolute_instant};
///
/// let tz = parse_timezone("America/Sao_Paulo").unwrap();
/// let date = NaiveDate::from_ymd_opt(2025, 9, 23).unwrap();
/// let time = NaiveTime::from_hms_opt(13, 0, 0).unwrap();
/// let instant = to_absolute_instant(date, time, &tz);
/// assert_eq!(instant.to_rfc3339(), "2025-09-23T16:00:00+00:00");
/// ```
pub fn to_absolute_instant(date: NaiveDate, time: NaiveTime, tz: &Tz) -> DateTime<Utc> {
    let local = NaiveDateTime::new(date, time);
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            // No zone has a gap longer than a day; the offset a few hours
            // earlier is the one in force before the transition.
            let before = tz
                .from_local_datetime(&(local - Duration::hours(6)))
                .earliest()
                .map(|dt| dt.offset().fix())
                .unwrap_or_else(|| Utc.fix());
            Utc.from_utc_datetime(&(local - Duration::seconds(i64::from(before.local_minus_utc()))))
        }
    }
}

/// Split an absolute instant into the local date and time of day in `tz`
pub fn to_local_parts(instant: &DateTime<Utc>, tz: &Tz) -> (NaiveDate, NaiveTime) {
    let local = instant.with_timezone(tz).naive_local();
    (local.date(), local.time())
}

/// Validate that a timezone string is valid
///
/// Returns `Ok(())` if valid, `Err` otherwise
pub fn validate_timezone(tz_str: &str) -> SchedulingResult<()> {
    parse_timezone(tz_str)?;
    Ok(())
}

/// A validated IANA timezone
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timezone(Tz);

impl Timezone {
    /// Create a new Timezone if valid
    pub fn new(tz: &str) -> SchedulingResult<Self> {
        parse_timezone(tz).map(Self)
    }

    /// IANA name of the zone
    pub fn as_str(&self) -> &'static str {
        self.0.name()
    }

    /// Zone rules for conversions
    pub fn tz(&self) -> &Tz {
        &self.0
    }
}

impl Default for Timezone {
    fn default() -> Self {
        Self(Tz::UTC)
    }
}

impl From<Tz> for Timezone {
    fn from(tz: Tz) -> Self {
        Self(tz)
    }
}

impl TryFrom<String> for Timezone {
    type Error = SchedulingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Timezone> for String {
    fn from(tz: Timezone) -> Self {
        tz.as_str().to_string()
    }
}

impl std::fmt::Display for Timezone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
