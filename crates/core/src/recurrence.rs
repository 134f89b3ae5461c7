//! Occurrence generation for recurring rules
//!
//! Expands a [`RulePolicy`] into the local calendar dates on which it fires
//! inside an inclusive date window. Interval skipping counts whole weeks from
//! the rule's start date, not calendar week boundaries, so "every 2 weeks on
//! Monday" starting on a Monday always includes that Monday.

use chrono::{Days, NaiveDate};

use crate::rule::RulePolicy;

/// Iterator over the dates a rule fires on within a window
///
/// A pure function of its inputs: building it again with the same arguments
/// yields the same sequence.
#[derive(Debug, Clone)]
pub struct Occurrences<'a> {
    policy: &'a RulePolicy,
    cursor: Option<NaiveDate>,
    window_start: NaiveDate,
    last: NaiveDate,
    emitted_total: i64,
}

impl<'a> Occurrences<'a> {
    pub fn new(policy: &'a RulePolicy, window_start: NaiveDate, window_end: NaiveDate) -> Self {
        let last = policy.end_date.map_or(window_end, |end| end.min(window_end));
        // With a cap, occurrences before the window still count against it,
        // so the walk has to begin at the rule's own start.
        let first = if policy.max_occurrences.is_some() {
            policy.start_date
        } else {
            policy.start_date.max(window_start)
        };

        Self {
            policy,
            cursor: (first <= last).then_some(first),
            window_start,
            last,
            emitted_total: 0,
        }
    }

    fn cap_reached(&self) -> bool {
        self.policy
            .max_occurrences
            .is_some_and(|cap| self.emitted_total >= i64::from(cap))
    }
}

impl Iterator for Occurrences<'_> {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        while let Some(day) = self.cursor {
            if self.cap_reached() {
                self.cursor = None;
                return None;
            }

            self.cursor = day
                .checked_add_days(Days::new(1))
                .filter(|next| *next <= self.last);

            if self.policy.fires_on(day) {
                self.emitted_total += 1;
                if day >= self.window_start {
                    return Some(day);
                }
            }
        }
        None
    }
}

/// Collect the occurrences of `policy` in `[window_start, window_end]`
pub fn occurrences_between(
    policy: &RulePolicy,
    window_start: NaiveDate,
    window_end: NaiveDate,
) -> Vec<NaiveDate> {
    Occurrences::new(policy, window_start, window_end).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::WeekdaySet;
    use crate::timezone::Timezone;
    use chrono::{Datelike, NaiveTime};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn mon_thu(interval_weeks: i32) -> RulePolicy {
        RulePolicy {
            weekdays: WeekdaySet::from_days([1i64, 4]).unwrap(),
            time_of_day: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            timezone: Timezone::new("America/Sao_Paulo").unwrap(),
            interval_weeks,
            start_date: date(2025, 1, 6),
            end_date: None,
            max_occurrences: None,
        }
    }

    #[test]
    fn test_weekly_mon_thu() {
        let dates = occurrences_between(&mon_thu(1), date(2025, 1, 6), date(2025, 1, 20));
        assert_eq!(
            dates,
            vec![
                date(2025, 1, 6),
                date(2025, 1, 9),
                date(2025, 1, 13),
                date(2025, 1, 16),
                date(2025, 1, 20),
            ]
        );
    }

    #[test]
    fn test_biweekly_skips_second_week() {
        let dates = occurrences_between(&mon_thu(2), date(2025, 1, 6), date(2025, 1, 19));
        assert_eq!(dates, vec![date(2025, 1, 6), date(2025, 1, 9)]);
    }

    #[test]
    fn test_biweekly_resumes_in_third_week() {
        // 2025-01-20 is 14 days after the start, i.e. week index 2
        let dates = occurrences_between(&mon_thu(2), date(2025, 1, 6), date(2025, 1, 20));
        assert_eq!(dates, vec![date(2025, 1, 6), date(2025, 1, 9), date(2025, 1, 20)]);
    }

    #[test]
    fn test_interval_relative_to_mid_week_start() {
        // Starting on a Thursday: week 0 is Thu 01-09 .. Wed 01-15
        let mut policy = mon_thu(2);
        policy.start_date = date(2025, 1, 9);
        let dates = occurrences_between(&policy, date(2025, 1, 1), date(2025, 1, 31));
        assert_eq!(
            dates,
            vec![date(2025, 1, 9), date(2025, 1, 13), date(2025, 1, 23), date(2025, 1, 27)]
        );
    }

    #[test]
    fn test_zero_length_window() {
        let dates = occurrences_between(&mon_thu(1), date(2025, 1, 7), date(2025, 1, 7));
        assert!(dates.is_empty());

        let inverted = occurrences_between(&mon_thu(1), date(2025, 1, 20), date(2025, 1, 6));
        assert!(inverted.is_empty());
    }

    #[test]
    fn test_single_day_window_on_matching_day() {
        let dates = occurrences_between(&mon_thu(1), date(2025, 1, 9), date(2025, 1, 9));
        assert_eq!(dates, vec![date(2025, 1, 9)]);
    }

    #[test]
    fn test_start_after_window() {
        let dates = occurrences_between(&mon_thu(1), date(2024, 12, 1), date(2024, 12, 31));
        assert!(dates.is_empty());
    }

    #[test]
    fn test_every_day() {
        let mut policy = mon_thu(1);
        policy.weekdays = WeekdaySet::ALL;
        let dates = occurrences_between(&policy, date(2025, 1, 6), date(2025, 1, 19));
        assert_eq!(dates.len(), 14);
        assert!(dates.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_end_date_is_inclusive() {
        let mut policy = mon_thu(1);
        policy.end_date = Some(date(2025, 1, 13));
        let dates = occurrences_between(&policy, date(2025, 1, 1), date(2025, 3, 1));
        assert_eq!(dates, vec![date(2025, 1, 6), date(2025, 1, 9), date(2025, 1, 13)]);
    }

    #[test]
    fn test_cap_counts_occurrences_before_window() {
        let mut policy = mon_thu(1);
        policy.max_occurrences = Some(5);
        // 01-06, 01-09, 01-13 fall before the window; 01-16 and 01-20 remain
        let dates = occurrences_between(&policy, date(2025, 1, 14), date(2025, 2, 28));
        assert_eq!(dates, vec![date(2025, 1, 16), date(2025, 1, 20)]);
    }

    #[test]
    fn test_cap_exhausted_before_window() {
        let mut policy = mon_thu(1);
        policy.max_occurrences = Some(2);
        let dates = occurrences_between(&policy, date(2025, 2, 1), date(2025, 2, 28));
        assert!(dates.is_empty());
    }

    #[test]
    fn test_generation_is_restartable() {
        let policy = mon_thu(3);
        let first = occurrences_between(&policy, date(2025, 1, 1), date(2025, 6, 30));
        let second = occurrences_between(&policy, date(2025, 1, 1), date(2025, 6, 30));
        assert_eq!(first, second);
        assert!(first.iter().all(|d| matches!(d.weekday().num_days_from_sunday(), 1 | 4)));
    }

    #[test]
    fn test_window_split_matches_whole_window() {
        let mut policy = mon_thu(2);
        policy.max_occurrences = Some(9);
        let whole = occurrences_between(&policy, date(2025, 1, 1), date(2025, 4, 30));
        let mut split = occurrences_between(&policy, date(2025, 1, 1), date(2025, 2, 14));
        split.extend(occurrences_between(&policy, date(2025, 2, 15), date(2025, 4, 30)));
        assert_eq!(whole, split);
        assert_eq!(whole.len(), 9);
    }
}
