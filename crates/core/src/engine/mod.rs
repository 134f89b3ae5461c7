//! Scheduling engine operations
//!
//! Every operation here is a single request-scoped execution over a
//! [`Store`](crate::store::Store): no state survives between calls, and
//! multi-row operations continue past per-row failures, reporting counts and
//! error messages instead of rolling back.

pub mod conflict;
pub mod materialize;
pub mod projection;
pub mod prune;
pub mod sweep;

pub use conflict::{ConflictCandidate, ConflictingAppointment, detect_conflicts, overlaps};
pub use materialize::{MaterializeReport, materialize, materialize_edited_rule};
pub use projection::{ProjectionReport, derive_financial_projections, effective_amount};
pub use prune::{
    PruneReport, ReconcileReport, prune_on_deactivate, prune_stale_occurrences,
    reconcile_financial_entries,
};
pub use sweep::{SweepReport, sweep_past_appointments};

use chrono::{DateTime, NaiveDate, Utc};

use crate::models::RecurringRule;
use crate::timezone::to_local_parts;

/// The rule's local calendar date at `now`
pub(crate) fn local_today(rule: &RecurringRule, now: DateTime<Utc>) -> NaiveDate {
    to_local_parts(&now, rule.policy.timezone.tz()).0
}
