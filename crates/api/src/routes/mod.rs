//! API route modules

pub mod appointments;
pub mod health;
pub mod maintenance;
pub mod rules;

use cadence_core::Store;
use cadence_core::error::SchedulingError;
use cadence_core::models::{Appointment, RecurringRule};
use cadence_core::types::{AppointmentId, OwnerId, RuleId};

use crate::error::ApiError;

/// Load a rule and make sure it belongs to the caller
pub(crate) async fn owned_rule<S: Store>(
    store: &S,
    owner_id: OwnerId,
    rule_id: RuleId,
) -> Result<RecurringRule, ApiError> {
    let rule = store
        .find_rule(rule_id)
        .await?
        .ok_or(SchedulingError::RuleNotFound(rule_id))?;
    if rule.owner_id != owner_id {
        return Err(SchedulingError::PermissionDenied.into());
    }
    Ok(rule)
}

/// Load an appointment and make sure it belongs to the caller
pub(crate) async fn owned_appointment<S: Store>(
    store: &S,
    owner_id: OwnerId,
    id: AppointmentId,
) -> Result<Appointment, ApiError> {
    let appointment = store
        .get_appointment(id)
        .await?
        .ok_or(SchedulingError::AppointmentNotFound(id))?;
    if appointment.owner_id != owner_id {
        return Err(SchedulingError::PermissionDenied.into());
    }
    Ok(appointment)
}
