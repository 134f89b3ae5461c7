//! Appointment REST API endpoints
//!
//! Both write paths accept a loose JSON object and normalize the legacy rule
//! link before parsing. Reads report the effective status, so an appointment
//! that already ended reads as completed before the sweeper persists it.

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use cadence_core::Store;
use cadence_core::engine::{ConflictCandidate, ConflictingAppointment, detect_conflicts};
use cadence_core::error::ValidationErrors;
use cadence_core::models::Appointment;
use cadence_core::payload::{AppointmentChanges, AppointmentDraft, parse_payload};
use cadence_core::timezone::{Timezone, parse_local_date, parse_local_time};
use cadence_core::types::{AppointmentId, OwnerId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{owned_appointment, owned_rule};
use crate::AppState;
use crate::error::ApiError;
use crate::middleware::owner::AuthenticatedOwner;

/// List appointments query parameters
#[derive(Debug, Deserialize)]
pub struct ListAppointmentsQuery {
    /// Only appointments starting at or after this instant
    pub from: Option<DateTime<Utc>>,
    /// Only appointments starting before this instant
    pub to: Option<DateTime<Utc>>,
}

/// Conflict check request
#[derive(Debug, Deserialize)]
pub struct ConflictCheckRequest {
    pub date: String,
    pub time: String,
    pub timezone: String,
    /// Appointment being edited, ignored when comparing
    pub exclude_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ConflictCheckResponse {
    pub has_conflicts: bool,
    pub conflicts: Vec<ConflictingAppointment>,
}

fn present(mut appointment: Appointment, now: DateTime<Utc>, default_duration: Duration) -> Appointment {
    appointment.status = appointment.effective_status(now, default_duration);
    appointment
}

async fn check_rule_link<S: Store>(
    store: &S,
    owner_id: OwnerId,
    rule_id: Option<cadence_core::types::RuleId>,
) -> Result<(), ApiError> {
    if let Some(rule_id) = rule_id {
        owned_rule(store, owner_id, rule_id).await?;
    }
    Ok(())
}

/// Create an appointment
async fn create_appointment<S: Store + Clone + 'static>(
    State(state): State<AppState<S>>,
    Extension(owner): Extension<AuthenticatedOwner>,
    Json(payload): Json<Map<String, Value>>,
) -> Result<Response, ApiError> {
    let default_duration = state.scheduling.default_duration();
    let draft: AppointmentDraft = parse_payload(payload)?;
    let new = draft.into_new(owner.id, default_duration)?;
    check_rule_link(&state.store, owner.id, new.recurring_rule_id).await?;

    let appointment = state.store.create_appointment(&new).await?;
    tracing::debug!("Created appointment {} for owner {}", appointment.id, owner.id);

    let body = present(appointment, Utc::now(), default_duration);
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

/// List the caller's appointments
async fn list_appointments<S: Store + Clone + 'static>(
    State(state): State<AppState<S>>,
    Extension(owner): Extension<AuthenticatedOwner>,
    Query(query): Query<ListAppointmentsQuery>,
) -> Result<Json<Vec<Appointment>>, ApiError> {
    let now = Utc::now();
    let default_duration = state.scheduling.default_duration();
    let rows = state
        .store
        .list_appointments(owner.id, query.from, query.to)
        .await?;

    Ok(Json(
        rows.into_iter()
            .map(|a| present(a, now, default_duration))
            .collect(),
    ))
}

/// Get an appointment by ID
async fn get_appointment<S: Store + Clone + 'static>(
    State(state): State<AppState<S>>,
    Extension(owner): Extension<AuthenticatedOwner>,
    Path(id): Path<Uuid>,
) -> Result<Json<Appointment>, ApiError> {
    let appointment = owned_appointment(&state.store, owner.id, AppointmentId::from(id)).await?;
    Ok(Json(present(
        appointment,
        Utc::now(),
        state.scheduling.default_duration(),
    )))
}

/// Update an appointment
async fn update_appointment<S: Store + Clone + 'static>(
    State(state): State<AppState<S>>,
    Extension(owner): Extension<AuthenticatedOwner>,
    Path(id): Path<Uuid>,
    Json(payload): Json<Map<String, Value>>,
) -> Result<Json<Appointment>, ApiError> {
    let id = AppointmentId::from(id);
    let default_duration = state.scheduling.default_duration();
    let current = owned_appointment(&state.store, owner.id, id).await?;

    let changes: AppointmentChanges = parse_payload(payload)?;
    check_rule_link(&state.store, owner.id, changes.recurring_rule_id).await?;
    let patch = changes.into_patch(&current, default_duration)?;

    let updated = state
        .store
        .update_appointment(id, &patch)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Appointment not found: {}", id)))?;

    Ok(Json(present(updated, Utc::now(), default_duration)))
}

/// Check a proposed slot against the caller's existing appointments
async fn check_conflicts<S: Store + Clone + 'static>(
    State(state): State<AppState<S>>,
    Extension(owner): Extension<AuthenticatedOwner>,
    Json(req): Json<ConflictCheckRequest>,
) -> Result<Json<ConflictCheckResponse>, ApiError> {
    let mut errors = ValidationErrors::new();
    let date = parse_local_date(&req.date)
        .map_err(|_| errors.push("date", "expected YYYY-MM-DD"))
        .ok();
    let time = parse_local_time(&req.time)
        .map_err(|_| errors.push("time", "expected HH:mm"))
        .ok();
    let timezone = Timezone::new(&req.timezone)
        .map_err(|_| errors.push("timezone", format!("unsupported timezone: {}", req.timezone)))
        .ok();

    let (Some(date), Some(time), Some(timezone)) = (date, time, timezone) else {
        return Err(ApiError::Validation(errors));
    };

    let candidate = ConflictCandidate {
        date,
        time,
        timezone,
    };
    let conflicts = detect_conflicts(
        &state.store,
        &candidate,
        owner.id,
        req.exclude_id.map(AppointmentId::from),
        state.scheduling.default_duration(),
    )
    .await?;

    Ok(Json(ConflictCheckResponse {
        has_conflicts: !conflicts.is_empty(),
        conflicts,
    }))
}

/// Appointment routes
pub fn routes<S: Store + Clone + 'static>() -> Router<AppState<S>> {
    Router::new()
        .route(
            "/appointments",
            post(create_appointment::<S>).get(list_appointments::<S>),
        )
        .route("/appointments/conflicts", post(check_conflicts::<S>))
        .route(
            "/appointments/{id}",
            get(get_appointment::<S>).put(update_appointment::<S>),
        )
}
