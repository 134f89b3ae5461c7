//! Recurring rule endpoints
//!
//! Saving a rule runs its lifecycle hooks inline: creating or reactivating it
//! materializes the window and derives projections, editing it also drops
//! future occurrences the new schedule no longer produces, and deactivating
//! it prunes its untouched future.

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use cadence_core::Store;
use cadence_core::engine::{
    MaterializeReport, ProjectionReport, PruneReport, derive_financial_projections, materialize,
    materialize_edited_rule, prune_on_deactivate, prune_stale_occurrences,
};
use cadence_core::error::SchedulingError;
use cadence_core::models::RecurringRule;
use cadence_core::rule::{RuleDraft, RulePolicy, ValidRule};
use cadence_core::types::{OwnerId, RuleId};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::owned_rule;
use crate::AppState;
use crate::error::ApiError;
use crate::middleware::owner::AuthenticatedOwner;

/// Rule plus whatever its lifecycle hooks did
#[derive(Debug, Serialize)]
pub struct RuleResponse {
    pub rule: RecurringRule,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub materialized: Option<MaterializeReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projections: Option<ProjectionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pruned: Option<PruneReport>,
}

impl RuleResponse {
    fn bare(rule: RecurringRule) -> Self {
        Self {
            rule,
            materialized: None,
            projections: None,
            pruned: None,
        }
    }
}

async fn check_client<S: Store>(store: &S, owner_id: OwnerId, rule: &ValidRule) -> Result<(), ApiError> {
    let Some(client_id) = rule.client_id else {
        return Ok(());
    };
    match store.find_client(client_id).await? {
        Some(client) if client.owner_id == owner_id => Ok(()),
        _ => Err(SchedulingError::invalid("client_id", format!("unknown client: {}", client_id)).into()),
    }
}

/// Materialize and project an active rule
///
/// `previous` is the schedule before an edit; untouched rows move from it to
/// the new slot.
async fn populate<S: Store>(
    state: &AppState<S>,
    response: &mut RuleResponse,
    previous: Option<&RulePolicy>,
) -> Result<(), ApiError> {
    let now = Utc::now();
    let owner_id = response.rule.owner_id;
    let report = match previous {
        Some(previous) => {
            materialize_edited_rule(&state.store, &state.scheduling, &response.rule, previous, now)
                .await?
        }
        None => {
            materialize(
                &state.store,
                &state.scheduling,
                owner_id,
                Some(response.rule.id),
                now,
                None,
            )
            .await?
        }
    };
    response.materialized = Some(report);
    response.projections = Some(derive_financial_projections(&state.store, owner_id, now).await?);
    Ok(())
}

/// Create a recurring rule
async fn create_rule<S: Store + Clone + 'static>(
    State(state): State<AppState<S>>,
    Extension(owner): Extension<AuthenticatedOwner>,
    Json(draft): Json<RuleDraft>,
) -> Result<Response, ApiError> {
    let valid = draft.validate()?;
    check_client(&state.store, owner.id, &valid).await?;

    let rule = state.store.create_rule(owner.id, &valid).await?;
    tracing::info!("Created recurring rule {} for owner {}", rule.id, owner.id);

    let mut response = RuleResponse::bare(rule);
    if response.rule.active {
        populate(&state, &mut response, None).await?;
    }

    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// Get a recurring rule
async fn get_rule<S: Store + Clone + 'static>(
    State(state): State<AppState<S>>,
    Extension(owner): Extension<AuthenticatedOwner>,
    Path(rule_id): Path<Uuid>,
) -> Result<Json<RecurringRule>, ApiError> {
    let rule = owned_rule(&state.store, owner.id, RuleId::from(rule_id)).await?;
    Ok(Json(rule))
}

/// Replace a recurring rule, including its active flag
async fn update_rule<S: Store + Clone + 'static>(
    State(state): State<AppState<S>>,
    Extension(owner): Extension<AuthenticatedOwner>,
    Path(rule_id): Path<Uuid>,
    Json(draft): Json<RuleDraft>,
) -> Result<Json<RuleResponse>, ApiError> {
    let rule_id = RuleId::from(rule_id);
    let before = owned_rule(&state.store, owner.id, rule_id).await?;
    let valid = draft.validate()?;
    check_client(&state.store, owner.id, &valid).await?;

    let rule = state
        .store
        .update_rule(rule_id, &valid)
        .await?
        .ok_or(SchedulingError::RuleNotFound(rule_id))?;

    let now = Utc::now();
    let default_duration = state.scheduling.default_duration();
    let mut response = RuleResponse::bare(rule);

    match (before.active, response.rule.active) {
        (true, false) => {
            tracing::info!("Rule {} deactivated, pruning future occurrences", rule_id);
            response.pruned =
                Some(prune_on_deactivate(&state.store, rule_id, now, default_duration).await?);
        }
        (false, true) => {
            tracing::info!("Rule {} reactivated", rule_id);
            populate(&state, &mut response, None).await?;
        }
        (true, true) => {
            if before.policy != response.rule.policy {
                response.pruned = Some(
                    prune_stale_occurrences(&state.store, &response.rule, now, default_duration)
                        .await?,
                );
                populate(&state, &mut response, Some(&before.policy)).await?;
            } else {
                populate(&state, &mut response, None).await?;
            }
        }
        (false, false) => {}
    }

    Ok(Json(response))
}

/// Recurring rule routes
pub fn routes<S: Store + Clone + 'static>() -> Router<AppState<S>> {
    Router::new()
        .route("/rules", post(create_rule::<S>))
        .route("/rules/{id}", get(get_rule::<S>).put(update_rule::<S>))
}
