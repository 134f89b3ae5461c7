//! Maintenance endpoints
//!
//! On-demand triggers for the engine passes the worker also runs on a
//! schedule. Each call is one independent execution and returns its report.

use axum::{
    Extension, Json, Router,
    extract::{Query, State},
    routing::post,
};
use cadence_core::Store;
use cadence_core::engine::{
    MaterializeReport, ProjectionReport, ReconcileReport, SweepReport,
    derive_financial_projections, materialize, reconcile_financial_entries,
    sweep_past_appointments,
};
use cadence_core::timezone::parse_local_date;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;
use crate::middleware::owner::AuthenticatedOwner;

#[derive(Debug, Default, Deserialize)]
pub struct MaterializeParams {
    /// Only this rule
    pub rule_id: Option<Uuid>,
    /// Override the configured window
    pub window_days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReconcileParams {
    /// Local date to treat as today, `YYYY-MM-DD` (default: today in UTC)
    pub today: Option<String>,
}

async fn run_materialize<S: Store + Clone + 'static>(
    State(state): State<AppState<S>>,
    Extension(owner): Extension<AuthenticatedOwner>,
    Query(params): Query<MaterializeParams>,
) -> Result<Json<MaterializeReport>, ApiError> {
    let report = materialize(
        &state.store,
        &state.scheduling,
        owner.id,
        params.rule_id.map(Into::into),
        Utc::now(),
        params.window_days,
    )
    .await?;
    Ok(Json(report))
}

async fn run_projections<S: Store + Clone + 'static>(
    State(state): State<AppState<S>>,
    Extension(owner): Extension<AuthenticatedOwner>,
) -> Result<Json<ProjectionReport>, ApiError> {
    let report = derive_financial_projections(&state.store, owner.id, Utc::now()).await?;
    Ok(Json(report))
}

async fn run_reconcile<S: Store + Clone + 'static>(
    State(state): State<AppState<S>>,
    Extension(owner): Extension<AuthenticatedOwner>,
    Query(params): Query<ReconcileParams>,
) -> Result<Json<ReconcileReport>, ApiError> {
    let today = match params.today.as_deref() {
        Some(raw) => parse_local_date(raw)?,
        None => Utc::now().date_naive(),
    };
    let report = reconcile_financial_entries(&state.store, owner.id, today).await?;
    Ok(Json(report))
}

async fn run_sweep<S: Store + Clone + 'static>(
    State(state): State<AppState<S>>,
) -> Result<Json<SweepReport>, ApiError> {
    let report =
        sweep_past_appointments(&state.store, Utc::now(), state.scheduling.default_duration())
            .await?;
    Ok(Json(report))
}

/// Maintenance routes
pub fn routes<S: Store + Clone + 'static>() -> Router<AppState<S>> {
    Router::new()
        .route("/maintenance/materialize", post(run_materialize::<S>))
        .route("/maintenance/derive-projections", post(run_projections::<S>))
        .route("/maintenance/reconcile", post(run_reconcile::<S>))
        .route("/maintenance/sweep", post(run_sweep::<S>))
}
