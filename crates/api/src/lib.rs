//! Cadence API Server Library

pub mod config;
pub mod error;
pub mod middleware;
mod routes;

use axum::{Router, middleware as axum_middleware};
use cadence_core::{SchedulingConfig, Store};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::middleware::owner::owner_scope;

pub use routes::appointments::ConflictCheckResponse;
pub use routes::rules::RuleResponse;

#[derive(Clone)]
pub struct AppState<S> {
    pub store: S,
    pub scheduling: SchedulingConfig,
}

impl<S: Store> AppState<S> {
    pub fn new(store: S, scheduling: SchedulingConfig) -> Self {
        Self { store, scheduling }
    }
}

fn cors_layer(cors_origin: &str) -> Result<CorsLayer, axum::http::header::InvalidHeaderValue> {
    if cors_origin == "*" {
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any));
    }
    let origin = cors_origin.parse::<axum::http::HeaderValue>()?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any))
}

/// Create the application router
pub fn create_router<S: Store + Clone + 'static>(
    state: AppState<S>,
    cors_origin: &str,
) -> Result<Router, axum::http::header::InvalidHeaderValue> {
    let cors = cors_layer(cors_origin).inspect_err(|e| {
        tracing::error!("Invalid CORS origin '{}': {}", cors_origin, e);
    })?;

    let router = Router::new()
        .merge(routes::health::routes::<S>())
        .nest(
            "/api",
            routes::rules::routes::<S>()
                .merge(routes::appointments::routes::<S>())
                .merge(routes::maintenance::routes::<S>())
                .layer(axum_middleware::from_fn(owner_scope)),
        )
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    let remote_addr = request
                        .extensions()
                        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
                        .map(|ci| ci.0.to_string())
                        .unwrap_or_else(|| "unknown".into());

                    let forwarded_for = request
                        .headers()
                        .get("x-forwarded-for")
                        .and_then(|h| h.to_str().ok());

                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                        remote_addr = %remote_addr,
                        forwarded_for = ?forwarded_for,
                        owner_id = tracing::field::Empty,
                    )
                })
                .on_request(|_request: &axum::http::Request<_>, _span: &tracing::Span| {
                    tracing::debug!("started processing request");
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        tracing::info!(
                            latency_ms = %latency.as_millis(),
                            status = %response.status(),
                            "finished processing request"
                        );
                    },
                ),
        )
        .with_state(state);

    Ok(router)
}

/// Run the API server
///
/// This function starts the HTTP server and blocks until it exits.
pub async fn run_api<S: Store + Clone + 'static>(
    state: AppState<S>,
    config: &config::Config,
) -> Result<(), std::io::Error> {
    let app = create_router(state, &config.cors_allowed_origin)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let addr = format!("{}:{}", config.host, config.port);

    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
}
