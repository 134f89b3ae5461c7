//! Owner scoping
//!
//! Authentication happens at the gateway in front of this service; it
//! forwards the authenticated owner in the `x-owner-id` header. Every `/api`
//! route runs inside that owner's scope.

use crate::error::ApiError;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use cadence_core::types::OwnerId;
use uuid::Uuid;

pub const OWNER_HEADER: &str = "x-owner-id";

/// Owner the current request acts for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedOwner {
    pub id: OwnerId,
}

/// Parse the owner header value
pub fn parse_owner(value: Option<&str>) -> Result<OwnerId, ApiError> {
    let raw = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Unauthorized(format!("Missing {} header", OWNER_HEADER)))?;

    Uuid::parse_str(raw)
        .map(OwnerId::from)
        .map_err(|_| ApiError::Unauthorized(format!("Invalid {} header", OWNER_HEADER)))
}

/// Middleware that rejects requests without an owner and injects
/// [`AuthenticatedOwner`] into extensions
pub async fn owner_scope(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(OWNER_HEADER)
        .and_then(|h| h.to_str().ok());
    let id = parse_owner(header)?;

    tracing::Span::current().record("owner_id", tracing::field::display(id));
    request.extensions_mut().insert(AuthenticatedOwner { id });

    Ok(next.run(request).await)
}
