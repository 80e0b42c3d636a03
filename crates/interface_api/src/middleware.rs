//! API middleware

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::{info, warn};

use core_kernel::TenantContext;

use crate::error::ApiError;
use crate::AppState;

/// Request id header set by the request-id layer
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Authentication middleware
///
/// Validates the bearer token and stores both the [`crate::auth::Claims`]
/// and the request's [`TenantContext`] in the request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| {
            warn!("Missing or invalid Authorization header");
            ApiError::Unauthorized
        })?;

    let claims = crate::auth::validate_token(token, &state.config.jwt_secret).map_err(|e| {
        warn!(error = %e, "Token validation failed");
        ApiError::from(e)
    })?;

    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);
    let ctx = claims.tenant_context(request_id.as_deref())?;

    request.extensions_mut().insert(claims);
    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}

/// Audit logging middleware
///
/// Logs every API request with the acting user and school
pub async fn audit_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let (user, school, correlation_id) = match request.extensions().get::<TenantContext>() {
        Some(ctx) => (
            ctx.actor_id.to_string(),
            ctx.school_id.to_string(),
            ctx.correlation_id().to_string(),
        ),
        None => ("anonymous".to_string(), "-".to_string(), "-".to_string()),
    };

    let start = Utc::now();

    let response = next.run(request).await;

    let duration = Utc::now() - start;
    let status = response.status();

    info!(
        method = %method,
        uri = %uri,
        user = %user,
        school = %school,
        correlation_id = %correlation_id,
        status = %status.as_u16(),
        duration_ms = duration.num_milliseconds(),
        "API request"
    );

    response
}
