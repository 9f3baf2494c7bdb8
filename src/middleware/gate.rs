//! Per-request gate: the fixed-order pipeline every protected operation
//! sits behind.
//!
//! Order is deliberate and must not change:
//! rate limit (429) before token verification (401) so abuse is rejected
//! cheaply; authentication before authorization (403) so we know who
//! before deciding what they may do; authorization before payload
//! validation (400) so validation detail is never leaked to callers that
//! were not allowed in. Each stage either continues or short-circuits
//! with the uniform error envelope.

use axum::{
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::authz::{self, Decision, Principal, Requirement};
use crate::error::ApiError;
use crate::rate_limit::{Action, RateLimiter, Verdict};

/// Stage 1: count this attempt and reject with 429 if the window is full.
pub fn check_rate(limiter: &RateLimiter, action: Action, identity_key: &str) -> Result<(), ApiError> {
    match limiter.check(action, identity_key) {
        Verdict::Allowed => Ok(()),
        Verdict::Throttled { retry_after_secs } => Err(throttled(retry_after_secs)),
    }
}

/// Stage 1 for login: both the source-IP and username keys are counted;
/// either being exhausted rejects the attempt.
pub fn check_login_rate(limiter: &RateLimiter, ip: &str, username: &str) -> Result<(), ApiError> {
    match limiter.check_login(ip, username) {
        Verdict::Allowed => Ok(()),
        Verdict::Throttled { retry_after_secs } => Err(throttled(retry_after_secs)),
    }
}

fn throttled(retry_after_secs: u64) -> ApiError {
    ApiError::too_many_requests("Too many attempts, please try again later", retry_after_secs)
}

/// Stage 3: evaluate the route's declared requirements against the
/// authenticated principal. A disabled account is denied here even when
/// the requirement list is empty.
pub fn check_requirements(
    principal: &Principal,
    requirements: &[Requirement],
) -> Result<(), ApiError> {
    match authz::authorize(principal, requirements) {
        Decision::Allowed => Ok(()),
        Decision::Denied(reason) => {
            tracing::warn!(
                target: "audit",
                principal_id = %principal.id,
                reason = ?reason,
                "authorization denied"
            );
            Err(ApiError::forbidden(reason.message()))
        }
    }
}

/// Client identity for IP-keyed rate limiting. Prefers the first
/// `X-Forwarded-For` hop, matching how the platform sits behind a proxy.
pub fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Authorization layer for route registration: attach with
/// `.route_layer(from_fn(move |req, next| gate::require(REQS, req, next)))`
/// after the auth middleware has injected the principal.
pub async fn require(
    requirements: &'static [Requirement],
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = request
        .extensions()
        .get::<Principal>()
        .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

    check_requirements(principal, requirements)?;
    Ok(next.run(request).await)
}
