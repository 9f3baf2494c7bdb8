use axum::{extract::State, http::HeaderMap};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::AuthError;
use crate::authz::AccountStatus;
use crate::error::ApiError;
use crate::middleware::gate;
use crate::middleware::{ApiResponse, ApiResult, Json};
use crate::rate_limit::Action;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(default, rename = "refreshToken")]
    pub refresh_token: String,
}

/// POST /auth/refresh - rotate the refresh token and mint a new access
/// token.
///
/// The new access token carries freshly loaded permissions, so a grant
/// change takes effect at the next refresh rather than waiting for a
/// full re-login.
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<Value> {
    let ip = gate::client_ip(&headers);
    gate::check_rate(&state.rate_limiter, Action::Refresh, &format!("ip:{ip}"))?;

    if payload.refresh_token.is_empty() {
        return Err(ApiError::bad_request("refreshToken is required"));
    }

    // Every rotation failure is a 401 here, including unknown tokens; the
    // caller's only recovery is a fresh login.
    let rotated = state
        .token_service
        .rotate_refresh_token(&payload.refresh_token)
        .await
        .map_err(|err| match err {
            AuthError::Expired => ApiError::unauthorized("Refresh token has expired"),
            _ => ApiError::unauthorized("Refresh token is no longer valid"),
        })?;

    let user = state
        .credentials
        .find_by_id(rotated.principal_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Refresh token is no longer valid"))?;

    if !matches!(user.status, AccountStatus::Active) {
        state.token_service.revoke_family(user.id).await;
        return Err(ApiError::unauthorized("Refresh token is no longer valid"));
    }

    let permissions = state.credentials.list_permissions(user.id).await?;
    let token = state.token_service.issue_access_token(
        user.id,
        &user.username,
        user.role.as_str(),
        permissions.into_iter().collect(),
    )?;

    Ok(ApiResponse::success(json!({
        "token": token,
        "refreshToken": rotated.refresh_token,
        "expiresIn": state.token_service.access_ttl_secs(),
    })))
}
