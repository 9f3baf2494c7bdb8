use axum::{extract::State, http::HeaderMap};
use serde::Deserialize;
use serde_json::{json, Value};

use super::UserInfo;
use crate::auth::password::verify_password;
use crate::error::ApiError;
use crate::middleware::gate;
use crate::middleware::{ApiResponse, ApiResult, Json};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// POST /auth/login - verify credentials and issue an access/refresh pair.
///
/// Failures never distinguish an unknown username from a wrong password,
/// and a disabled account answers exactly like bad credentials.
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Value> {
    // Rate limiting comes first; malformed attempts are counted too.
    let ip = gate::client_ip(&headers);
    gate::check_login_rate(&state.rate_limiter, &ip, &payload.username)?;

    if payload.username.is_empty() || payload.password.is_empty() {
        return Err(ApiError::validation_error(
            "Username and password are required",
            vec!["username and password must not be empty".to_string()],
        ));
    }

    let user = match state.credentials.find_by_username(&payload.username).await? {
        Some(user) => user,
        None => {
            tracing::warn!(target: "audit", username = %payload.username, ip = %ip, "login failed: unknown user");
            return Err(invalid_credentials());
        }
    };

    if !verify_password(&user.password_hash, &payload.password) {
        tracing::warn!(target: "audit", principal_id = %user.id, ip = %ip, "login failed: wrong password");
        return Err(invalid_credentials());
    }

    if !matches!(user.status, crate::authz::AccountStatus::Active) {
        tracing::warn!(target: "audit", principal_id = %user.id, ip = %ip, "login failed: account disabled");
        return Err(invalid_credentials());
    }

    let permissions = state.credentials.list_permissions(user.id).await?;
    let token = state.token_service.issue_access_token(
        user.id,
        &user.username,
        user.role.as_str(),
        permissions.into_iter().collect(),
    )?;
    let refresh_token = state.token_service.issue_refresh_token(user.id).await;

    // Forgiven: a successful login clears this identity's failure counters.
    state.rate_limiter.reset_login(&ip, &payload.username);

    tracing::info!(target: "audit", principal_id = %user.id, role = user.role.as_str(), "login succeeded");

    Ok(ApiResponse::success(json!({
        "token": token,
        "refreshToken": refresh_token,
        "expiresIn": state.token_service.access_ttl_secs(),
        "user": UserInfo::from(&user),
    })))
}

fn invalid_credentials() -> ApiError {
    ApiError::unauthorized("Invalid username or password")
}
