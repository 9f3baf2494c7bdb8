use axum::{extract::State, http::HeaderMap, Extension};
use chrono::Duration;
use serde::Deserialize;

use crate::auth::password::{hash_password, validate_password_strength, verify_password};
use crate::auth::{AuthError, TokenPurpose};
use crate::authz::Principal;
use crate::error::ApiError;
use crate::middleware::gate;
use crate::middleware::{ApiResponse, ApiResult, Json};
use crate::rate_limit::Action;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: String,
}

/// POST /auth/forgot-password - start the reset flow.
///
/// Always answers 200 with the same message; whether the email exists is
/// never revealed to the caller.
pub async fn forgot_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ForgotPasswordRequest>,
) -> ApiResult<()> {
    let ip = gate::client_ip(&headers);
    gate::check_rate(&state.rate_limiter, Action::ForgotPassword, &format!("ip:{ip}"))?;

    if payload.email.is_empty() {
        return Err(ApiError::bad_request("email is required"));
    }

    if let Some(user) = state.credentials.find_by_email(&payload.email).await? {
        let token = state
            .token_service
            .issue_single_use_token(
                user.id,
                TokenPurpose::PasswordReset,
                Duration::minutes(state.security.reset_token_ttl_mins),
            )
            .await;
        state.notifier.send_reset_email(&user.email, &token).await;
    } else {
        tracing::info!(target: "audit", ip = %ip, "password reset requested for unknown email");
    }

    Ok(ApiResponse::message(
        "If the email address is registered, a reset link has been sent",
    ))
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default, rename = "newPassword")]
    pub new_password: String,
}

/// POST /auth/reset-password - consume a reset token and set a new
/// password. All outstanding refresh tokens for the account die with it.
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> ApiResult<()> {
    if payload.token.is_empty() {
        return Err(ApiError::bad_request("token is required"));
    }
    if let Err(e) = validate_password_strength(&payload.new_password) {
        return Err(ApiError::validation_error("New password is invalid", vec![e]));
    }

    let principal_id = state
        .token_service
        .consume_single_use_token(&payload.token, TokenPurpose::PasswordReset)
        .await
        .map_err(reset_token_error)?;

    let password_hash = hash_password(&payload.new_password, state.security.bcrypt_cost)?;
    state.credentials.update_password_hash(principal_id, password_hash).await?;
    state.token_service.revoke_family(principal_id).await;

    tracing::info!(target: "audit", principal_id = %principal_id, "password reset completed");

    Ok(ApiResponse::message("Password has been reset, please log in again"))
}

fn reset_token_error(err: AuthError) -> ApiError {
    match err {
        AuthError::Expired => ApiError::bad_request("Reset token has expired"),
        AuthError::AlreadyConsumed => {
            ApiError::bad_request("Reset token has already been used")
        }
        _ => ApiError::bad_request("Invalid reset token"),
    }
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(default, rename = "currentPassword")]
    pub current_password: String,
    #[serde(default, rename = "newPassword")]
    pub new_password: String,
}

/// POST /auth/change-password - authenticated password change. Requires
/// the current password even with a valid session, and revokes every
/// outstanding refresh token on success.
pub async fn change_password(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<ChangePasswordRequest>,
) -> ApiResult<()> {
    let user = state
        .credentials
        .find_by_id(principal.id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid authentication token"))?;

    if !verify_password(&user.password_hash, &payload.current_password) {
        tracing::warn!(target: "audit", principal_id = %user.id, "password change rejected: wrong current password");
        return Err(ApiError::validation_error(
            "Current password is incorrect",
            vec!["currentPassword does not match".to_string()],
        ));
    }

    if let Err(e) = validate_password_strength(&payload.new_password) {
        return Err(ApiError::validation_error("New password is invalid", vec![e]));
    }
    if payload.new_password == payload.current_password {
        return Err(ApiError::validation_error(
            "New password is invalid",
            vec!["newPassword must differ from the current password".to_string()],
        ));
    }

    let password_hash = hash_password(&payload.new_password, state.security.bcrypt_cost)?;
    state.credentials.update_password_hash(user.id, password_hash).await?;
    state.token_service.revoke_family(user.id).await;

    tracing::info!(target: "audit", principal_id = %user.id, "password changed");

    Ok(ApiResponse::message("Password changed, please log in again"))
}
