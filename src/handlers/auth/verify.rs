use axum::extract::{Query, State};
use serde::Deserialize;

use crate::auth::{AuthError, TokenPurpose};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct VerifyEmailParams {
    #[serde(default)]
    pub token: String,
}

/// GET /auth/verify-email?token=... - consume an email-verification token
/// and mark the account verified. An expired link keeps answering
/// "expired" on retry so the user knows to request a new one.
pub async fn verify_email(
    State(state): State<AppState>,
    Query(params): Query<VerifyEmailParams>,
) -> ApiResult<()> {
    if params.token.is_empty() {
        return Err(ApiError::bad_request("token is required"));
    }

    let principal_id = state
        .token_service
        .consume_single_use_token(&params.token, TokenPurpose::EmailVerify)
        .await
        .map_err(|err| match err {
            AuthError::Expired => ApiError::bad_request("Verification link has expired"),
            AuthError::AlreadyConsumed => {
                ApiError::bad_request("Verification link has already been used")
            }
            _ => ApiError::bad_request("Invalid verification link"),
        })?;

    state.credentials.set_email_verified(principal_id).await?;

    tracing::info!(target: "audit", principal_id = %principal_id, "email verified");

    Ok(ApiResponse::message("Email verified"))
}
