use axum::{extract::State, http::HeaderMap};
use chrono::Duration;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{validate_email_format, validate_username_format, UserInfo};
use crate::auth::password::{hash_password, validate_password_strength};
use crate::auth::TokenPurpose;
use crate::authz::Role;
use crate::credential::NewUser;
use crate::error::ApiError;
use crate::middleware::gate;
use crate::middleware::{ApiResponse, ApiResult, Json};
use crate::rate_limit::Action;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(rename = "realName")]
    pub real_name: Option<String>,
    pub role: Option<String>,
}

/// POST /auth/register - create an account and send a verification email.
///
/// Self-registration is limited to the non-administrative roles; admin
/// accounts are provisioned out of band.
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<Value> {
    let ip = gate::client_ip(&headers);
    gate::check_rate(&state.rate_limiter, Action::Register, &format!("ip:{ip}"))?;

    let mut field_errors = Vec::new();
    if let Err(e) = validate_username_format(&payload.username) {
        field_errors.push(format!("username: {e}"));
    }
    if let Err(e) = validate_email_format(&payload.email) {
        field_errors.push(format!("email: {e}"));
    }
    if let Err(e) = validate_password_strength(&payload.password) {
        field_errors.push(format!("password: {e}"));
    }

    let role = match payload.role.as_deref() {
        None => Role::Parent,
        Some(code) => match Role::parse(code) {
            Some(role @ (Role::Parent | Role::Teacher | Role::Principal)) => role,
            Some(_) => {
                field_errors.push("role: administrative roles cannot self-register".to_string());
                Role::Parent
            }
            None => {
                field_errors.push(format!("role: unknown role '{code}'"));
                Role::Parent
            }
        },
    };

    if !field_errors.is_empty() {
        return Err(ApiError::validation_error("Registration request is invalid", field_errors));
    }

    let password_hash = hash_password(&payload.password, state.security.bcrypt_cost)?;
    let user = state
        .credentials
        .create_user(NewUser {
            username: payload.username,
            email: payload.email,
            real_name: payload.real_name,
            password_hash,
            role,
        })
        .await?;

    let verify_token = state
        .token_service
        .issue_single_use_token(
            user.id,
            TokenPurpose::EmailVerify,
            Duration::hours(state.security.verify_token_ttl_hours),
        )
        .await;
    state.notifier.send_verification_email(&user.email, &verify_token).await;

    tracing::info!(target: "audit", principal_id = %user.id, role = user.role.as_str(), "user registered");

    Ok(ApiResponse::created(json!({ "user": UserInfo::from(&user) }))
        .with_message("Registration successful, please verify your email"))
}
