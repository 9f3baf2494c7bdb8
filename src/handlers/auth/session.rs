use axum::{extract::State, Extension};
use serde_json::{json, Value};

use crate::authz::Principal;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

/// POST /auth/logout - revoke all refresh-token families for the caller.
/// The current access token stays valid until it expires; only the
/// ability to mint new ones is cut off.
pub async fn logout(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<()> {
    state.token_service.revoke_family(principal.id).await;
    tracing::info!(target: "audit", principal_id = %principal.id, "logout");
    Ok(ApiResponse::message("Logged out"))
}

/// GET /auth/whoami - echo the authenticated principal.
pub async fn whoami(Extension(principal): Extension<Principal>) -> ApiResult<Value> {
    let mut permissions: Vec<&str> = principal.permissions.iter().map(String::as_str).collect();
    permissions.sort_unstable();

    Ok(ApiResponse::success(json!({
        "id": principal.id,
        "username": principal.username,
        "role": principal.role.as_str(),
        "permissions": permissions,
        "kindergartenId": principal.kindergarten_id,
    })))
}
