use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::authz::{Principal, Role};
use crate::error::ApiError;
use crate::state::AppState;

/// Bearer authentication middleware. Verifies the access token, rebuilds
/// the [`Principal`] for this request and injects it into request
/// extensions. Authorization decisions happen later in the pipeline.
pub async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(&headers)?;
    let principal = resolve_principal(&state, token).await?;

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn extract_bearer(headers: &HeaderMap) -> Result<&str, ApiError> {
    let auth_header = headers
        .get("authorization")
        .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| ApiError::unauthorized("Invalid Authorization header format"))?;

    let token = auth_str
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthorized("Authorization header must use Bearer token format"))?
        .trim();

    if token.is_empty() {
        return Err(ApiError::unauthorized("Empty bearer token"));
    }
    Ok(token)
}

/// Verify the access token and rebuild the principal for this request.
///
/// Role and permissions come from the claims (fixed at issuance, bounded
/// by the short access TTL); account status is read fresh from the
/// credential store so a disabled account loses access immediately.
pub async fn resolve_principal(state: &AppState, token: &str) -> Result<Principal, ApiError> {
    let claims = state.token_service.verify_access_token(token)?;

    let user = state
        .credentials
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid authentication token"))?;

    let role = Role::parse(&claims.role)
        .ok_or_else(|| ApiError::unauthorized("Invalid authentication token"))?;

    Ok(Principal {
        id: claims.sub,
        username: claims.username,
        role,
        permissions: claims.permissions.into_iter().collect(),
        status: user.status,
        kindergarten_id: user.kindergarten_id,
    })
}
