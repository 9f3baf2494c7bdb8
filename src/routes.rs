use axum::{
    middleware::from_fn,
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::authz::Requirement;
use crate::handlers::auth;
use crate::middleware::{auth_middleware, gate};
use crate::state::AppState;

/// Build the full application router. Tests drive this directly with
/// `tower::ServiceExt::oneshot`; main binds it to a listener.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(auth_public_routes())
        .merge(auth_protected_routes(state.clone()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn auth_public_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/register", post(auth::register))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/reset-password", post(auth::reset_password))
        .route("/auth/verify-email", get(auth::verify_email))
}

/// Routes behind the bearer-token middleware. The empty requirement list
/// still runs the authorization stage, which rejects disabled accounts.
fn auth_protected_routes(state: AppState) -> Router<AppState> {
    const SESSION_REQS: &[Requirement] = &[];

    Router::new()
        .route("/api/auth/whoami", get(auth::whoami))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/change-password", put(auth::change_password))
        .route_layer(from_fn(move |req, next| gate::require(SESSION_REQS, req, next)))
        .route_layer(from_fn_with_state(state, auth_middleware))
}

async fn root() -> axum::response::Json<Value> {
    axum::response::Json(json!({
        "success": true,
        "data": {
            "name": "Kinder API",
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": {
                "public_auth": "/auth/* (login, register, refresh, password reset, email verification)",
                "session": "/api/auth/* (protected - whoami, logout, change-password)",
            }
        }
    }))
}

async fn health() -> axum::response::Json<Value> {
    axum::response::Json(json!({
        "success": true,
        "data": {
            "status": "ok",
            "timestamp": chrono::Utc::now(),
        }
    }))
}
