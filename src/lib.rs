pub mod auth;
pub mod authz;
pub mod clock;
pub mod config;
pub mod credential;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod notify;
pub mod rate_limit;
pub mod routes;
pub mod state;
