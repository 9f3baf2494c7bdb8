pub mod password;
pub mod token_service;
pub mod token_store;

pub use token_service::{AccessClaims, TokenService, TokenPurpose};
pub use token_store::{MemoryTokenStore, TokenStore};

use thiserror::Error;

/// Failures surfaced by token verification, rotation and consumption.
/// Mapped onto HTTP status codes at the gate boundary; the variants never
/// carry key material or internal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("token has expired")]
    Expired,
    #[error("token is malformed")]
    Malformed,
    #[error("token signature is invalid")]
    SignatureInvalid,
    #[error("refresh token was already rotated")]
    AlreadyRotated,
    #[error("token was already consumed")]
    AlreadyConsumed,
    #[error("token was issued for a different purpose")]
    WrongPurpose,
    #[error("token is unknown")]
    Unknown,
}
