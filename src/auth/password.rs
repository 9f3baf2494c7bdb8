use crate::error::ApiError;

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Hash a password for storage.
pub fn hash_password(password: &str, cost: u32) -> Result<String, ApiError> {
    bcrypt::hash(password, cost).map_err(|e| {
        tracing::error!("password hashing failed: {}", e);
        ApiError::internal_server_error("An error occurred while processing your request")
    })
}

/// Compare a plaintext password against a stored bcrypt hash.
/// A malformed stored hash is treated as a mismatch, not an error the
/// caller could distinguish.
pub fn verify_password(hash: &str, plaintext: &str) -> bool {
    bcrypt::verify(plaintext, hash).unwrap_or(false)
}

/// Password policy shared by register, reset and change flows.
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(format!("Password must be at least {} characters", MIN_PASSWORD_LENGTH));
    }
    Ok(())
}
