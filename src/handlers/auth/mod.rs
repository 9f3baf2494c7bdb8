mod login;
mod password;
mod refresh;
mod register;
mod session;
mod verify;

pub use login::login;
pub use password::{change_password, forgot_password, reset_password};
pub use refresh::refresh;
pub use register::register;
pub use session::{logout, whoami};
pub use verify::verify_email;

use serde::Serialize;
use uuid::Uuid;

use crate::credential::UserRecord;

/// User block returned by login, register and whoami.
#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(rename = "realName")]
    pub real_name: Option<String>,
    pub role: &'static str,
    #[serde(rename = "kindergartenId")]
    pub kindergarten_id: Option<Uuid>,
}

impl From<&UserRecord> for UserInfo {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            real_name: user.real_name.clone(),
            role: user.role.as_str(),
            kindergarten_id: user.kindergarten_id,
        }
    }
}

/// Username rules shared by register and admin user creation.
pub(crate) fn validate_username_format(username: &str) -> Result<(), String> {
    if username.len() < 3 {
        return Err("Username must be at least 3 characters".to_string());
    }
    if username.len() > 50 {
        return Err("Username must be less than 50 characters".to_string());
    }
    if !username.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        return Err("Username can only contain letters, numbers, underscore, and hyphen".to_string());
    }
    if !username.chars().next().is_some_and(|c| c.is_alphanumeric()) {
        return Err("Username must start with a letter or number".to_string());
    }
    Ok(())
}

pub(crate) fn validate_email_format(email: &str) -> Result<(), String> {
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() || !parts[1].contains('.') {
        return Err("Invalid email format".to_string());
    }
    Ok(())
}
