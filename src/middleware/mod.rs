pub mod auth;
pub mod gate;
pub mod json;
pub mod response;

pub use auth::auth_middleware;
pub use json::Json;
pub use response::{ApiResponse, ApiResult};
