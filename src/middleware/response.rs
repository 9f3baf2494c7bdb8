use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::json;

/// Wrapper for API responses that automatically adds the success envelope:
/// `{"success": true, "message": ..., "data": ...}`.
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    pub data: Option<T>,
    pub message: Option<String>,
    pub status_code: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a successful API response with default 200 status
    pub fn success(data: T) -> Self {
        Self { data: Some(data), message: None, status_code: StatusCode::OK }
    }

    /// Create a 201 Created response (register)
    pub fn created(data: T) -> Self {
        Self { data: Some(data), message: None, status_code: StatusCode::CREATED }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl ApiResponse<()> {
    /// Success with a message and no data payload
    pub fn message(message: impl Into<String>) -> Self {
        Self { data: None, message: Some(message.into()), status_code: StatusCode::OK }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let data_value = match self.data {
            None => None,
            Some(data) => match serde_json::to_value(&data) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::error!("Failed to serialize response data: {}", e);
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({
                            "success": false,
                            "message": "Failed to serialize response data",
                            "code": "INTERNAL_SERVER_ERROR"
                        })),
                    )
                        .into_response();
                }
            },
        };

        let mut envelope = json!({ "success": true });
        if let Some(message) = self.message {
            envelope["message"] = json!(message);
        }
        if let Some(data) = data_value {
            envelope["data"] = data;
        }

        (self.status_code, Json(envelope)).into_response()
    }
}

/// Convenience result alias for handlers
pub type ApiResult<T> = Result<ApiResponse<T>, crate::error::ApiError>;
