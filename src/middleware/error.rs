//! JSON rendering of `AppError` and the success envelope

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorCode};

/// Body returned for every failed API call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorCode,
    pub message: String,
    /// Echo of `x-request-id`, if the caller or the router assigned one
    pub request_id: Option<String>,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl From<&AppError> for ErrorResponse {
    fn from(error: &AppError) -> Self {
        let status = error.status_code();
        // Context can carry order refs or SKUs; only shown for caller mistakes
        let details = error
            .context
            .as_ref()
            .filter(|_| (400..500).contains(&status))
            .map(|context| serde_json::json!({ "context": context }));

        Self {
            error: error.error_code(),
            message: error.user_message(),
            request_id: error.request_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            details,
            retryable: Some(error.is_retryable()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(
                error = ?self,
                request_id = ?self.request_id,
                status = status.as_u16(),
                "Request failed"
            );
        } else {
            tracing::warn!(
                error = ?self,
                request_id = ?self.request_id,
                status = status.as_u16(),
                "Request rejected"
            );
        }

        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

/// `{ success, data, timestamp }` envelope for handler results
pub fn success_response<T: Serialize>(data: T) -> impl IntoResponse {
    Json(serde_json::json!({
        "success": true,
        "data": data,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

pub fn get_request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
