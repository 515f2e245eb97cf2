use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, info};

use super::AppState;
use crate::error::AppError;
use crate::services::{WebhookError, WebhookOutcome};

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Once the receipt is logged the sender always gets 200; rejections live
/// on the receipt. Only a delivery that could not be logged asks for a retry.
fn acknowledge(source: &str, result: Result<WebhookOutcome, WebhookError>) -> Response {
    match result {
        Ok(outcome) => {
            info!(source, outcome = ?outcome, "Webhook acknowledged");
            (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()
        }
        Err(e @ WebhookError::ReceiptUnavailable(_)) => {
            error!(source, error = %e, "Webhook could not be logged");
            AppError::from(e).into_response()
        }
        Err(_) => (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response(),
    }
}

/// POST /webhook/{gateway}
pub async fn gateway_webhook(
    State(state): State<AppState>,
    Path(gateway): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = header(&headers, "x-signature");
    let result = state
        .webhooks
        .process_gateway_webhook(&gateway, &body, signature)
        .await;
    acknowledge(&gateway, result)
}

/// POST /webhook/digiflazz
pub async fn provider_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = header(&headers, "x-hub-signature");
    let result = state
        .webhooks
        .process_provider_callback(&body, signature)
        .await;
    acknowledge("digiflazz", result)
}
