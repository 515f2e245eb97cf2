use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, HeaderMap},
    response::IntoResponse,
};
use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::{tagged, AppState};
use crate::error::AppError;
use crate::middleware::error::success_response;
use crate::services::admin_service::{CustomTopupRequest, ManualTopupRequest};
use crate::services::AdminError;

pub const ADMIN_ID_HEADER: &str = "x-admin-id";

/// Operator identity resolved by the upstream auth layer
#[derive(Debug, Clone)]
pub struct OperatorId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for OperatorId {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(ADMIN_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| OperatorId(v.to_string()))
            .ok_or_else(|| AppError::unauthorized("operator identity missing"))
    }
}

#[derive(Debug, Deserialize)]
pub struct MemberTopupRequest {
    pub amount: BigDecimal,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookListQuery {
    pub limit: Option<i64>,
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// POST /admin/orders/{id}/manual-topup
pub async fn manual_topup(
    State(state): State<AppState>,
    OperatorId(operator): OperatorId,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<ManualTopupRequest>,
) -> Result<impl IntoResponse, AppError> {
    info!(operator = %operator, order_id = %id, "Manual topup requested");
    let order = state
        .admin
        .manual_topup(id, request, client_ip(&headers))
        .await
        .map_err(tagged::<AdminError>(&headers))?;
    Ok(success_response(order.to_response(None, Utc::now())))
}

/// POST /admin/topup/custom
pub async fn custom_topup(
    State(state): State<AppState>,
    OperatorId(operator): OperatorId,
    headers: HeaderMap,
    axum::Json(request): axum::Json<CustomTopupRequest>,
) -> Result<impl IntoResponse, AppError> {
    info!(operator = %operator, sku = %request.sku, "Custom topup requested");
    let order = state
        .admin
        .custom_topup(request, client_ip(&headers))
        .await
        .map_err(tagged::<AdminError>(&headers))?;
    Ok(success_response(order.to_response(None, Utc::now())))
}

/// POST /admin/orders/{id}/check-status
pub async fn check_status(
    State(state): State<AppState>,
    OperatorId(_): OperatorId,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let order = state
        .admin
        .check_status(id)
        .await
        .map_err(tagged::<AdminError>(&headers))?;

    // Operators see the raw provider fields the customer view hides
    Ok(success_response(json!({
        "order": order.to_response(None, Utc::now()),
        "provider_status": order.provider_status,
        "provider_rc": order.provider_rc,
        "provider_ref_id": order.provider_ref_id,
    })))
}

/// POST /admin/members/{id}/topup
pub async fn topup_member(
    State(state): State<AppState>,
    OperatorId(operator): OperatorId,
    Path(member_id): Path<Uuid>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<MemberTopupRequest>,
) -> Result<impl IntoResponse, AppError> {
    info!(operator = %operator, member_id = %member_id, amount = %request.amount, "Member topup");
    let receipt = state
        .admin
        .topup_member(member_id, request.amount, request.description)
        .await
        .map_err(tagged::<AdminError>(&headers))?;

    Ok(success_response(json!({
        "entry": receipt.entry,
        "balance_after": receipt.balance_after,
    })))
}

/// GET /admin/webhooks?limit=
pub async fn recent_webhooks(
    State(state): State<AppState>,
    OperatorId(_): OperatorId,
    Query(query): Query<WebhookListQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let receipts = state
        .admin
        .recent_webhooks(query.limit.unwrap_or(50))
        .await
        .map_err(tagged::<AdminError>(&headers))?;
    Ok(success_response(receipts))
}

/// GET /admin/fulfillment/balance
pub async fn provider_balance(
    State(state): State<AppState>,
    OperatorId(_): OperatorId,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let balance = state
        .admin
        .provider_balance()
        .await
        .map_err(tagged::<AdminError>(&headers))?;
    Ok(success_response(balance))
}
