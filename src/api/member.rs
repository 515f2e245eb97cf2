use axum::{
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use super::{tagged, AppState};
use crate::error::AppError;
use crate::middleware::error::success_response;
use crate::services::order_service::MemberOrderRequest;
use crate::services::OrderServiceError;

pub const MEMBER_ID_HEADER: &str = "x-member-id";

/// Member identity resolved by the upstream auth layer
#[derive(Debug, Clone, Copy)]
pub struct MemberId(pub Uuid);

impl<S: Send + Sync> FromRequestParts<S> for MemberId {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(MEMBER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .map(MemberId)
            .ok_or_else(|| AppError::unauthorized("member identity missing"))
    }
}

/// POST /member/orders
pub async fn purchase(
    State(state): State<AppState>,
    MemberId(member_id): MemberId,
    headers: HeaderMap,
    axum::Json(request): axum::Json<MemberOrderRequest>,
) -> Result<impl IntoResponse, AppError> {
    let order = state
        .orders
        .member_purchase(member_id, request)
        .await
        .map_err(tagged::<OrderServiceError>(&headers))?;

    Ok((
        StatusCode::CREATED,
        success_response(order.to_response(None, Utc::now())),
    ))
}

/// GET /member/balance
pub async fn balance(
    State(state): State<AppState>,
    MemberId(member_id): MemberId,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let balance = state
        .orders
        .member_balance(member_id)
        .await
        .map_err(tagged::<OrderServiceError>(&headers))?;

    Ok(success_response(json!({
        "member_id": member_id,
        "balance": balance,
    })))
}
