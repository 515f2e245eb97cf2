use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::{tagged, AppState};
use crate::error::AppError;
use crate::middleware::error::success_response;
use crate::services::order_service::{CreateOrderRequest, OrderView, PayOrderRequest};
use crate::services::OrderServiceError;

fn render(view: &OrderView) -> impl IntoResponse {
    success_response(view.order.to_response(view.payment.as_ref(), Utc::now()))
}

/// POST /orders
pub async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, AppError> {
    info!(sku = %request.buyer_sku_code, "Create order request");
    let order = state
        .orders
        .create_order(request)
        .await
        .map_err(tagged::<OrderServiceError>(&headers))?;

    Ok((
        StatusCode::CREATED,
        success_response(order.to_response(None, Utc::now())),
    ))
}

/// POST /orders/{id}/pay
pub async fn pay_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<PayOrderRequest>,
) -> Result<impl IntoResponse, AppError> {
    let view = state
        .orders
        .pay(id, request)
        .await
        .map_err(tagged::<OrderServiceError>(&headers))?;
    Ok(render(&view))
}

/// POST /orders/{id}/cancel
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let order = state
        .orders
        .cancel(id)
        .await
        .map_err(tagged::<OrderServiceError>(&headers))?;
    Ok(success_response(order.to_response(None, Utc::now())))
}

/// GET /orders/{id}/status
pub async fn order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let view = state
        .orders
        .status(id)
        .await
        .map_err(tagged::<OrderServiceError>(&headers))?;
    Ok(render(&view))
}

/// GET /orders/ref/{ref_id}
pub async fn order_status_by_ref(
    State(state): State<AppState>,
    Path(ref_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let view = state
        .orders
        .status_by_ref(&ref_id)
        .await
        .map_err(tagged::<OrderServiceError>(&headers))?;
    Ok(render(&view))
}
