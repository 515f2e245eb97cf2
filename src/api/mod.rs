//! HTTP surface: storefront orders, member purchases, operator tools and
//! inbound webhooks

pub mod admin;
pub mod member;
pub mod orders;
pub mod webhooks;

use axum::{
    http::HeaderMap,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::health::{self, HealthChecker};
use crate::middleware::error::get_request_id_from_headers;
use crate::middleware::logging::{request_logging_middleware, UuidRequestId};
use crate::services::{AdminService, OrderService, WebhookProcessor};

#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderService>,
    pub webhooks: Arc<WebhookProcessor>,
    pub admin: Arc<AdminService>,
}

/// Full application router with request id and tracing layers
pub fn router(state: AppState, health_checker: HealthChecker) -> Router {
    let api = Router::new()
        .route("/orders", post(orders::create_order))
        .route("/orders/ref/{ref_id}", get(orders::order_status_by_ref))
        .route("/orders/{id}/pay", post(orders::pay_order))
        .route("/orders/{id}/cancel", post(orders::cancel_order))
        .route("/orders/{id}/status", get(orders::order_status))
        .route("/member/orders", post(member::purchase))
        .route("/member/balance", get(member::balance))
        .route(
            "/admin/orders/{id}/manual-topup",
            post(admin::manual_topup),
        )
        .route(
            "/admin/orders/{id}/check-status",
            post(admin::check_status),
        )
        .route("/admin/topup/custom", post(admin::custom_topup))
        .route("/admin/members/{id}/topup", post(admin::topup_member))
        .route("/admin/webhooks", get(admin::recent_webhooks))
        .route("/admin/fulfillment/balance", get(admin::provider_balance))
        .route("/webhook/digiflazz", post(webhooks::provider_callback))
        .route("/webhook/{gateway}", post(webhooks::gateway_webhook))
        .with_state(state);

    let probes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .with_state(health_checker);

    api.merge(probes).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
            .layer(TraceLayer::new_for_http())
            .layer(axum::middleware::from_fn(request_logging_middleware))
            .layer(PropagateRequestIdLayer::x_request_id()),
    )
}

/// Converts a service error and tags it with the caller's request id
pub(crate) fn tagged<E: Into<AppError>>(headers: &HeaderMap) -> impl Fn(E) -> AppError + '_ {
    move |err| {
        let err: AppError = err.into();
        match get_request_id_from_headers(headers) {
            Some(request_id) => err.with_request_id(request_id),
            None => err,
        }
    }
}
