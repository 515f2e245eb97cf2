use crate::config::VaGatewayConfig;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentGateway;
use crate::payments::types::{
    CreatePaymentRequest, GatewayName, GatewayPaymentStatus, GatewayWebhookEvent,
    PaymentInstrument, PaymentQuery, WebhookVerificationResult,
};
use crate::payments::utils::{deserialize_amount, round_amount, secure_eq, GatewayHttpClient};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{info, warn};

const MAX_RETRIES: u32 = 2;

/// Virtual-account gateway. One project key covers every bank it serves.
pub struct PakasirGateway {
    config: VaGatewayConfig,
    http: GatewayHttpClient,
}

impl PakasirGateway {
    pub fn new(config: VaGatewayConfig) -> PaymentResult<Self> {
        let http = GatewayHttpClient::new(
            "pakasir",
            Duration::from_secs(config.request_timeout),
            MAX_RETRIES,
        )?;
        Ok(Self { config, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn rounded(amount: &BigDecimal) -> PaymentResult<i64> {
        round_amount(amount)
            .filter(|a| *a > 0)
            .ok_or_else(|| PaymentError::ValidationError {
                message: format!("invalid amount: {}", amount),
                field: Some("amount".to_string()),
            })
    }

    fn transaction_body(&self, ref_id: &str, amount: i64) -> JsonValue {
        serde_json::json!({
            "project": self.config.project,
            "order_id": ref_id,
            "amount": amount,
            "api_key": self.config.api_key,
        })
    }
}

#[async_trait]
impl PaymentGateway for PakasirGateway {
    fn name(&self) -> GatewayName {
        GatewayName::Pakasir
    }

    async fn create_payment(
        &self,
        request: &CreatePaymentRequest,
    ) -> PaymentResult<PaymentInstrument> {
        let amount = Self::rounded(&request.amount)?;
        let payload = self.transaction_body(&request.ref_id, amount);

        let raw: PakasirCreateResponse = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint(&format!("/transactioncreate/{}", request.method.as_str())),
                &[],
                Some(&payload),
                &[("Content-Type", "application/json")],
            )
            .await?;

        if let Some(error) = raw.error.filter(|e| !e.is_empty()) {
            return Err(PaymentError::gateway("pakasir", error));
        }
        let payment = raw
            .payment
            .ok_or_else(|| PaymentError::gateway("pakasir", "response carried no payment"))?;

        let expired_at = DateTime::parse_from_rfc3339(&payment.expired_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                PaymentError::gateway("pakasir", format!("invalid expired_at '{}': {}", payment.expired_at, e))
            })?;

        info!(
            ref_id = %request.ref_id,
            method = %request.method,
            total_payment = %payment.total_payment,
            "VA payment created"
        );

        Ok(PaymentInstrument {
            amount: payment.amount,
            fee: payment.fee,
            total_payment: payment.total_payment,
            payment_number: payment.payment_number,
            gateway_reference: None,
            qr_image_url: None,
            expired_at,
        })
    }

    async fn cancel_payment(&self, query: &PaymentQuery) -> PaymentResult<()> {
        let amount = Self::rounded(&query.amount)?;
        let payload = self.transaction_body(&query.ref_id, amount);

        let _: JsonValue = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/transactioncancel"),
                &[],
                Some(&payload),
                &[("Content-Type", "application/json")],
            )
            .await?;

        info!(ref_id = %query.ref_id, "VA payment cancelled");
        Ok(())
    }

    async fn get_payment_detail(
        &self,
        query: &PaymentQuery,
    ) -> PaymentResult<GatewayPaymentStatus> {
        let amount = Self::rounded(&query.amount)?;

        let raw: PakasirDetailResponse = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint("/transactiondetail"),
                &[
                    ("project", self.config.project.clone()),
                    ("order_id", query.ref_id.clone()),
                    ("amount", amount.to_string()),
                    ("api_key", self.config.api_key.clone()),
                ],
                None,
                &[],
            )
            .await?;

        if let Some(error) = raw.error.filter(|e| !e.is_empty()) {
            return Err(PaymentError::gateway("pakasir", error));
        }
        let transaction = raw
            .transaction
            .ok_or_else(|| PaymentError::gateway("pakasir", "response carried no transaction"))?;

        GatewayPaymentStatus::parse(&transaction.status).ok_or_else(|| {
            PaymentError::gateway(
                "pakasir",
                format!("unknown transaction status '{}'", transaction.status),
            )
        })
    }

    /// Notifications carry no signature; they must name our project
    fn verify_webhook(
        &self,
        payload: &[u8],
        _signature: Option<&str>,
    ) -> PaymentResult<WebhookVerificationResult> {
        let body: PakasirWebhookPayload = match serde_json::from_slice(payload) {
            Ok(body) => body,
            Err(_) => return Ok(WebhookVerificationResult::invalid("unreadable payload")),
        };

        if self.config.project.trim().is_empty() {
            warn!("VA gateway project not configured, refusing webhook");
            return Ok(WebhookVerificationResult::invalid("project not configured"));
        }

        if secure_eq(body.project.as_bytes(), self.config.project.as_bytes()) {
            Ok(WebhookVerificationResult::valid())
        } else {
            Ok(WebhookVerificationResult::invalid("project mismatch"))
        }
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<GatewayWebhookEvent> {
        let body: PakasirWebhookPayload =
            serde_json::from_slice(payload).map_err(|e| PaymentError::ValidationError {
                message: format!("invalid VA webhook payload: {}", e),
                field: None,
            })?;

        Ok(GatewayWebhookEvent {
            gateway: GatewayName::Pakasir,
            status: GatewayPaymentStatus::parse(&body.status),
            raw_status: body.status,
            ref_id: body.order_id,
            amount: body.amount,
            gateway_reference: body.payment_method,
            paid_at: body.completed_at,
        })
    }
}

#[derive(Debug, Deserialize)]
struct PakasirCreateResponse {
    payment: Option<PakasirPayment>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PakasirPayment {
    #[serde(deserialize_with = "deserialize_amount")]
    amount: BigDecimal,
    #[serde(deserialize_with = "deserialize_amount")]
    fee: BigDecimal,
    #[serde(deserialize_with = "deserialize_amount")]
    total_payment: BigDecimal,
    payment_number: String,
    expired_at: String,
}

#[derive(Debug, Deserialize)]
struct PakasirDetailResponse {
    transaction: Option<PakasirTransaction>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PakasirTransaction {
    status: String,
}

#[derive(Debug, Deserialize)]
struct PakasirWebhookPayload {
    #[serde(deserialize_with = "deserialize_amount")]
    amount: BigDecimal,
    order_id: String,
    #[serde(default)]
    project: String,
    status: String,
    payment_method: Option<String>,
    completed_at: Option<String>,
}
