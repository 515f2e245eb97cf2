use crate::config::QrGatewayConfig;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentGateway;
use crate::payments::types::{
    CreatePaymentRequest, GatewayName, GatewayPaymentStatus, GatewayWebhookEvent,
    PaymentInstrument, PaymentQuery, WebhookVerificationResult,
};
use crate::payments::utils::{
    deserialize_amount, truncate_amount, verify_hmac_sha256_hex, GatewayHttpClient,
};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, info, warn};

const MAX_RETRIES: u32 = 2;
/// Used when the gateway's `expires_at` cannot be read
const FALLBACK_EXPIRY_MINUTES: i64 = 10;
/// The gateway reports local time in WIB
const GATEWAY_UTC_OFFSET_SECS: i32 = 7 * 3600;

/// QRIS gateway: dynamic QR codes paid from any Indonesian e-wallet or bank app
pub struct QrispwGateway {
    config: QrGatewayConfig,
    http: GatewayHttpClient,
}

impl QrispwGateway {
    pub fn new(config: QrGatewayConfig) -> PaymentResult<Self> {
        let http = GatewayHttpClient::new(
            "qrispw",
            Duration::from_secs(config.request_timeout),
            MAX_RETRIES,
        )?;
        Ok(Self { config, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn auth_headers(&self) -> [(&str, &str); 2] {
        [
            ("X-API-Key", self.config.api_key.as_str()),
            ("X-API-Secret", self.config.api_secret.as_str()),
        ]
    }
}

/// Parses `YYYY-MM-DD HH:MM:SS` in gateway local time into UTC
pub fn parse_gateway_expiry(value: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    let fallback = now + ChronoDuration::minutes(FALLBACK_EXPIRY_MINUTES);
    let Ok(naive) = NaiveDateTime::parse_from_str(value.trim(), "%Y-%m-%d %H:%M:%S") else {
        return fallback;
    };
    FixedOffset::east_opt(GATEWAY_UTC_OFFSET_SECS)
        .and_then(|offset| offset.from_local_datetime(&naive).single())
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or(fallback)
}

#[async_trait]
impl PaymentGateway for QrispwGateway {
    fn name(&self) -> GatewayName {
        GatewayName::Qrispw
    }

    async fn create_payment(
        &self,
        request: &CreatePaymentRequest,
    ) -> PaymentResult<PaymentInstrument> {
        let amount = truncate_amount(&request.amount)
            .filter(|a| *a > 0)
            .ok_or_else(|| PaymentError::ValidationError {
                message: format!("invalid amount: {}", request.amount),
                field: Some("amount".to_string()),
            })?;

        let mut payload = serde_json::json!({
            "amount": amount,
            "order_id": request.ref_id,
            "customer_name": request.customer_name.clone().unwrap_or_else(|| "Customer".to_string()),
        });
        if let Some(phone) = request.customer_phone.as_deref().filter(|p| !p.is_empty()) {
            payload["customer_phone"] = serde_json::json!(phone);
        }
        if let Some(callback_url) = &self.config.callback_url {
            payload["callback_url"] = serde_json::json!(callback_url);
        }

        debug!(ref_id = %request.ref_id, amount, "Creating QRIS payment");

        let raw: QrispwCreateResponse = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/create-payment.php"),
                &[],
                Some(&payload),
                &self.auth_headers(),
            )
            .await?;

        if !raw.success {
            return Err(PaymentError::gateway(
                "qrispw",
                raw.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        let qris_string = raw
            .qris_string
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PaymentError::gateway("qrispw", "response carried no qris_string"))?;
        let expired_at = parse_gateway_expiry(raw.expires_at.as_deref().unwrap_or(""), Utc::now());

        info!(
            ref_id = %request.ref_id,
            transaction_id = ?raw.transaction_id,
            "QRIS payment created"
        );

        let total = BigDecimal::from(amount);
        Ok(PaymentInstrument {
            amount: total.clone(),
            fee: BigDecimal::from(0),
            total_payment: total,
            payment_number: qris_string,
            gateway_reference: raw.transaction_id,
            qr_image_url: raw.qris_url,
            expired_at,
        })
    }

    async fn cancel_payment(&self, query: &PaymentQuery) -> PaymentResult<()> {
        // No cancel endpoint upstream; the QR lapses at its expiry.
        debug!(ref_id = %query.ref_id, "QRIS cancel is local only");
        Ok(())
    }

    async fn get_payment_detail(
        &self,
        query: &PaymentQuery,
    ) -> PaymentResult<GatewayPaymentStatus> {
        let transaction_id = query
            .gateway_reference
            .clone()
            .filter(|v| !v.trim().is_empty())
            .ok_or(PaymentError::ValidationError {
                message: "transaction_id is required for QRIS status checks".to_string(),
                field: Some("gateway_reference".to_string()),
            })?;

        let raw: QrispwCheckResponse = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint("/check-payment.php"),
                &[("transaction_id", transaction_id)],
                None,
                &self.auth_headers(),
            )
            .await?;

        if !raw.success {
            return Err(PaymentError::gateway(
                "qrispw",
                raw.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        GatewayPaymentStatus::parse(&raw.status).ok_or_else(|| {
            PaymentError::gateway("qrispw", format!("unknown payment status '{}'", raw.status))
        })
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> PaymentResult<WebhookVerificationResult> {
        if self.config.webhook_secret.trim().is_empty() {
            warn!("QRIS webhook secret not configured, refusing webhook");
            return Ok(WebhookVerificationResult::invalid(
                "webhook secret not configured",
            ));
        }

        let (signed, signature) = match signature.filter(|s| !s.trim().is_empty()) {
            Some(header) => (payload.to_vec(), header.to_string()),
            None => match split_body_signature(payload) {
                Some(pair) => pair,
                None => return Ok(WebhookVerificationResult::invalid("missing signature")),
            },
        };

        if verify_hmac_sha256_hex(&signed, &self.config.webhook_secret, &signature) {
            Ok(WebhookVerificationResult::valid())
        } else {
            Ok(WebhookVerificationResult::invalid("signature mismatch"))
        }
    }

    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<GatewayWebhookEvent> {
        let body: QrispwWebhookPayload =
            serde_json::from_slice(payload).map_err(|e| PaymentError::ValidationError {
                message: format!("invalid QRIS webhook payload: {}", e),
                field: None,
            })?;

        Ok(GatewayWebhookEvent {
            gateway: GatewayName::Qrispw,
            status: GatewayPaymentStatus::parse(&body.status),
            raw_status: body.status,
            ref_id: body.order_id,
            amount: body.amount,
            gateway_reference: body.transaction_id,
            paid_at: body.paid_at,
        })
    }
}

#[derive(Debug, Deserialize)]
struct QrispwCreateResponse {
    success: bool,
    transaction_id: Option<String>,
    qris_url: Option<String>,
    qris_string: Option<String>,
    expires_at: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QrispwCheckResponse {
    success: bool,
    #[serde(default)]
    status: String,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QrispwWebhookPayload {
    transaction_id: Option<String>,
    order_id: String,
    #[serde(deserialize_with = "deserialize_amount")]
    amount: BigDecimal,
    status: String,
    paid_at: Option<String>,
}

/// A body-embedded signature covers the compact JSON of the body without
/// its `signature` key.
fn split_body_signature(payload: &[u8]) -> Option<(Vec<u8>, String)> {
    let mut body: JsonValue = serde_json::from_slice(payload).ok()?;
    let signature = match body.as_object_mut()?.remove("signature")? {
        JsonValue::String(s) if !s.trim().is_empty() => s,
        _ => return None,
    };
    let unsigned = serde_json::to_vec(&body).ok()?;
    Some((unsigned, signature))
}
