use crate::payments::error::{PaymentError, PaymentResult};
use bigdecimal::{BigDecimal, ToPrimitive};
use reqwest::Client;
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// HTTP client shared by the gateway adapters.
///
/// Retries 429 and 5xx answers with `1 << attempt` second backoff.
#[derive(Clone)]
pub struct GatewayHttpClient {
    client: Client,
    gateway: &'static str,
    timeout: Duration,
    max_retries: u32,
}

impl GatewayHttpClient {
    pub fn new(gateway: &'static str, timeout: Duration, max_retries: u32) -> PaymentResult<Self> {
        let client =
            Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| PaymentError::NetworkError {
                    message: format!("failed to initialize HTTP client: {}", e),
                })?;

        Ok(Self {
            client,
            gateway,
            timeout,
            max_retries,
        })
    }

    /// Sends one JSON request, retrying transport failures, 429 and 5xx
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<&JsonValue>,
        headers: &[(&str, &str)],
    ) -> PaymentResult<T> {
        let mut attempt = 0;
        loop {
            let mut request = self
                .client
                .request(method.clone(), url)
                .timeout(self.timeout);
            if !query.is_empty() {
                request = request.query(query);
            }
            for (name, value) in headers {
                request = request.header(*name, *value);
            }
            if let Some(payload) = body {
                request = request.json(payload);
            }

            let error = match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    if status.is_success() {
                        return serde_json::from_str::<T>(&text).map_err(|e| {
                            PaymentError::GatewayError {
                                gateway: self.gateway.to_string(),
                                message: format!("unreadable gateway response: {}", e),
                                gateway_code: None,
                                retryable: false,
                            }
                        });
                    }
                    if status.as_u16() == 429 {
                        PaymentError::RateLimitError {
                            message: format!("{} rate limit exceeded", self.gateway),
                            retry_after_seconds: None,
                        }
                    } else {
                        let error = PaymentError::GatewayError {
                            gateway: self.gateway.to_string(),
                            message: format!("HTTP {}: {}", status, text),
                            gateway_code: Some(status.as_u16().to_string()),
                            retryable: status.is_server_error(),
                        };
                        if !status.is_server_error() {
                            return Err(error);
                        }
                        error
                    }
                }
                Err(e) => PaymentError::NetworkError {
                    message: format!("{} request failed: {}", self.gateway, e),
                },
            };

            if attempt >= self.max_retries {
                return Err(error);
            }
            attempt += 1;
            warn!(
                gateway = self.gateway,
                attempt,
                error = %error,
                "Gateway call failed, backing off"
            );
            tokio::time::sleep(Duration::from_secs(1 << (attempt - 1))).await;
        }
    }
}

pub fn hmac_sha256_hex(payload: &[u8], secret: &str) -> Option<String> {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

pub fn verify_hmac_sha256_hex(payload: &[u8], secret: &str, signature: &str) -> bool {
    match hmac_sha256_hex(payload, secret) {
        Some(computed) => secure_eq(computed.as_bytes(), signature.trim().as_bytes()),
        None => false,
    }
}

pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Whole currency units, fraction dropped
pub fn truncate_amount(amount: &BigDecimal) -> Option<i64> {
    amount.with_scale(0).to_i64()
}

/// Whole currency units, half rounded up
pub fn round_amount(amount: &BigDecimal) -> Option<i64> {
    let half = BigDecimal::from(5) / BigDecimal::from(10);
    (amount + half).with_scale(0).to_i64()
}

/// Gateways send amounts either as JSON numbers or as decimal strings
pub fn amount_from_json(value: &JsonValue) -> Option<BigDecimal> {
    match value {
        JsonValue::Number(n) => BigDecimal::from_str(&n.to_string()).ok(),
        JsonValue::String(s) => BigDecimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

pub fn deserialize_amount<'de, D>(deserializer: D) -> Result<BigDecimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = JsonValue::deserialize(deserializer)?;
    amount_from_json(&value).ok_or_else(|| D::Error::custom(format!("invalid amount: {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_eq_behaves_correctly() {
        assert!(secure_eq(b"abc", b"abc"));
        assert!(!secure_eq(b"abc", b"abd"));
        assert!(!secure_eq(b"abc", b"ab"));
    }

    #[test]
    fn webhook_hmac_verification_detects_invalid_signature() {
        let payload = br#"{"order_id":"GVS-1","status":"paid"}"#;
        assert!(!verify_hmac_sha256_hex(payload, "secret", "not-a-valid-signature"));

        let signature = hmac_sha256_hex(payload, "secret").unwrap();
        assert!(verify_hmac_sha256_hex(payload, "secret", &signature));
        assert!(!verify_hmac_sha256_hex(payload, "other", &signature));
    }

    #[test]
    fn amounts_are_truncated_or_rounded_to_whole_units() {
        let amount = BigDecimal::from_str("20010.99").unwrap();
        assert_eq!(truncate_amount(&amount), Some(20010));
        assert_eq!(round_amount(&amount), Some(20011));
        assert_eq!(
            round_amount(&BigDecimal::from_str("20010.4").unwrap()),
            Some(20010)
        );
    }

    #[test]
    fn amounts_parse_from_numbers_and_strings() {
        assert_eq!(
            amount_from_json(&serde_json::json!(20010)),
            Some(BigDecimal::from(20010))
        );
        assert_eq!(
            amount_from_json(&serde_json::json!("20010.00")),
            Some(BigDecimal::from_str("20010.00").unwrap())
        );
        assert_eq!(amount_from_json(&serde_json::json!(null)), None);
    }
}
