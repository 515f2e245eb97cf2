use async_trait::async_trait;
use md5::{Digest, Md5};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::error::{FulfillmentError, FulfillmentResult};
use super::{
    FulfillmentOutcome, FulfillmentProvider, ProviderBalance, ProviderCallback, ProviderResult,
    TopupRequest,
};
use crate::config::FulfillmentConfig;
use crate::payments::utils::{amount_from_json, secure_eq};
use bigdecimal::BigDecimal;

const BALANCE_CACHE_TTL: Duration = Duration::from_secs(120);

/// Lowercase hex md5 of the concatenated parts
pub fn sign(parts: &[&str]) -> String {
    let mut hasher = Md5::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// `sha1=` + hex HMAC-SHA1 of the body
pub fn callback_signature(payload: &[u8], secret: &str) -> Option<String> {
    use hmac::{Hmac, Mac};
    use sha1::Sha1;

    let mut mac = Hmac::<Sha1>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload);
    Some(format!("sha1={}", hex::encode(mac.finalize().into_bytes())))
}

/// Maps the provider's `Sukses | Pending | Gagal` vocabulary
pub fn map_status(
    status: &str,
    rc: Option<String>,
    serial: Option<String>,
    message: Option<String>,
    price: Option<BigDecimal>,
) -> FulfillmentResult<ProviderResult> {
    let outcome = match status {
        "Sukses" => FulfillmentOutcome::Success {
            serial: serial.filter(|s| !s.trim().is_empty()),
        },
        "Pending" => FulfillmentOutcome::Pending,
        "Gagal" => FulfillmentOutcome::Failed,
        other => {
            return Err(FulfillmentError::Protocol {
                message: format!("unknown transaction status '{}'", other),
            })
        }
    };

    Ok(ProviderResult {
        outcome,
        raw_status: status.to_string(),
        rc: rc.filter(|v| !v.is_empty()),
        message: message.filter(|v| !v.is_empty()),
        price,
    })
}

struct CachedBalance {
    deposit: BigDecimal,
    fetched_at: Instant,
}

pub struct DigiflazzProvider {
    config: FulfillmentConfig,
    client: Client,
    balance_cache: RwLock<Option<CachedBalance>>,
}

impl DigiflazzProvider {
    pub fn new(config: FulfillmentConfig) -> FulfillmentResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .build()
            .map_err(|e| FulfillmentError::Transport {
                message: format!("failed to initialize HTTP client: {}", e),
            })?;

        Ok(Self {
            config,
            client,
            balance_cache: RwLock::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        payload: &JsonValue,
    ) -> FulfillmentResult<T> {
        let response = self
            .client
            .post(self.endpoint(path))
            .json(payload)
            .send()
            .await
            .map_err(|e| FulfillmentError::Transport {
                message: format!("request to {} failed: {}", path, e),
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FulfillmentError::Transport {
                message: format!("failed to read response: {}", e),
            })?;

        // Rejections come back as 4xx with a normal `data` envelope.
        serde_json::from_str::<T>(&body).map_err(|e| FulfillmentError::Protocol {
            message: format!("HTTP {} with unreadable body ({}): {}", status, e, body),
        })
    }

    async fn fetch_balance(&self) -> FulfillmentResult<BigDecimal> {
        let payload = serde_json::json!({
            "cmd": "deposit",
            "username": self.config.username,
            "sign": sign(&[&self.config.username, self.config.signing_key(), "depo"]),
        });
        let envelope: DataEnvelope<BalanceData> = self.post("/cek-saldo", &payload).await?;
        amount_from_json(&envelope.data.deposit).ok_or_else(|| FulfillmentError::Protocol {
            message: format!("invalid deposit value: {}", envelope.data.deposit),
        })
    }
}

#[async_trait]
impl FulfillmentProvider for DigiflazzProvider {
    async fn topup(&self, request: &TopupRequest) -> FulfillmentResult<ProviderResult> {
        let mut payload = serde_json::json!({
            "username": self.config.username,
            "buyer_sku_code": request.buyer_sku_code,
            "customer_no": request.customer_no,
            "ref_id": request.ref_id,
            "sign": sign(&[&self.config.username, self.config.signing_key(), &request.ref_id]),
        });
        if self.config.testing {
            payload["testing"] = serde_json::json!(true);
        }
        if let Some(callback_url) = &self.config.callback_url {
            payload["cb_url"] = serde_json::json!(callback_url);
        }

        debug!(
            ref_id = %request.ref_id,
            sku = %request.buyer_sku_code,
            testing = self.config.testing,
            "Sending topup request"
        );

        let envelope: DataEnvelope<TransactionData> = self.post("/transaction", &payload).await?;
        let data = envelope.data;

        let result = map_status(
            &data.status,
            data.rc,
            data.sn,
            data.message,
            data.price.as_ref().and_then(amount_from_json),
        )?;

        info!(
            ref_id = %request.ref_id,
            status = %result.raw_status,
            rc = ?result.rc,
            "Topup response received"
        );

        Ok(result)
    }

    async fn check_balance(&self) -> FulfillmentResult<ProviderBalance> {
        {
            let cache = self.balance_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < BALANCE_CACHE_TTL {
                    return Ok(ProviderBalance {
                        deposit: cached.deposit.clone(),
                        cached: true,
                        stale: false,
                    });
                }
            }
        }

        let mut cache = self.balance_cache.write().await;
        match self.fetch_balance().await {
            Ok(deposit) => {
                *cache = Some(CachedBalance {
                    deposit: deposit.clone(),
                    fetched_at: Instant::now(),
                });
                Ok(ProviderBalance {
                    deposit,
                    cached: false,
                    stale: false,
                })
            }
            Err(e) => match cache.as_ref() {
                Some(cached) => {
                    warn!(error = %e, "Balance lookup failed, serving last known value");
                    Ok(ProviderBalance {
                        deposit: cached.deposit.clone(),
                        cached: true,
                        stale: true,
                    })
                }
                None => Err(e),
            },
        }
    }

    fn verify_callback(&self, payload: &[u8], signature: Option<&str>) -> bool {
        let secret = self.config.webhook_secret.trim();
        if secret.is_empty() {
            warn!("Provider webhook secret not configured, refusing callback");
            return false;
        }
        let (Some(expected), Some(received)) = (callback_signature(payload, secret), signature)
        else {
            return false;
        };
        secure_eq(expected.as_bytes(), received.trim().as_bytes())
    }

    fn parse_callback(&self, payload: &[u8]) -> FulfillmentResult<ProviderCallback> {
        let envelope: DataEnvelope<CallbackData> =
            serde_json::from_slice(payload).map_err(|e| FulfillmentError::InvalidCallback {
                message: e.to_string(),
            })?;
        let data = envelope.data;

        let result = map_status(
            &data.status,
            data.rc,
            data.sn,
            data.message,
            data.price.as_ref().and_then(amount_from_json),
        )
        .map_err(|e| FulfillmentError::InvalidCallback {
            message: e.to_string(),
        })?;

        Ok(ProviderCallback {
            ref_id: data.ref_id,
            result,
        })
    }
}

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct TransactionData {
    #[serde(default)]
    status: String,
    rc: Option<String>,
    sn: Option<String>,
    message: Option<String>,
    price: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct BalanceData {
    deposit: JsonValue,
}

#[derive(Debug, Deserialize)]
struct CallbackData {
    ref_id: String,
    status: String,
    rc: Option<String>,
    sn: Option<String>,
    message: Option<String>,
    price: Option<JsonValue>,
}
