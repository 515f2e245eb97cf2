//! Operator safeguards for the manual remediation paths: a second-factor
//! challenge and an hourly ceiling on successful operator topups.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use totp_rs::{Algorithm, Secret, TOTP};
use tracing::warn;

use crate::database::error::DatabaseError;
use crate::database::repository::AuditStore;

pub const ACTION_MANUAL_TOPUP: &str = "manual_topup";
pub const ACTION_CUSTOM_TOPUP: &str = "custom_topup";

/// Audit actions that count toward the hourly ceiling
const RATE_LIMITED_ACTIONS: &[&str] = &[ACTION_MANUAL_TOPUP, ACTION_CUSTOM_TOPUP];

const TOTP_STEP_SECS: u64 = 30;
const TOTP_DIGITS: usize = 6;
/// Steps of clock drift accepted either side
const TOTP_SKEW: u8 = 1;

pub trait OperatorChallenge: Send + Sync {
    fn verify(&self, code: &str) -> bool;
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// True when one more `action` may go through this hour
    async fn allow(&self, action: &str) -> Result<bool, DatabaseError>;
}

/// RFC 6238 time-based one-time codes (HMAC-SHA1, 30 s step)
pub struct TotpChallenge {
    totp: TOTP,
}

impl TotpChallenge {
    /// `None` when the secret is empty or not valid base32. Secrets shorter
    /// than 128 bits are accepted.
    pub fn from_base32(secret: &str) -> Option<Self> {
        let normalized: String = secret
            .chars()
            .filter(|c| *c != '=' && !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        if normalized.is_empty() {
            return None;
        }

        let key = Secret::Encoded(normalized).to_bytes().ok()?;
        if key.is_empty() {
            return None;
        }
        Some(Self {
            totp: TOTP::new_unchecked(
                Algorithm::SHA1,
                TOTP_DIGITS,
                TOTP_SKEW,
                TOTP_STEP_SECS,
                key,
            ),
        })
    }

    pub fn verify_at(&self, code: &str, unix_secs: u64) -> bool {
        let code = code.trim();
        code.len() == TOTP_DIGITS
            && code.chars().all(|c| c.is_ascii_digit())
            && self.totp.check(code, unix_secs)
    }
}

impl OperatorChallenge for TotpChallenge {
    fn verify(&self, code: &str) -> bool {
        match self.totp.check_current(code.trim()) {
            Ok(valid) => valid,
            Err(e) => {
                warn!(error = %e, "System clock before unix epoch, rejecting operator code");
                false
            }
        }
    }
}

/// Challenge used when no TOTP secret is configured: nothing passes
pub struct DenyAllChallenge;

impl OperatorChallenge for DenyAllChallenge {
    fn verify(&self, _code: &str) -> bool {
        warn!("Operator challenge rejected: no TOTP secret configured");
        false
    }
}

/// Ceiling backed by the audit trail, so it holds across restarts
pub struct AuditRateLimiter {
    audit: Arc<dyn AuditStore>,
    max_per_hour: i64,
}

impl AuditRateLimiter {
    pub fn new(audit: Arc<dyn AuditStore>, max_per_hour: i64) -> Self {
        Self {
            audit,
            max_per_hour,
        }
    }
}

#[async_trait]
impl RateLimiter for AuditRateLimiter {
    async fn allow(&self, action: &str) -> Result<bool, DatabaseError> {
        if !RATE_LIMITED_ACTIONS.contains(&action) {
            return Ok(true);
        }

        let since = Utc::now() - Duration::hours(1);
        let used = self
            .audit
            .count_successful_since(RATE_LIMITED_ACTIONS, since)
            .await?;

        if used >= self.max_per_hour {
            warn!(
                action,
                used,
                limit = self.max_per_hour,
                "Operator topup ceiling reached"
            );
            return Ok(false);
        }
        Ok(true)
    }
}
