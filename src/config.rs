//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use bigdecimal::BigDecimal;
use std::env;
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub qr_gateway: QrGatewayConfig,
    pub va_gateway: VaGatewayConfig,
    pub fulfillment: FulfillmentConfig,
    pub pricing: PricingConfig,
    pub admin: AdminSecurityConfig,
    pub topup_policy: TopupPolicyConfig,
    pub workers: WorkerScheduleConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone)]
pub enum LogFormat {
    Json,
    Plain,
}

/// QR gateway credentials
#[derive(Debug, Clone)]
pub struct QrGatewayConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
    /// HMAC-SHA256 key for webhook signatures; webhooks are refused without it
    pub webhook_secret: String,
    pub callback_url: Option<String>,
    pub request_timeout: u64, // seconds
}

/// Virtual-account gateway credentials
#[derive(Debug, Clone)]
pub struct VaGatewayConfig {
    pub base_url: String,
    /// Webhooks must name this project
    pub project: String,
    pub api_key: String,
    pub request_timeout: u64, // seconds
}

/// Fulfillment provider credentials
#[derive(Debug, Clone)]
pub struct FulfillmentConfig {
    pub base_url: String,
    pub username: String,
    pub api_key: String,
    pub dev_key: String,
    /// Sends `testing: true` and signs with the dev key
    pub testing: bool,
    pub callback_url: Option<String>,
    /// HMAC-SHA1 key for `X-Hub-Signature` on callbacks
    pub webhook_secret: String,
    pub request_timeout: u64, // seconds
}

/// Pricing knobs for web orders
#[derive(Debug, Clone)]
pub struct PricingConfig {
    pub web_admin_fee: BigDecimal,
}

/// Operator credentials and manual topup ceiling
#[derive(Debug, Clone)]
pub struct AdminSecurityConfig {
    pub password: String,
    /// Base32 TOTP secret
    pub totp_secret: String,
    pub max_topups_per_hour: i64,
}

/// Re-check policy for provider results left in `Pending`
#[derive(Debug, Clone)]
pub struct TopupPolicyConfig {
    pub recheck_interval_secs: u64,
    pub recheck_max_attempts: i32,
}

/// Cadence of the expiry sweep and paid-order resume workers
#[derive(Debug, Clone)]
pub struct WorkerScheduleConfig {
    pub expiry_sweep_interval_secs: u64,
    pub pending_order_max_age_secs: u64,
    pub paid_resume_interval_secs: u64,
    pub paid_stuck_after_secs: u64,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            qr_gateway: QrGatewayConfig::from_env()?,
            va_gateway: VaGatewayConfig::from_env()?,
            fulfillment: FulfillmentConfig::from_env()?,
            pricing: PricingConfig::from_env()?,
            admin: AdminSecurityConfig::from_env()?,
            topup_policy: TopupPolicyConfig::from_env()?,
            workers: WorkerScheduleConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.database.validate()?;
        self.logging.validate()?;
        self.qr_gateway.validate()?;
        self.va_gateway.validate()?;
        self.fulfillment.validate()?;
        self.admin.validate()?;
        self.topup_policy.validate()?;
        self.workers.validate()?;

        Ok(())
    }
}

fn parse_var<T: FromStr>(name: &str, default: &str) -> Result<T, ConfigError> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name.to_string()))
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn require(name: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingVariable(name.to_string()));
    }
    Ok(())
}

fn validate_url(name: &str, url: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::InvalidValue(format!(
            "{} must be a valid URL",
            name
        )));
    }
    Ok(())
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_var("SERVER_PORT", "8080")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingVariable("DATABASE_URL".to_string()))?,
            max_connections: parse_var("DB_MAX_CONNECTIONS", "20")?,
            min_connections: parse_var("DB_MIN_CONNECTIONS", "5")?,
            connection_timeout: parse_var("DB_CONNECTION_TIMEOUT", "30")?,
            idle_timeout: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|val| val.parse().ok()),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl QrGatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(QrGatewayConfig {
            base_url: env::var("QRIS_BASE_URL")
                .unwrap_or_else(|_| "https://qris.pw/api".to_string()),
            api_key: env::var("QRIS_API_KEY").unwrap_or_default(),
            api_secret: env::var("QRIS_API_SECRET").unwrap_or_default(),
            webhook_secret: env::var("QRIS_WEBHOOK_SECRET").unwrap_or_default(),
            callback_url: optional_var("QRIS_CALLBACK_URL"),
            request_timeout: parse_var("QRIS_REQUEST_TIMEOUT", "30")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url("QRIS_BASE_URL", &self.base_url)?;
        require("QRIS_WEBHOOK_SECRET", &self.webhook_secret)?;
        if self.request_timeout == 0 {
            return Err(ConfigError::InvalidValue("QRIS_REQUEST_TIMEOUT".to_string()));
        }
        Ok(())
    }
}

impl VaGatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(VaGatewayConfig {
            base_url: env::var("PAKASIR_BASE_URL")
                .unwrap_or_else(|_| "https://app.pakasir.com/api".to_string()),
            project: env::var("PAKASIR_PROJECT").unwrap_or_default(),
            api_key: env::var("PAKASIR_API_KEY").unwrap_or_default(),
            request_timeout: parse_var("PAKASIR_REQUEST_TIMEOUT", "30")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url("PAKASIR_BASE_URL", &self.base_url)?;
        require("PAKASIR_PROJECT", &self.project)?;
        if self.request_timeout == 0 {
            return Err(ConfigError::InvalidValue(
                "PAKASIR_REQUEST_TIMEOUT".to_string(),
            ));
        }
        Ok(())
    }
}

impl FulfillmentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(FulfillmentConfig {
            base_url: env::var("DIGIFLAZZ_BASE_URL")
                .unwrap_or_else(|_| "https://api.digiflazz.com/v1".to_string()),
            username: env::var("DIGIFLAZZ_USERNAME").unwrap_or_default(),
            api_key: env::var("DIGIFLAZZ_API_KEY").unwrap_or_default(),
            dev_key: env::var("DIGIFLAZZ_DEV_KEY").unwrap_or_default(),
            testing: parse_var("DIGIFLAZZ_TESTING", "false")?,
            callback_url: optional_var("DIGIFLAZZ_CALLBACK_URL"),
            webhook_secret: env::var("DIGIFLAZZ_WEBHOOK_SECRET").unwrap_or_default(),
            request_timeout: parse_var("DIGIFLAZZ_REQUEST_TIMEOUT", "60")?,
        })
    }

    /// Key used for request signatures
    pub fn signing_key(&self) -> &str {
        if self.testing {
            &self.dev_key
        } else {
            &self.api_key
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url("DIGIFLAZZ_BASE_URL", &self.base_url)?;
        require("DIGIFLAZZ_WEBHOOK_SECRET", &self.webhook_secret)?;
        if self.request_timeout == 0 {
            return Err(ConfigError::InvalidValue(
                "DIGIFLAZZ_REQUEST_TIMEOUT".to_string(),
            ));
        }
        Ok(())
    }
}

impl PricingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(PricingConfig {
            web_admin_fee: parse_var("WEB_ADMIN_FEE", "10")?,
        })
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            web_admin_fee: BigDecimal::from(10),
        }
    }
}

impl AdminSecurityConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(AdminSecurityConfig {
            password: env::var("ADMIN_PASSWORD").unwrap_or_default(),
            totp_secret: env::var("ADMIN_TOTP_SECRET").unwrap_or_default(),
            max_topups_per_hour: parse_var("MAX_TOPUPS_PER_HOUR", "10")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_topups_per_hour <= 0 {
            return Err(ConfigError::InvalidValue("MAX_TOPUPS_PER_HOUR".to_string()));
        }
        Ok(())
    }
}

impl TopupPolicyConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(TopupPolicyConfig {
            recheck_interval_secs: parse_var("TOPUP_RECHECK_INTERVAL_SECS", "60")?,
            recheck_max_attempts: parse_var("TOPUP_RECHECK_MAX_ATTEMPTS", "30")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.recheck_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "TOPUP_RECHECK_INTERVAL_SECS".to_string(),
            ));
        }
        if self.recheck_max_attempts < 0 {
            return Err(ConfigError::InvalidValue(
                "TOPUP_RECHECK_MAX_ATTEMPTS".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for TopupPolicyConfig {
    fn default() -> Self {
        Self {
            recheck_interval_secs: 60,
            recheck_max_attempts: 30,
        }
    }
}

impl WorkerScheduleConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(WorkerScheduleConfig {
            expiry_sweep_interval_secs: parse_var("EXPIRY_SWEEP_INTERVAL_SECS", "60")?,
            pending_order_max_age_secs: parse_var("PENDING_ORDER_MAX_AGE_SECS", "86400")?,
            paid_resume_interval_secs: parse_var("PAID_RESUME_INTERVAL_SECS", "60")?,
            paid_stuck_after_secs: parse_var("PAID_STUCK_AFTER_SECS", "120")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("EXPIRY_SWEEP_INTERVAL_SECS", self.expiry_sweep_interval_secs),
            ("PENDING_ORDER_MAX_AGE_SECS", self.pending_order_max_age_secs),
            ("PAID_RESUME_INTERVAL_SECS", self.paid_resume_interval_secs),
            ("PAID_STUCK_AFTER_SECS", self.paid_stuck_after_secs),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(ConfigError::InvalidValue(name.to_string()));
            }
        }
        Ok(())
    }
}

impl Default for WorkerScheduleConfig {
    fn default() -> Self {
        Self {
            expiry_sweep_interval_secs: 60,
            pending_order_max_age_secs: 24 * 60 * 60,
            paid_resume_interval_secs: 60,
            paid_stuck_after_secs: 120,
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

impl From<ConfigError> for crate::error::AppError {
    fn from(err: ConfigError) -> Self {
        use crate::error::{AppError, AppErrorKind, InfrastructureError};

        AppError::new(AppErrorKind::Infrastructure(
            InfrastructureError::Configuration {
                message: err.to_string(),
            },
        ))
    }
}
