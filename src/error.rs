//! Unified error handling for the topup backend
//!
//! Every layer (stores, gateways, fulfillment, services) converts its own
//! error type into [`AppError`], which carries the HTTP status mapping,
//! a machine-readable [`ErrorCode`] and a user-facing message.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for programmatic handling by clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "NOT_FOUND")]
    NotFound,
    #[serde(rename = "CONFLICT")]
    Conflict,
    #[serde(rename = "INVALID_TRANSITION")]
    InvalidTransition,
    #[serde(rename = "INSUFFICIENT_BALANCE")]
    InsufficientBalance,
    #[serde(rename = "AMOUNT_MISMATCH")]
    AmountMismatch,
    #[serde(rename = "UNAUTHORIZED")]
    Unauthorized,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // External errors (429, 502, 504)
    #[serde(rename = "UPSTREAM_ERROR")]
    UpstreamError,
    #[serde(rename = "RATE_LIMITED")]
    RateLimited,
    #[serde(rename = "EXTERNAL_SERVICE_TIMEOUT")]
    ExternalServiceTimeout,

    // Generic
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

/// Business rule violations
#[derive(Debug, Clone)]
pub enum DomainError {
    /// Order, payment, member or product does not exist
    NotFound { entity: String, id: String },
    /// Unique key (ref_id) already taken
    Conflict { entity: String, id: String },
    /// Illegal order state edge, usually a race or a logic bug
    InvalidTransition {
        order_id: String,
        from: String,
        to: String,
    },
    /// Member balance cannot cover the debit
    InsufficientBalance { available: String, required: String },
    /// Callback amount differs from the order's frozen selling price
    AmountMismatch {
        ref_id: String,
        expected: String,
        received: String,
    },
    /// Signature, identity or operator credential rejected
    Unauthorized { reason: String },
}

/// Infrastructure-level errors (database, configuration)
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    Database { message: String, is_retryable: bool },
    Configuration { message: String },
}

/// Errors from the payment gateways and the fulfillment provider
#[derive(Debug, Clone)]
pub enum ExternalError {
    /// Transport or protocol failure talking to an upstream API
    Upstream {
        service: String,
        message: String,
        is_retryable: bool,
    },
    /// Rate limit exceeded (upstream or operator ceiling)
    RateLimit {
        service: String,
        retry_after: Option<u64>,
    },
    Timeout { service: String, timeout_secs: u64 },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    MissingField { field: String },
    InvalidValue { field: String, reason: String },
    InvalidAmount { amount: String, reason: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Domain(DomainError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }))
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Domain(DomainError::Unauthorized {
            reason: reason.into(),
        }))
    }

    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Validation(ValidationError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }))
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Validation(ValidationError::MissingField {
            field: field.into(),
        }))
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::NotFound { .. } => 404,
                DomainError::Conflict { .. } => 409,
                DomainError::InvalidTransition { .. } => 409,
                DomainError::InsufficientBalance { .. } => 422,
                DomainError::AmountMismatch { .. } => 422,
                DomainError::Unauthorized { .. } => 401,
            },
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::External(err) => match err {
                ExternalError::Upstream { .. } => 502,
                ExternalError::RateLimit { .. } => 429,
                ExternalError::Timeout { .. } => 504,
            },
            AppErrorKind::Validation(_) => 400,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::NotFound { .. } => ErrorCode::NotFound,
                DomainError::Conflict { .. } => ErrorCode::Conflict,
                DomainError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
                DomainError::InsufficientBalance { .. } => ErrorCode::InsufficientBalance,
                DomainError::AmountMismatch { .. } => ErrorCode::AmountMismatch,
                DomainError::Unauthorized { .. } => ErrorCode::Unauthorized,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::Upstream { .. } => ErrorCode::UpstreamError,
                ExternalError::RateLimit { .. } => ErrorCode::RateLimited,
                ExternalError::Timeout { .. } => ErrorCode::ExternalServiceTimeout,
            },
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
        }
    }

    /// Get user-friendly error message
    ///
    /// Upstream error codes are never exposed here; operators read them from
    /// the order record and the logs.
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::NotFound { entity, id } => {
                    format!("{} '{}' not found", entity, id)
                }
                DomainError::Conflict { entity, id } => {
                    format!("{} '{}' already exists", entity, id)
                }
                DomainError::InvalidTransition { from, to, .. } => {
                    format!("Order cannot move from '{}' to '{}'", from, to)
                }
                DomainError::InsufficientBalance {
                    available,
                    required,
                } => format!(
                    "Insufficient balance. Available: {}, Required: {}",
                    available, required
                ),
                DomainError::AmountMismatch { .. } => {
                    "Payment amount does not match the order".to_string()
                }
                DomainError::Unauthorized { .. } => "Unauthorized".to_string(),
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::External(err) => match err {
                ExternalError::Upstream {
                    service,
                    is_retryable,
                    ..
                } => {
                    if *is_retryable {
                        format!(
                            "{} is temporarily unavailable. Please try again",
                            service
                        )
                    } else {
                        "Upstream processing failed. Please contact support".to_string()
                    }
                }
                ExternalError::RateLimit {
                    service,
                    retry_after,
                } => match retry_after {
                    Some(secs) => format!(
                        "Rate limit exceeded for {}. Please try again in {} seconds",
                        service, secs
                    ),
                    None => format!("Rate limit exceeded for {}. Please try again later", service),
                },
                ExternalError::Timeout {
                    service,
                    timeout_secs,
                } => format!(
                    "{} request timed out after {} seconds. Please try again",
                    service, timeout_secs
                ),
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
                ValidationError::InvalidValue { field, reason } => {
                    format!("Invalid value for '{}': {}", field, reason)
                }
                ValidationError::InvalidAmount { amount, reason } => {
                    format!("Invalid amount '{}': {}", amount, reason)
                }
            },
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Configuration { .. } => false,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::Upstream { is_retryable, .. } => *is_retryable,
                ExternalError::RateLimit { .. } => true,
                ExternalError::Timeout { .. } => true,
            },
            AppErrorKind::Validation(_) => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

// From<DatabaseError> lives in database/error.rs, the service errors convert in their own modules.

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;
