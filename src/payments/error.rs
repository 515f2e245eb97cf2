use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("Validation error: {message}")]
    ValidationError {
        message: String,
        field: Option<String>,
    },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Rate limit exceeded: {message}")]
    RateLimitError {
        message: String,
        retry_after_seconds: Option<u64>,
    },

    #[error("Webhook verification failed: {message}")]
    WebhookVerificationError { message: String },

    #[error("Gateway error: gateway={gateway}, message={message}")]
    GatewayError {
        gateway: String,
        message: String,
        gateway_code: Option<String>,
        retryable: bool,
    },
}

impl PaymentError {
    pub fn gateway(gateway: impl Into<String>, message: impl Into<String>) -> Self {
        PaymentError::GatewayError {
            gateway: gateway.into(),
            message: message.into(),
            gateway_code: None,
            retryable: false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::ValidationError { .. } => false,
            PaymentError::NetworkError { .. } => true,
            PaymentError::RateLimitError { .. } => true,
            PaymentError::WebhookVerificationError { .. } => false,
            PaymentError::GatewayError { retryable, .. } => *retryable,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            PaymentError::ValidationError { .. } => 400,
            PaymentError::NetworkError { .. } => 503,
            PaymentError::RateLimitError { .. } => 429,
            PaymentError::WebhookVerificationError { .. } => 401,
            PaymentError::GatewayError { .. } => 502,
        }
    }
}

impl From<PaymentError> for crate::error::AppError {
    fn from(err: PaymentError) -> Self {
        use crate::error::{AppError, AppErrorKind, ExternalError, ValidationError};

        match err {
            PaymentError::ValidationError { message, field } => {
                AppError::new(AppErrorKind::Validation(ValidationError::InvalidValue {
                    field: field.unwrap_or_else(|| "payment".to_string()),
                    reason: message,
                }))
            }
            PaymentError::WebhookVerificationError { message } => AppError::unauthorized(message),
            PaymentError::RateLimitError {
                retry_after_seconds,
                ..
            } => AppError::new(AppErrorKind::External(ExternalError::RateLimit {
                service: "payment_gateway".to_string(),
                retry_after: retry_after_seconds,
            })),
            other => AppError::new(AppErrorKind::External(ExternalError::Upstream {
                service: "payment_gateway".to_string(),
                message: other.to_string(),
                is_retryable: other.is_retryable(),
            })),
        }
    }
}
