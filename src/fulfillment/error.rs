use thiserror::Error;

pub type FulfillmentResult<T> = Result<T, FulfillmentError>;

#[derive(Debug, Clone, Error)]
pub enum FulfillmentError {
    /// The request never produced a readable answer
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The provider answered with something outside its protocol
    #[error("protocol error: {message}")]
    Protocol { message: String },

    #[error("invalid callback: {message}")]
    InvalidCallback { message: String },
}

impl From<FulfillmentError> for crate::error::AppError {
    fn from(err: FulfillmentError) -> Self {
        use crate::error::{AppError, AppErrorKind, ExternalError, ValidationError};

        match err {
            FulfillmentError::InvalidCallback { message } => {
                AppError::new(AppErrorKind::Validation(ValidationError::InvalidValue {
                    field: "callback".to_string(),
                    reason: message,
                }))
            }
            other => AppError::new(AppErrorKind::External(ExternalError::Upstream {
                service: "fulfillment".to_string(),
                is_retryable: matches!(other, FulfillmentError::Transport { .. }),
                message: other.to_string(),
            })),
        }
    }
}
