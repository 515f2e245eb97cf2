//! Payment gateway adapters (QRIS and virtual accounts) behind one trait

pub mod error;
pub mod factory;
pub mod provider;
pub mod providers;
pub mod types;
pub mod utils;

pub use error::{PaymentError, PaymentResult};
pub use factory::GatewayRegistry;
pub use provider::PaymentGateway;
pub use types::{
    CreatePaymentRequest, GatewayName, GatewayPaymentStatus, GatewayWebhookEvent,
    PaymentInstrument, PaymentQuery, WebhookVerificationResult,
};
