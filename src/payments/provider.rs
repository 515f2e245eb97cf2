use crate::payments::error::PaymentResult;
use crate::payments::types::{
    CreatePaymentRequest, GatewayName, GatewayPaymentStatus, GatewayWebhookEvent,
    PaymentInstrument, PaymentQuery, WebhookVerificationResult,
};
use async_trait::async_trait;

/// A payment gateway that issues QR codes or virtual accounts for orders
/// and reports back when the buyer paid.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> GatewayName;

    async fn create_payment(
        &self,
        request: &CreatePaymentRequest,
    ) -> PaymentResult<PaymentInstrument>;

    async fn cancel_payment(&self, query: &PaymentQuery) -> PaymentResult<()>;

    async fn get_payment_detail(&self, query: &PaymentQuery)
        -> PaymentResult<GatewayPaymentStatus>;

    /// `signature` is the transport-level signature header, if any
    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> PaymentResult<WebhookVerificationResult>;

    fn parse_webhook_event(&self, payload: &[u8]) -> PaymentResult<GatewayWebhookEvent>;
}
