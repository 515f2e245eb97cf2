use crate::config::{QrGatewayConfig, VaGatewayConfig};
use crate::models::{GatewayClass, PaymentMethod};
use crate::payments::error::PaymentResult;
use crate::payments::provider::PaymentGateway;
use crate::payments::providers::{PakasirGateway, QrispwGateway};
use crate::payments::types::GatewayName;
use std::str::FromStr;
use std::sync::Arc;

/// Routes payment methods and webhook sources to their gateway adapter
#[derive(Clone)]
pub struct GatewayRegistry {
    qr: Arc<dyn PaymentGateway>,
    virtual_account: Arc<dyn PaymentGateway>,
}

impl GatewayRegistry {
    pub fn new(qr: Arc<dyn PaymentGateway>, virtual_account: Arc<dyn PaymentGateway>) -> Self {
        Self {
            qr,
            virtual_account,
        }
    }

    pub fn from_config(qr: &QrGatewayConfig, va: &VaGatewayConfig) -> PaymentResult<Self> {
        Ok(Self::new(
            Arc::new(QrispwGateway::new(qr.clone())?),
            Arc::new(PakasirGateway::new(va.clone())?),
        ))
    }

    pub fn for_method(&self, method: PaymentMethod) -> Arc<dyn PaymentGateway> {
        match method.gateway_class() {
            GatewayClass::Qr => self.qr.clone(),
            GatewayClass::VirtualAccount => self.virtual_account.clone(),
        }
    }

    pub fn by_name(&self, name: &str) -> PaymentResult<Arc<dyn PaymentGateway>> {
        let gateway = match GatewayName::from_str(name)? {
            GatewayName::Qrispw => self.qr.clone(),
            GatewayName::Pakasir => self.virtual_account.clone(),
        };
        Ok(gateway)
    }
}
