//! Payment gateway adapters.
//!
//! The purchase flow talks to the processor only through [`PaymentGateway`].
//! Which implementation backs it (Mercado Pago or the fake used for local
//! development) is decided once, when the application state is built.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::utils::error::AppError;

pub mod fake;
pub mod mercadopago;

pub use fake::FakeGateway;
pub use mercadopago::{CheckoutMode, MercadoPagoConfig, MercadoPagoGateway};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PaymentStatus {
    Pending,
    Approved,
    /// Any other status reported by the processor, kept verbatim.
    Other(String),
}

impl PaymentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Other(status) => status,
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, PaymentStatus::Approved)
    }
}

impl From<&str> for PaymentStatus {
    fn from(status: &str) -> Self {
        match status {
            "pending" => PaymentStatus::Pending,
            "approved" => PaymentStatus::Approved,
            other => PaymentStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for PaymentStatus {
    fn from(status: String) -> Self {
        PaymentStatus::from(status.as_str())
    }
}

impl From<PaymentStatus> for String {
    fn from(status: PaymentStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payer {
    pub name: String,
    pub cpf: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    pub payer: Payer,
    pub amount: Decimal,
    pub description: String,
    /// Our own identifier for the charge, echoed back by the processor.
    pub external_reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Charge {
    pub status: PaymentStatus,
    /// Identifier used to poll the processor for this charge.
    pub reference: String,
    pub checkout_url: String,
    pub qr_code: Option<String>,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Payment gateway request timed out")]
    Timeout,

    #[error("Payment gateway unreachable: {0}")]
    Transport(String),

    #[error("Payment gateway returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected payment gateway response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout
        } else if err.is_decode() {
            GatewayError::InvalidResponse(err.to_string())
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        AppError::ExternalServiceError(err.to_string())
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a charge and returns where the buyer should go to pay it.
    async fn create_charge(&self, request: &ChargeRequest) -> Result<Charge, GatewayError>;

    async fn query_status(&self, reference: &str) -> Result<PaymentStatus, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_unknown_values() {
        assert_eq!(PaymentStatus::from("approved"), PaymentStatus::Approved);
        assert_eq!(PaymentStatus::from("pending"), PaymentStatus::Pending);
        let rejected = PaymentStatus::from("rejected");
        assert_eq!(rejected, PaymentStatus::Other("rejected".to_string()));
        assert_eq!(rejected.as_str(), "rejected");
        assert!(!rejected.is_approved());
    }

    #[test]
    fn test_status_serializes_as_plain_string() {
        let json = serde_json::to_string(&PaymentStatus::Approved).unwrap();
        assert_eq!(json, "\"approved\"");
        let parsed: PaymentStatus = serde_json::from_str("\"in_process\"").unwrap();
        assert_eq!(parsed.to_string(), "in_process");
    }

    #[test]
    fn test_gateway_errors_are_external_service_errors() {
        let err: AppError = GatewayError::Timeout.into();
        assert!(matches!(err, AppError::ExternalServiceError(_)));
    }
}
