use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;

use super::{Charge, ChargeRequest, GatewayError, PaymentGateway, PaymentStatus};

pub const FAKE_REFERENCE: &str = "24767778610";
pub const FAKE_QR_CODE: &str = "00020126330014br.gov.bcb.pix0111+843272389852040000530398654041.005802BR5908BINGOFAKE6010Parnamirim62240520mpqrinter2476777861063043628";
pub const FAKE_TICKET_URL: &str = "https://www.mercadopago.com.br/payments/24767778610/ticket";

/// Deterministic gateway for local development and tests.
///
/// Charges always come back pending with canned identifiers; status queries
/// answer whatever status is currently scripted (pending by default).
#[derive(Debug)]
pub struct FakeGateway {
    status: Mutex<PaymentStatus>,
    failing: AtomicBool,
    charges: AtomicUsize,
    queries: AtomicUsize,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::with_status(PaymentStatus::Pending)
    }

    pub fn with_status(status: PaymentStatus) -> Self {
        Self {
            status: Mutex::new(status),
            failing: AtomicBool::new(false),
            charges: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
        }
    }

    pub async fn set_status(&self, status: PaymentStatus) {
        *self.status.lock().await = status;
    }

    /// While failing, every call errors as if the processor were unreachable.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn charge_count(&self) -> usize {
        self.charges.load(Ordering::SeqCst)
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), GatewayError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(GatewayError::Transport(
                "fake gateway is set to fail".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_charge(&self, request: &ChargeRequest) -> Result<Charge, GatewayError> {
        self.check_available()?;
        self.charges.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            external_reference = %request.external_reference,
            amount = %request.amount,
            "Fake charge created"
        );
        Ok(Charge {
            status: PaymentStatus::Pending,
            reference: FAKE_REFERENCE.to_string(),
            checkout_url: FAKE_TICKET_URL.to_string(),
            qr_code: Some(FAKE_QR_CODE.to_string()),
        })
    }

    async fn query_status(&self, _reference: &str) -> Result<PaymentStatus, GatewayError> {
        self.check_available()?;
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.status.lock().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Payer;
    use rust_decimal::Decimal;

    fn request() -> ChargeRequest {
        ChargeRequest {
            payer: Payer {
                name: "Maria Silva".to_string(),
                cpf: None,
                email: None,
            },
            amount: Decimal::from(30),
            description: "Card purchase (3)".to_string(),
            external_reference: "ref".to_string(),
        }
    }

    #[tokio::test]
    async fn test_charges_are_pending_with_canned_values() {
        let gateway = FakeGateway::new();
        let charge = gateway.create_charge(&request()).await.unwrap();
        assert_eq!(charge.status, PaymentStatus::Pending);
        assert_eq!(charge.reference, FAKE_REFERENCE);
        assert_eq!(charge.checkout_url, FAKE_TICKET_URL);
        assert_eq!(gateway.charge_count(), 1);
    }

    #[tokio::test]
    async fn test_payments_stay_pending_unless_scripted() {
        let gateway = FakeGateway::new();
        assert_eq!(
            gateway.query_status(FAKE_REFERENCE).await.unwrap(),
            PaymentStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_scripted_status() {
        let gateway = FakeGateway::with_status(PaymentStatus::Pending);
        assert_eq!(
            gateway.query_status(FAKE_REFERENCE).await.unwrap(),
            PaymentStatus::Pending
        );
        gateway.set_status(PaymentStatus::Approved).await;
        assert!(gateway.query_status(FAKE_REFERENCE).await.unwrap().is_approved());
        assert_eq!(gateway.query_count(), 2);
    }

    #[tokio::test]
    async fn test_failing_gateway() {
        let gateway = FakeGateway::new();
        gateway.set_failing(true);
        assert!(matches!(
            gateway.create_charge(&request()).await,
            Err(GatewayError::Transport(_))
        ));
        assert!(gateway.query_status(FAKE_REFERENCE).await.is_err());
        assert_eq!(gateway.charge_count(), 0);
    }
}
