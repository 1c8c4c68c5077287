//! Online purchases.
//!
//! A purchase opens a charge with the payment gateway and stays pending until
//! a refresh sees the processor report it approved. Only then are its cards
//! allocated in the event's online book, so an abandoned checkout never holds
//! inventory.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::gateway::{ChargeRequest, Payer, PaymentGateway};
use crate::models::{max_money, BuyerInfo, OnlinePurchase};
use crate::services::inventory::card_label;
use crate::services::permissions::{authorize, Action, Roles, Subject};
use crate::store::{OnlineSale, Store};
use crate::utils::error::AppError;

/// Seconds between reloads suggested to a buyer waiting on a pending payment.
pub const AUTORELOAD_SECS: u64 = 30;

#[derive(Debug, Serialize)]
pub struct PurchaseView {
    #[serde(flatten)]
    pub purchase: OnlinePurchase,
    pub status_label: &'static str,
    pub cards: Vec<String>,
    pub autoreload: Option<u64>,
}

#[derive(Clone)]
pub struct PurchaseService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    sale: OnlineSale,
}

impl PurchaseService {
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn PaymentGateway>, sale: OnlineSale) -> Self {
        Self {
            store,
            gateway,
            sale,
        }
    }

    /// Opens a charge for `card_count` cards of the most recent event and
    /// records the purchase. Nothing is stored if the gateway call fails.
    pub async fn create(
        &self,
        buyer: BuyerInfo,
        card_count: i32,
    ) -> Result<OnlinePurchase, AppError> {
        if card_count < 1 {
            return Err(AppError::ValidationError(
                "At least one card must be purchased".to_string(),
            ));
        }
        if card_count > self.sale.max_cards {
            return Err(AppError::ValidationError(format!(
                "At most {} cards can be bought at once",
                self.sale.max_cards
            )));
        }
        let name = buyer.name.trim();
        if name.is_empty() {
            return Err(AppError::ValidationError("Buyer name is required".to_string()));
        }
        let event = self
            .store
            .latest_event()
            .await?
            .ok_or_else(|| AppError::NotFound("No event is open for sale".to_string()))?;

        let id = Uuid::new_v4();
        let amount = Decimal::from(card_count)
            .checked_mul(event.sale_price)
            .filter(|amount| *amount <= max_money())
            .ok_or_else(|| {
                AppError::ValidationError("Purchase amount is too large".to_string())
            })?;
        let charge = self
            .gateway
            .create_charge(&ChargeRequest {
                payer: Payer {
                    name: name.to_string(),
                    cpf: buyer.cpf.clone(),
                    email: buyer.email.clone(),
                },
                amount,
                description: format!("Card purchase ({card_count})"),
                external_reference: id.to_string(),
            })
            .await?;

        let purchase = OnlinePurchase {
            id,
            event_id: event.id,
            name: name.to_string(),
            cpf: buyer.cpf,
            phone: buyer.phone,
            email: buyer.email,
            card_count,
            amount,
            gateway_reference: charge.reference,
            status: charge.status.to_string(),
            qr_code: charge.qr_code,
            checkout_url: charge.checkout_url,
            created_at: Utc::now(),
        };
        self.store.insert_purchase(&purchase).await?;
        info!(
            purchase_id = %purchase.id,
            event_id = %event.id,
            cards = card_count,
            amount = %amount,
            "Purchase created"
        );
        Ok(purchase)
    }

    /// Asks the gateway for the current status. On approval the purchase's
    /// cards are allocated and marked sold; an approved purchase is left as is.
    pub async fn refresh_status(&self, purchase_id: Uuid) -> Result<OnlinePurchase, AppError> {
        let purchase = self.store.get_purchase(purchase_id).await?;
        if purchase.is_confirmed() {
            return Ok(purchase);
        }

        let status = self.gateway.query_status(&purchase.gateway_reference).await?;
        if status.is_approved() {
            if let Some(cards) = self.store.approve_purchase(purchase_id, &self.sale).await? {
                info!(
                    purchase_id = %purchase_id,
                    cards = cards.len(),
                    "Purchase approved, cards allocated"
                );
            }
        } else if status != purchase.payment_status() {
            self.store.update_purchase_status(purchase_id, &status).await?;
            info!(purchase_id = %purchase_id, status = %status, "Purchase status changed");
        }
        self.store.get_purchase(purchase_id).await
    }

    /// Explicit refresh requested by the buyer; only offered while pending.
    pub async fn request_refresh(
        &self,
        purchase_id: Uuid,
        roles: &Roles,
    ) -> Result<OnlinePurchase, AppError> {
        let purchase = self.store.get_purchase(purchase_id).await?;
        authorize(Action::RefreshPurchase, Subject::Purchase(&purchase), roles)?;
        self.refresh_status(purchase_id).await
    }

    /// Purchase page: refreshes first, falling back to the stored status when
    /// the gateway is unavailable.
    pub async fn view(&self, purchase_id: Uuid) -> Result<PurchaseView, AppError> {
        let purchase = match self.refresh_status(purchase_id).await {
            Ok(purchase) => purchase,
            Err(AppError::ExternalServiceError(reason)) => {
                warn!(purchase_id = %purchase_id, %reason, "Status refresh failed");
                self.store.get_purchase(purchase_id).await?
            }
            Err(e) => return Err(e),
        };
        let cards = self
            .store
            .purchase_cards(purchase_id)
            .await?
            .iter()
            .map(|c| card_label(c.number))
            .collect();
        Ok(PurchaseView {
            status_label: purchase.status_label(),
            autoreload: (!purchase.is_confirmed()).then_some(AUTORELOAD_SECS),
            cards,
            purchase,
        })
    }

    pub async fn lookup(&self, cpf: &str) -> Result<Vec<OnlinePurchase>, AppError> {
        let cpf = cpf.trim();
        if cpf.is_empty() {
            return Err(AppError::ValidationError("CPF is required".to_string()));
        }
        self.store.purchases_by_cpf(cpf).await
    }

    /// Where to send the buyer to pay, while the purchase is still pending.
    pub async fn checkout_url(&self, purchase_id: Uuid, roles: &Roles) -> Result<String, AppError> {
        let purchase = self.store.get_purchase(purchase_id).await?;
        authorize(Action::PayPurchase, Subject::Purchase(&purchase), roles)?;
        Ok(purchase.checkout_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{FakeGateway, PaymentStatus};
    use crate::models::NewEvent;
    use crate::services::inventory::plan_books;
    use crate::store::InMemoryStore;
    use chrono::NaiveDate;

    fn sale() -> OnlineSale {
        OnlineSale {
            buyer_name: "Online Purchase".to_string(),
            payment_method_name: "Gateway".to_string(),
            max_cards: 100,
        }
    }

    fn buyer() -> BuyerInfo {
        BuyerInfo {
            name: "Maria Silva".to_string(),
            cpf: Some("123.456.789-09".to_string()),
            phone: None,
            email: None,
        }
    }

    async fn setup(status: PaymentStatus) -> (PurchaseService, Arc<InMemoryStore>, Arc<FakeGateway>) {
        let store = Arc::new(InMemoryStore::new());
        let event = NewEvent {
            name: "Quermesse".to_string(),
            event_date: NaiveDate::from_ymd_opt(2024, 7, 20).unwrap(),
            book_count: 1,
            cards_per_book: 5,
            sale_price: Decimal::from(10),
            max_commission: Decimal::from(2),
        };
        let plans = plan_books(5, 1, 1, 1).unwrap();
        store.create_event(event, &plans).await.unwrap();
        let gateway = Arc::new(FakeGateway::with_status(status));
        let service = PurchaseService::new(store.clone(), gateway.clone(), sale());
        (service, store, gateway)
    }

    #[tokio::test]
    async fn test_create_computes_amount_and_stores_charge() {
        let (service, store, _) = setup(PaymentStatus::Pending).await;
        let purchase = service.create(buyer(), 3).await.unwrap();

        assert_eq!(purchase.amount, Decimal::from(30));
        assert_eq!(purchase.status, "pending");
        assert_eq!(purchase.gateway_reference, crate::gateway::fake::FAKE_REFERENCE);
        assert_eq!(store.get_purchase(purchase.id).await.unwrap().card_count, 3);
    }

    #[tokio::test]
    async fn test_create_requires_an_event() {
        let store = Arc::new(InMemoryStore::new());
        let service = PurchaseService::new(store, Arc::new(FakeGateway::new()), sale());
        assert!(matches!(
            service.create(buyer(), 1).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let (service, _, gateway) = setup(PaymentStatus::Pending).await;
        assert!(matches!(
            service.create(buyer(), 0).await,
            Err(AppError::ValidationError(_))
        ));
        let nameless = BuyerInfo {
            name: "  ".to_string(),
            ..buyer()
        };
        assert!(matches!(
            service.create(nameless, 1).await,
            Err(AppError::ValidationError(_))
        ));
        assert_eq!(gateway.charge_count(), 0);
    }

    #[tokio::test]
    async fn test_create_caps_card_count_before_charging() {
        let (service, store, gateway) = setup(PaymentStatus::Pending).await;
        for count in [101, i32::MAX] {
            assert!(matches!(
                service.create(buyer(), count).await,
                Err(AppError::ValidationError(_))
            ));
        }
        assert_eq!(gateway.charge_count(), 0);
        assert!(store.purchases_by_cpf("123.456.789-09").await.unwrap().is_empty());

        let purchase = service.create(buyer(), 100).await.unwrap();
        assert_eq!(purchase.amount, Decimal::from(1000));
    }

    #[tokio::test]
    async fn test_create_rejects_amount_beyond_money_column() {
        let store = Arc::new(InMemoryStore::new());
        let event = NewEvent {
            name: "Leilao".to_string(),
            event_date: NaiveDate::from_ymd_opt(2024, 8, 1).unwrap(),
            book_count: 1,
            cards_per_book: 1,
            sale_price: Decimal::new(500_000_000, 2),
            max_commission: Decimal::ZERO,
        };
        store
            .create_event(event, &plan_books(1, 1, 1, 1).unwrap())
            .await
            .unwrap();
        let gateway = Arc::new(FakeGateway::new());
        let service = PurchaseService::new(store, gateway.clone(), sale());

        assert!(service.create(buyer(), 1).await.is_ok());
        assert!(matches!(
            service.create(buyer(), 2).await,
            Err(AppError::ValidationError(_))
        ));
        assert_eq!(gateway.charge_count(), 1);
    }

    #[tokio::test]
    async fn test_pending_refresh_keeps_cards_unallocated() {
        let (service, store, _) = setup(PaymentStatus::Pending).await;
        let purchase = service.create(buyer(), 2).await.unwrap();
        let refreshed = service.refresh_status(purchase.id).await.unwrap();
        assert!(!refreshed.is_confirmed());
        assert!(store.purchase_cards(purchase.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_statuses_are_recorded() {
        let (service, _, gateway) = setup(PaymentStatus::Pending).await;
        let purchase = service.create(buyer(), 1).await.unwrap();
        gateway
            .set_status(PaymentStatus::Other("rejected".to_string()))
            .await;
        let refreshed = service.refresh_status(purchase.id).await.unwrap();
        assert_eq!(refreshed.status, "rejected");
        assert_eq!(refreshed.status_label(), "Pending");
    }

    #[tokio::test]
    async fn test_view_falls_back_when_gateway_is_down() {
        let (service, _, gateway) = setup(PaymentStatus::Pending).await;
        let purchase = service.create(buyer(), 1).await.unwrap();
        gateway.set_failing(true);

        let view = service.view(purchase.id).await.unwrap();
        assert_eq!(view.status_label, "Pending");
        assert_eq!(view.autoreload, Some(AUTORELOAD_SECS));
        assert!(view.cards.is_empty());
        assert!(matches!(
            service.refresh_status(purchase.id).await,
            Err(AppError::ExternalServiceError(_))
        ));
    }

    #[tokio::test]
    async fn test_pay_and_refresh_closed_once_confirmed() {
        let (service, _, gateway) = setup(PaymentStatus::Pending).await;
        let purchase = service.create(buyer(), 1).await.unwrap();
        let anyone = Roles::anonymous();

        assert!(service.checkout_url(purchase.id, &anyone).await.is_ok());
        gateway.set_status(PaymentStatus::Approved).await;
        service.request_refresh(purchase.id, &anyone).await.unwrap();

        assert!(matches!(
            service.checkout_url(purchase.id, &anyone).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            service.request_refresh(purchase.id, &anyone).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_lookup_by_cpf() {
        let (service, _, _) = setup(PaymentStatus::Pending).await;
        service.create(buyer(), 1).await.unwrap();
        service.create(buyer(), 2).await.unwrap();
        assert_eq!(service.lookup("123.456.789-09").await.unwrap().len(), 2);
        assert!(service.lookup("000.000.000-00").await.unwrap().is_empty());
        assert!(service.lookup(" ").await.is_err());
    }
}
