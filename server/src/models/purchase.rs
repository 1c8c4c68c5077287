use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::gateway::PaymentStatus;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OnlinePurchase {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub cpf: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub card_count: i32,
    pub amount: Decimal,
    pub gateway_reference: String,
    pub status: String,
    pub qr_code: Option<String>,
    pub checkout_url: String,
    pub created_at: DateTime<Utc>,
}

impl OnlinePurchase {
    pub fn payment_status(&self) -> PaymentStatus {
        PaymentStatus::from(self.status.as_str())
    }

    pub fn is_confirmed(&self) -> bool {
        self.payment_status().is_approved()
    }

    pub fn status_label(&self) -> &'static str {
        if self.is_confirmed() {
            "Confirmed"
        } else {
            "Pending"
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuyerInfo {
    pub name: String,
    pub cpf: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}
