use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub event_date: NaiveDate,
    pub book_count: i32,
    pub cards_per_book: i32,
    pub sale_price: Decimal,
    pub max_commission: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Amount the organisation keeps per card once the seller's maximum
    /// commission is taken out.
    pub fn net_card_value(&self) -> Decimal {
        self.sale_price - self.max_commission
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub name: String,
    pub event_date: NaiveDate,
    pub book_count: i32,
    pub cards_per_book: i32,
    pub sale_price: Decimal,
    pub max_commission: Decimal,
}
