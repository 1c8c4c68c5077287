use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::services::inventory::{book_label, card_label};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Card {
    pub id: Uuid,
    pub book_id: Uuid,
    pub number: i32,
    pub assignee_id: Option<Uuid>,
    pub custody_id: Option<Uuid>,
    pub paid: Option<bool>,
    pub payment_method_id: Option<Uuid>,
    pub commission: Decimal,
}

impl Card {
    /// A card straight out of the generator: nobody responsible, nothing settled.
    pub fn pristine(book_id: Uuid, number: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            book_id,
            number,
            assignee_id: None,
            custody_id: None,
            paid: None,
            payment_method_id: None,
            commission: Decimal::ZERO,
        }
    }

    pub fn label(&self) -> String {
        card_label(self.number)
    }

    pub fn status(&self) -> CardStatus {
        CardStatus::of(self.assignee_id.is_some(), self.paid, self.commission)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    AwaitingDistribution,
    AwaitingSettlement,
    SoldWithCommission,
    SoldWithoutCommission,
    NotPaid,
}

impl CardStatus {
    pub fn of(assigned: bool, paid: Option<bool>, commission: Decimal) -> Self {
        match (assigned, paid) {
            (false, _) => CardStatus::AwaitingDistribution,
            (true, None) => CardStatus::AwaitingSettlement,
            (true, Some(true)) if commission > Decimal::ZERO => CardStatus::SoldWithCommission,
            (true, Some(true)) => CardStatus::SoldWithoutCommission,
            (true, Some(false)) => CardStatus::NotPaid,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CardStatus::AwaitingDistribution => "Awaiting distribution",
            CardStatus::AwaitingSettlement => "Awaiting settlement",
            CardStatus::SoldWithCommission => "Sold with commission",
            CardStatus::SoldWithoutCommission => "Sold without commission",
            CardStatus::NotPaid => "Payment not made",
        }
    }

    pub fn is_paid(&self) -> bool {
        matches!(
            self,
            CardStatus::SoldWithCommission | CardStatus::SoldWithoutCommission
        )
    }
}

/// Card joined with its book and the names of the people involved, as shown
/// in listings and exports.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CardDetail {
    pub id: Uuid,
    pub book_id: Uuid,
    pub book_number: i32,
    pub number: i32,
    pub assignee_id: Option<Uuid>,
    pub assignee_name: Option<String>,
    pub custody_id: Option<Uuid>,
    pub custody_name: Option<String>,
    pub paid: Option<bool>,
    pub payment_method_id: Option<Uuid>,
    pub payment_method_name: Option<String>,
    pub commission: Decimal,
}

impl CardDetail {
    pub fn status(&self) -> CardStatus {
        CardStatus::of(self.assignee_id.is_some(), self.paid, self.commission)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CardView {
    pub id: Uuid,
    pub number: String,
    pub book: String,
    pub assignee: Option<String>,
    pub custody: Option<String>,
    pub paid: Option<bool>,
    pub payment_method: Option<String>,
    pub commission: Decimal,
    pub status: CardStatus,
    pub status_label: &'static str,
}

impl From<CardDetail> for CardView {
    fn from(detail: CardDetail) -> Self {
        let status = detail.status();
        Self {
            id: detail.id,
            number: card_label(detail.number),
            book: book_label(detail.book_number),
            assignee: detail.assignee_name,
            custody: detail.custody_name,
            paid: detail.paid,
            payment_method: detail.payment_method_name,
            commission: detail.commission,
            status,
            status_label: status.label(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CardFilter {
    pub status: Option<CardStatus>,
    pub book: Option<i32>,
}

impl CardFilter {
    pub fn matches(&self, detail: &CardDetail) -> bool {
        self.status.map_or(true, |s| detail.status() == s)
            && self.book.map_or(true, |b| detail.book_number == b)
    }
}
