pub mod book;
pub mod card;
pub mod event;
pub mod person;
pub mod purchase;

pub use book::Book;
pub use card::{Card, CardDetail, CardFilter, CardStatus, CardView};
pub use event::{Event, NewEvent};
pub use person::{NewPerson, PaymentMethod, Person};
pub use purchase::{BuyerInfo, OnlinePurchase};

use rust_decimal::Decimal;

/// Largest amount a `NUMERIC(9, 2)` money column holds.
pub fn max_money() -> Decimal {
    Decimal::new(999_999_999, 2)
}
