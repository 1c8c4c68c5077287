#![allow(dead_code)]

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;

use bingo_server::gateway::{FakeGateway, PaymentStatus};
use bingo_server::models::{Event, NewEvent, NewPerson, Person};
use bingo_server::services::events;
use bingo_server::services::permissions::{Role, Roles};
use bingo_server::services::purchase::PurchaseService;
use bingo_server::store::{InMemoryStore, OnlineSale, Store};

pub fn admin() -> Roles {
    Roles::new([Role::Admin])
}

pub fn operator() -> Roles {
    Roles::new([Role::Operator])
}

pub fn online_sale() -> OnlineSale {
    OnlineSale {
        buyer_name: "Online Purchase".to_string(),
        payment_method_name: "Gateway".to_string(),
        max_cards: 100,
    }
}

/// 2 books of 3 cards, price 10, max commission 2.
pub fn festa_junina() -> NewEvent {
    NewEvent {
        name: "Festa Junina".to_string(),
        event_date: NaiveDate::from_ymd_opt(2024, 6, 24).unwrap(),
        book_count: 2,
        cards_per_book: 3,
        sale_price: Decimal::from(10),
        max_commission: Decimal::from(2),
    }
}

pub async fn seed_event(store: &InMemoryStore) -> Event {
    events::create_event(store, &admin(), festa_junina())
        .await
        .unwrap()
}

pub async fn seed_person(store: &InMemoryStore, name: &str) -> Person {
    store
        .create_person(NewPerson {
            name: name.to_string(),
            cpf: None,
            phone: None,
            notes: None,
        })
        .await
        .unwrap()
}

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub gateway: Arc<FakeGateway>,
    pub purchases: PurchaseService,
}

pub fn harness(status: PaymentStatus) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let gateway = Arc::new(FakeGateway::with_status(status));
    let purchases = PurchaseService::new(store.clone(), gateway.clone(), online_sale());
    Harness {
        store,
        gateway,
        purchases,
    }
}
