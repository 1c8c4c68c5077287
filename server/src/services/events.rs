//! Event setup and inventory actions.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

use crate::models::{max_money, Book, Event, NewEvent};
use crate::services::inventory;
use crate::services::permissions::{authorize, Action, Roles, Subject};
use crate::services::report::{self, EventSummary, StatusCounts};
use crate::store::{Generation, Store};
use crate::utils::error::AppError;

#[derive(Debug, Serialize)]
pub struct EventOverview {
    #[serde(flatten)]
    pub event: Event,
    pub summary: EventSummary,
    pub sellers: BTreeMap<String, StatusCounts>,
}

fn validate(event: &NewEvent) -> Result<(), AppError> {
    if event.name.trim().is_empty() {
        return Err(AppError::ValidationError("Event name is required".to_string()));
    }
    if event.sale_price <= Decimal::ZERO {
        return Err(AppError::ValidationError(
            "Sale price must be greater than zero".to_string(),
        ));
    }
    if event.sale_price > max_money() {
        return Err(AppError::ValidationError(format!(
            "Sale price cannot exceed {}",
            max_money()
        )));
    }
    if event.max_commission < Decimal::ZERO || event.max_commission > event.sale_price {
        return Err(AppError::ValidationError(
            "Max commission must be between zero and the sale price".to_string(),
        ));
    }
    if event.cards_per_book <= 0 || event.book_count < 0 {
        return Err(AppError::ValidationError(
            "Books need a positive card count and a non-negative book count".to_string(),
        ));
    }
    inventory::check_generation_size(
        i64::from(event.book_count) * i64::from(event.cards_per_book),
    )
}

/// Creates the event with its first `book_count` books, numbered from book 1
/// and card 1.
pub async fn create_event(
    store: &dyn Store,
    roles: &Roles,
    event: NewEvent,
) -> Result<Event, AppError> {
    authorize(Action::CreateEvent, Subject::Nothing, roles)?;
    validate(&event)?;

    let plans = inventory::plan_books(event.cards_per_book, 1, 1, event.book_count)?;
    let event = store.create_event(event, &plans).await?;
    info!(
        event_id = %event.id,
        name = %event.name,
        books = plans.len(),
        "Event created"
    );
    Ok(event)
}

/// Generates the initial inventory of an event created without books.
/// `book_count` defaults to the event's own book count.
pub async fn generate_inventory(
    store: &dyn Store,
    roles: &Roles,
    event_id: Uuid,
    book_count: Option<i32>,
) -> Result<Vec<Book>, AppError> {
    let event = store.get_event(event_id).await?;
    let has_books = store
        .list_books(event_id)
        .await?
        .iter()
        .any(|b| !b.is_online());
    authorize(Action::GenerateInventory, Subject::Event { has_books }, roles)?;

    let count = book_count.unwrap_or(event.book_count);
    if count <= 0 {
        return Err(AppError::ValidationError(
            "At least one book must be generated".to_string(),
        ));
    }
    inventory::check_generation_size(i64::from(count) * i64::from(event.cards_per_book))?;
    let books = store.add_books(event_id, count, Generation::Initial).await?;
    info!(event_id = %event_id, books = books.len(), "Initial inventory generated");
    Ok(books)
}

/// Appends `book_count` books after the event's last physical book and card.
pub async fn generate_more_books(
    store: &dyn Store,
    roles: &Roles,
    event_id: Uuid,
    book_count: i32,
) -> Result<Vec<Book>, AppError> {
    authorize(Action::GenerateMoreBooks, Subject::Nothing, roles)?;
    if book_count <= 0 {
        return Err(AppError::ValidationError(
            "At least one book must be generated".to_string(),
        ));
    }
    let event = store.get_event(event_id).await?;
    inventory::check_generation_size(i64::from(book_count) * i64::from(event.cards_per_book))?;
    let books = store.add_books(event_id, book_count, Generation::Continue).await?;
    info!(
        event_id = %event_id,
        books = books.len(),
        first = ?books.first().map(Book::label),
        "More books generated"
    );
    Ok(books)
}

pub async fn event_overview(store: &dyn Store, event_id: Uuid) -> Result<EventOverview, AppError> {
    let event = store.get_event(event_id).await?;
    let cards = store.list_cards(event_id).await?;
    Ok(EventOverview {
        summary: report::summarize(&event, &cards),
        sellers: report::by_assignee(&cards),
        event,
    })
}
