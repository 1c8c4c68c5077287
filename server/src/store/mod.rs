//! Persistence.
//!
//! Every method that changes more than one row runs as a single unit: the
//! PostgreSQL store wraps it in a transaction with the affected rows locked,
//! the in-memory store holds its state lock for the whole operation.

use async_trait::async_trait;
use uuid::Uuid;

use crate::gateway::PaymentStatus;
use crate::models::{
    Book, Card, CardDetail, Event, NewEvent, NewPerson, OnlinePurchase, PaymentMethod, Person,
};
use crate::services::inventory::BookPlan;
use crate::services::lifecycle::{CardSelection, CardTransition};
use crate::utils::error::AppError;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// How new physical books relate to the ones an event already has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    /// First inventory of an event; refused if it already has books.
    Initial,
    /// More books after the last physical book and card.
    Continue,
}

/// Marks the one person row that owns cards sold online. Operators cannot
/// create a person carrying it, so a namesake is never mistaken for it.
pub const ONLINE_BUYER_KEY: &str = "online_buyer";

/// Online sale settings: who ends up owning cards sold online and how many
/// one purchase may take.
#[derive(Debug, Clone)]
pub struct OnlineSale {
    /// Display name given to the placeholder buyer when it is first created.
    pub buyer_name: String,
    pub payment_method_name: String,
    /// Most cards one online purchase may ask for.
    pub max_cards: i32,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn create_person(&self, person: NewPerson) -> Result<Person, AppError>;
    async fn get_person(&self, id: Uuid) -> Result<Person, AppError>;
    async fn list_people(&self) -> Result<Vec<Person>, AppError>;
    /// Cards the person is responsible for or physically holds.
    async fn person_cards(&self, person_id: Uuid) -> Result<Vec<CardDetail>, AppError>;

    async fn create_payment_method(&self, name: &str) -> Result<PaymentMethod, AppError>;
    async fn get_payment_method(&self, id: Uuid) -> Result<PaymentMethod, AppError>;
    async fn list_payment_methods(&self) -> Result<Vec<PaymentMethod>, AppError>;

    /// Stores the event together with the books and cards laid out in `plans`.
    async fn create_event(&self, event: NewEvent, plans: &[BookPlan]) -> Result<Event, AppError>;
    async fn get_event(&self, id: Uuid) -> Result<Event, AppError>;
    /// Most recent event by date.
    async fn latest_event(&self) -> Result<Option<Event>, AppError>;
    async fn list_events(&self) -> Result<Vec<Event>, AppError>;
    async fn list_books(&self, event_id: Uuid) -> Result<Vec<Book>, AppError>;
    async fn add_books(
        &self,
        event_id: Uuid,
        book_count: i32,
        generation: Generation,
    ) -> Result<Vec<Book>, AppError>;

    async fn get_card(&self, id: Uuid) -> Result<Card, AppError>;
    async fn card_detail(&self, id: Uuid) -> Result<CardDetail, AppError>;
    /// All cards of an event ordered by card number, then book number.
    async fn list_cards(&self, event_id: Uuid) -> Result<Vec<CardDetail>, AppError>;
    /// Applies `transition` to every selected card, or to none of them.
    async fn update_cards(
        &self,
        selection: CardSelection,
        transition: &CardTransition,
    ) -> Result<Vec<Card>, AppError>;

    async fn insert_purchase(&self, purchase: &OnlinePurchase) -> Result<(), AppError>;
    async fn get_purchase(&self, id: Uuid) -> Result<OnlinePurchase, AppError>;
    async fn purchases_by_cpf(&self, cpf: &str) -> Result<Vec<OnlinePurchase>, AppError>;
    async fn purchase_cards(&self, purchase_id: Uuid) -> Result<Vec<Card>, AppError>;
    /// Records a non-approved status. Approved purchases are left untouched.
    async fn update_purchase_status(
        &self,
        purchase_id: Uuid,
        status: &PaymentStatus,
    ) -> Result<(), AppError>;
    /// Marks the purchase approved and, unless it already has cards, allocates
    /// its cards in the event's online book and marks them sold. Returns the
    /// new cards, or `None` when the purchase already had its cards.
    async fn approve_purchase(
        &self,
        purchase_id: Uuid,
        sale: &OnlineSale,
    ) -> Result<Option<Vec<Card>>, AppError>;
}

fn not_found(kind: &str, id: Uuid) -> AppError {
    AppError::NotFound(format!("{kind} with id '{id}' was not found"))
}

fn empty_selection(selection: &CardSelection) -> AppError {
    match selection {
        CardSelection::Card(id) => not_found("Card", *id),
        CardSelection::Book(id) => not_found("Book", *id),
        CardSelection::Range { first, last, .. } => {
            AppError::NotFound(format!("No cards numbered {first}..{last}"))
        }
    }
}
