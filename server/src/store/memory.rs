use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{empty_selection, not_found, Generation, OnlineSale, Store};
use crate::gateway::PaymentStatus;
use crate::models::{
    Book, Card, CardDetail, Event, NewEvent, NewPerson, OnlinePurchase, PaymentMethod, Person,
};
use crate::services::inventory::{self, BookPlan, ONLINE_BOOK_NUMBER};
use crate::services::lifecycle::{self, CardSelection, CardTransition};
use crate::utils::error::AppError;

#[derive(Debug, Default)]
struct State {
    people: HashMap<Uuid, Person>,
    payment_methods: HashMap<Uuid, PaymentMethod>,
    events: HashMap<Uuid, Event>,
    books: HashMap<Uuid, Book>,
    cards: HashMap<Uuid, Card>,
    purchases: HashMap<Uuid, OnlinePurchase>,
    purchase_cards: HashMap<Uuid, Vec<Uuid>>,
    /// Placeholder person owning online cards, once created.
    online_buyer: Option<Uuid>,
}

impl State {
    fn event_books(&self, event_id: Uuid) -> impl Iterator<Item = &Book> {
        self.books.values().filter(move |b| b.event_id == event_id)
    }

    fn book_event(&self, book_id: Uuid) -> Result<&Event, AppError> {
        let book = self.books.get(&book_id).ok_or_else(|| not_found("Book", book_id))?;
        self.events
            .get(&book.event_id)
            .ok_or_else(|| not_found("Event", book.event_id))
    }

    fn detail(&self, card: &Card) -> CardDetail {
        let name = |id: Option<Uuid>| id.and_then(|id| self.people.get(&id)).map(|p| p.name.clone());
        CardDetail {
            id: card.id,
            book_id: card.book_id,
            book_number: self.books.get(&card.book_id).map_or(0, |b| b.number),
            number: card.number,
            assignee_id: card.assignee_id,
            assignee_name: name(card.assignee_id),
            custody_id: card.custody_id,
            custody_name: name(card.custody_id),
            paid: card.paid,
            payment_method_id: card.payment_method_id,
            payment_method_name: card
                .payment_method_id
                .and_then(|id| self.payment_methods.get(&id))
                .map(|m| m.name.clone()),
            commission: card.commission,
        }
    }

    fn sorted_details<'a>(&self, cards: impl Iterator<Item = &'a Card>) -> Vec<CardDetail> {
        let mut details: Vec<CardDetail> = cards.map(|c| self.detail(c)).collect();
        details.sort_by_key(|d| (d.number, d.book_number));
        details
    }

    fn insert_inventory(&mut self, event_id: Uuid, plans: &[BookPlan]) -> Vec<Book> {
        let (books, cards) = inventory::materialize(event_id, plans);
        for book in &books {
            self.books.insert(book.id, book.clone());
        }
        for card in cards {
            self.cards.insert(card.id, card);
        }
        books
    }

    fn online_buyer(&mut self, name: &str) -> Uuid {
        if let Some(id) = self.online_buyer {
            return id;
        }
        let person = Person {
            id: Uuid::new_v4(),
            name: name.to_string(),
            cpf: None,
            phone: None,
            notes: None,
            created_at: Utc::now(),
        };
        let id = person.id;
        self.people.insert(id, person);
        self.online_buyer = Some(id);
        id
    }

    fn payment_method_named(&mut self, name: &str) -> Uuid {
        if let Some(method) = self.payment_methods.values().find(|m| m.name == name) {
            return method.id;
        }
        let method = PaymentMethod {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        let id = method.id;
        self.payment_methods.insert(id, method);
        id
    }

    fn online_book(&mut self, event_id: Uuid) -> Uuid {
        if let Some(book) = self
            .event_books(event_id)
            .find(|b| b.number == ONLINE_BOOK_NUMBER)
        {
            return book.id;
        }
        let book = Book {
            id: Uuid::new_v4(),
            event_id,
            number: ONLINE_BOOK_NUMBER,
        };
        let id = book.id;
        self.books.insert(id, book);
        id
    }
}

/// Store kept entirely in process memory. Used when no database is
/// configured and by the test suite.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_person(&self, person: NewPerson) -> Result<Person, AppError> {
        let person = Person {
            id: Uuid::new_v4(),
            name: person.name,
            cpf: person.cpf,
            phone: person.phone,
            notes: person.notes,
            created_at: Utc::now(),
        };
        self.state
            .lock()
            .await
            .people
            .insert(person.id, person.clone());
        Ok(person)
    }

    async fn get_person(&self, id: Uuid) -> Result<Person, AppError> {
        self.state
            .lock()
            .await
            .people
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("Person", id))
    }

    async fn list_people(&self) -> Result<Vec<Person>, AppError> {
        let mut people: Vec<Person> = self.state.lock().await.people.values().cloned().collect();
        people.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(people)
    }

    async fn person_cards(&self, person_id: Uuid) -> Result<Vec<CardDetail>, AppError> {
        let state = self.state.lock().await;
        Ok(state.sorted_details(state.cards.values().filter(|c| {
            c.assignee_id == Some(person_id) || c.custody_id == Some(person_id)
        })))
    }

    async fn create_payment_method(&self, name: &str) -> Result<PaymentMethod, AppError> {
        let mut state = self.state.lock().await;
        if state.payment_methods.values().any(|m| m.name == name) {
            return Err(AppError::ValidationError(format!(
                "Payment method '{name}' already exists"
            )));
        }
        let id = state.payment_method_named(name);
        Ok(state.payment_methods[&id].clone())
    }

    async fn get_payment_method(&self, id: Uuid) -> Result<PaymentMethod, AppError> {
        self.state
            .lock()
            .await
            .payment_methods
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("Payment method", id))
    }

    async fn list_payment_methods(&self) -> Result<Vec<PaymentMethod>, AppError> {
        let mut methods: Vec<PaymentMethod> = self
            .state
            .lock()
            .await
            .payment_methods
            .values()
            .cloned()
            .collect();
        methods.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(methods)
    }

    async fn create_event(&self, event: NewEvent, plans: &[BookPlan]) -> Result<Event, AppError> {
        let event = Event {
            id: Uuid::new_v4(),
            name: event.name,
            event_date: event.event_date,
            book_count: event.book_count,
            cards_per_book: event.cards_per_book,
            sale_price: event.sale_price,
            max_commission: event.max_commission,
            created_at: Utc::now(),
        };
        let mut state = self.state.lock().await;
        state.events.insert(event.id, event.clone());
        state.insert_inventory(event.id, plans);
        Ok(event)
    }

    async fn get_event(&self, id: Uuid) -> Result<Event, AppError> {
        self.state
            .lock()
            .await
            .events
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("Event", id))
    }

    async fn latest_event(&self) -> Result<Option<Event>, AppError> {
        Ok(self
            .state
            .lock()
            .await
            .events
            .values()
            .max_by_key(|e| (e.event_date, e.created_at))
            .cloned())
    }

    async fn list_events(&self) -> Result<Vec<Event>, AppError> {
        let mut events: Vec<Event> = self.state.lock().await.events.values().cloned().collect();
        events.sort_by_key(|e| std::cmp::Reverse((e.event_date, e.created_at)));
        Ok(events)
    }

    async fn list_books(&self, event_id: Uuid) -> Result<Vec<Book>, AppError> {
        let mut books: Vec<Book> = self
            .state
            .lock()
            .await
            .event_books(event_id)
            .cloned()
            .collect();
        books.sort_by_key(|b| b.number);
        Ok(books)
    }

    async fn add_books(
        &self,
        event_id: Uuid,
        book_count: i32,
        generation: Generation,
    ) -> Result<Vec<Book>, AppError> {
        let mut state = self.state.lock().await;
        let event = state
            .events
            .get(&event_id)
            .cloned()
            .ok_or_else(|| not_found("Event", event_id))?;

        let physical: Vec<Uuid> = state
            .event_books(event_id)
            .filter(|b| !b.is_online())
            .map(|b| b.id)
            .collect();
        if generation == Generation::Initial && !physical.is_empty() {
            return Err(AppError::InvalidState(format!(
                "Event '{}' already has its inventory",
                event.name
            )));
        }
        let max_book = physical
            .iter()
            .filter_map(|id| state.books.get(id))
            .map(|b| b.number)
            .max();
        let max_card = state
            .cards
            .values()
            .filter(|c| physical.contains(&c.book_id))
            .map(|c| c.number)
            .max();

        let (start_book, start_card) = inventory::next_physical_start(max_book, max_card);
        let plans =
            inventory::plan_books(event.cards_per_book, start_book, start_card, book_count)?;
        Ok(state.insert_inventory(event_id, &plans))
    }

    async fn get_card(&self, id: Uuid) -> Result<Card, AppError> {
        self.state
            .lock()
            .await
            .cards
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("Card", id))
    }

    async fn card_detail(&self, id: Uuid) -> Result<CardDetail, AppError> {
        let state = self.state.lock().await;
        state
            .cards
            .get(&id)
            .map(|c| state.detail(c))
            .ok_or_else(|| not_found("Card", id))
    }

    async fn list_cards(&self, event_id: Uuid) -> Result<Vec<CardDetail>, AppError> {
        let state = self.state.lock().await;
        if !state.events.contains_key(&event_id) {
            return Err(not_found("Event", event_id));
        }
        Ok(state.sorted_details(state.cards.values().filter(|c| {
            state
                .books
                .get(&c.book_id)
                .is_some_and(|b| b.event_id == event_id)
        })))
    }

    async fn update_cards(
        &self,
        selection: CardSelection,
        transition: &CardTransition,
    ) -> Result<Vec<Card>, AppError> {
        let mut state = self.state.lock().await;

        let (event, mut cards) = match selection {
            CardSelection::Card(id) => {
                let card = state.cards.get(&id).ok_or_else(|| not_found("Card", id))?;
                (state.book_event(card.book_id)?.clone(), vec![card.clone()])
            }
            CardSelection::Book(book_id) => {
                let event = state.book_event(book_id)?.clone();
                let cards = state
                    .cards
                    .values()
                    .filter(|c| c.book_id == book_id)
                    .cloned()
                    .collect();
                (event, cards)
            }
            CardSelection::Range {
                event_id,
                first,
                last,
            } => {
                let event = state
                    .events
                    .get(&event_id)
                    .cloned()
                    .ok_or_else(|| not_found("Event", event_id))?;
                let cards = state
                    .cards
                    .values()
                    .filter(|c| (first..=last).contains(&c.number))
                    .filter(|c| {
                        state
                            .books
                            .get(&c.book_id)
                            .is_some_and(|b| b.event_id == event_id && !b.is_online())
                    })
                    .cloned()
                    .collect();
                (event, cards)
            }
        };
        if cards.is_empty() {
            return Err(empty_selection(&selection));
        }
        cards.sort_by_key(|c| c.number);

        let updated = lifecycle::apply_batch(transition, &cards, event.max_commission)?;
        for card in &updated {
            state.cards.insert(card.id, card.clone());
        }
        Ok(updated)
    }

    async fn insert_purchase(&self, purchase: &OnlinePurchase) -> Result<(), AppError> {
        self.state
            .lock()
            .await
            .purchases
            .insert(purchase.id, purchase.clone());
        Ok(())
    }

    async fn get_purchase(&self, id: Uuid) -> Result<OnlinePurchase, AppError> {
        self.state
            .lock()
            .await
            .purchases
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("Purchase", id))
    }

    async fn purchases_by_cpf(&self, cpf: &str) -> Result<Vec<OnlinePurchase>, AppError> {
        let mut purchases: Vec<OnlinePurchase> = self
            .state
            .lock()
            .await
            .purchases
            .values()
            .filter(|p| p.cpf.as_deref() == Some(cpf))
            .cloned()
            .collect();
        purchases.sort_by_key(|p| std::cmp::Reverse(p.created_at));
        Ok(purchases)
    }

    async fn purchase_cards(&self, purchase_id: Uuid) -> Result<Vec<Card>, AppError> {
        let state = self.state.lock().await;
        let mut cards: Vec<Card> = state
            .purchase_cards
            .get(&purchase_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.cards.get(id))
            .cloned()
            .collect();
        cards.sort_by_key(|c| c.number);
        Ok(cards)
    }

    async fn update_purchase_status(
        &self,
        purchase_id: Uuid,
        status: &PaymentStatus,
    ) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        let purchase = state
            .purchases
            .get_mut(&purchase_id)
            .ok_or_else(|| not_found("Purchase", purchase_id))?;
        if !purchase.is_confirmed() {
            purchase.status = status.to_string();
        }
        Ok(())
    }

    async fn approve_purchase(
        &self,
        purchase_id: Uuid,
        sale: &OnlineSale,
    ) -> Result<Option<Vec<Card>>, AppError> {
        let mut state = self.state.lock().await;
        let (event_id, card_count) = state
            .purchases
            .get(&purchase_id)
            .map(|p| (p.event_id, p.card_count))
            .ok_or_else(|| not_found("Purchase", purchase_id))?;

        let linked = state
            .purchase_cards
            .get(&purchase_id)
            .is_some_and(|cards| !cards.is_empty());
        let cards = if linked {
            None
        } else {
            let book_id = state.online_book(event_id);
            let existing = state.cards.values().filter(|c| c.book_id == book_id).count();
            let existing = i32::try_from(existing)
                .map_err(|_| AppError::InternalServerError("Online book is full".to_string()))?;
            let numbers = inventory::plan_online(existing, card_count)?;
            let buyer_id = state.online_buyer(&sale.buyer_name);
            let method_id = state.payment_method_named(&sale.payment_method_name);

            let cards: Vec<Card> = numbers
                .into_iter()
                .map(|number| {
                    lifecycle::mark_sold_online(&Card::pristine(book_id, number), buyer_id, method_id)
                })
                .collect();
            for card in &cards {
                state.cards.insert(card.id, card.clone());
            }
            state
                .purchase_cards
                .insert(purchase_id, cards.iter().map(|c| c.id).collect());
            Some(cards)
        };

        if let Some(purchase) = state.purchases.get_mut(&purchase_id) {
            purchase.status = PaymentStatus::Approved.to_string();
        }
        Ok(cards)
    }
}
