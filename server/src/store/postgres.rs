use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder, Transaction};
use tracing::info;
use uuid::Uuid;

use super::{empty_selection, not_found, Generation, OnlineSale, Store, ONLINE_BUYER_KEY};
use crate::gateway::PaymentStatus;
use crate::models::{
    Book, Card, CardDetail, Event, NewEvent, NewPerson, OnlinePurchase, PaymentMethod, Person,
};
use crate::services::inventory::{self, BookPlan, ONLINE_BOOK_NUMBER};
use crate::services::lifecycle::{self, CardSelection, CardTransition};
use crate::utils::error::AppError;

/// Rows per multi-row INSERT, well under PostgreSQL's bind parameter limit.
const INSERT_CHUNK: usize = 1000;

const CARD_DETAIL_SELECT: &str = r#"
    SELECT c.id, c.book_id, b.number AS book_number, c.number,
           c.assignee_id, a.name AS assignee_name,
           c.custody_id, k.name AS custody_name,
           c.paid, c.payment_method_id, m.name AS payment_method_name,
           c.commission
    FROM cards c
    JOIN books b ON b.id = c.book_id
    LEFT JOIN people a ON a.id = c.assignee_id
    LEFT JOIN people k ON k.id = c.custody_id
    LEFT JOIN payment_methods m ON m.id = c.payment_method_id
"#;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!("Successfully connected to database");
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!()
            .run(&self.pool)
            .await
            .map_err(|e| AppError::InternalServerError(format!("Migration failed: {e}")))?;
        info!("Migrations run successfully");
        Ok(())
    }

    async fn insert_inventory(
        tx: &mut Transaction<'_, Postgres>,
        event_id: Uuid,
        plans: &[BookPlan],
    ) -> Result<Vec<Book>, AppError> {
        let (books, cards) = inventory::materialize(event_id, plans);
        for chunk in books.chunks(INSERT_CHUNK) {
            let mut query = QueryBuilder::<Postgres>::new("INSERT INTO books (id, event_id, number) ");
            query.push_values(chunk, |mut row, book| {
                row.push_bind(book.id)
                    .push_bind(book.event_id)
                    .push_bind(book.number);
            });
            query.build().execute(&mut **tx).await?;
        }
        Self::insert_cards(tx, &cards).await?;
        Ok(books)
    }

    async fn insert_cards(tx: &mut Transaction<'_, Postgres>, cards: &[Card]) -> Result<(), AppError> {
        for chunk in cards.chunks(INSERT_CHUNK) {
            let mut query = QueryBuilder::<Postgres>::new(
                "INSERT INTO cards (id, book_id, number, assignee_id, custody_id, paid, payment_method_id, commission) ",
            );
            query.push_values(chunk, |mut row, card| {
                row.push_bind(card.id)
                    .push_bind(card.book_id)
                    .push_bind(card.number)
                    .push_bind(card.assignee_id)
                    .push_bind(card.custody_id)
                    .push_bind(card.paid)
                    .push_bind(card.payment_method_id)
                    .push_bind(card.commission);
            });
            query.build().execute(&mut **tx).await?;
        }
        Ok(())
    }

    async fn event_of_book(
        tx: &mut Transaction<'_, Postgres>,
        book_id: Uuid,
    ) -> Result<Event, AppError> {
        sqlx::query_as::<_, Event>(
            "SELECT e.* FROM events e JOIN books b ON b.event_id = e.id WHERE b.id = $1",
        )
        .bind(book_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| not_found("Book", book_id))
    }

    /// The placeholder person owning online cards, found by its system key
    /// and created on first use.
    async fn online_buyer(
        tx: &mut Transaction<'_, Postgres>,
        name: &str,
    ) -> Result<Uuid, AppError> {
        // Concurrent first approvals conflict on the unique key; both then
        // read the surviving row.
        sqlx::query(
            "INSERT INTO people (id, name, system_key) VALUES ($1, $2, $3) ON CONFLICT (system_key) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(ONLINE_BUYER_KEY)
        .execute(&mut **tx)
        .await?;
        Ok(
            sqlx::query_scalar::<_, Uuid>("SELECT id FROM people WHERE system_key = $1")
                .bind(ONLINE_BUYER_KEY)
                .fetch_one(&mut **tx)
                .await?,
        )
    }

    /// Id of the payment method named `name`, inserting it first if needed.
    async fn payment_method_id(
        tx: &mut Transaction<'_, Postgres>,
        name: &str,
    ) -> Result<Uuid, AppError> {
        // Payment method names are UNIQUE, so a concurrent insert of the same
        // name is skipped and the SELECT returns the surviving row.
        sqlx::query("INSERT INTO payment_methods (id, name) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING")
            .bind(Uuid::new_v4())
            .bind(name)
            .execute(&mut **tx)
            .await?;
        Ok(
            sqlx::query_scalar::<_, Uuid>("SELECT id FROM payment_methods WHERE name = $1")
                .bind(name)
                .fetch_one(&mut **tx)
                .await?,
        )
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_person(&self, person: NewPerson) -> Result<Person, AppError> {
        let person = sqlx::query_as::<_, Person>(
            "INSERT INTO people (id, name, cpf, phone, notes) VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(person.name)
        .bind(person.cpf)
        .bind(person.phone)
        .bind(person.notes)
        .fetch_one(&self.pool)
        .await?;
        Ok(person)
    }

    async fn get_person(&self, id: Uuid) -> Result<Person, AppError> {
        sqlx::query_as::<_, Person>("SELECT * FROM people WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found("Person", id))
    }

    async fn list_people(&self) -> Result<Vec<Person>, AppError> {
        Ok(sqlx::query_as::<_, Person>("SELECT * FROM people ORDER BY name")
            .fetch_all(&self.pool)
            .await?)
    }

    async fn person_cards(&self, person_id: Uuid) -> Result<Vec<CardDetail>, AppError> {
        Ok(sqlx::query_as::<_, CardDetail>(&format!(
            "{CARD_DETAIL_SELECT} WHERE c.assignee_id = $1 OR c.custody_id = $1 ORDER BY c.number, b.number"
        ))
        .bind(person_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn create_payment_method(&self, name: &str) -> Result<PaymentMethod, AppError> {
        sqlx::query_as::<_, PaymentMethod>(
            "INSERT INTO payment_methods (id, name) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::ValidationError(format!("Payment method '{name}' already exists")))
    }

    async fn get_payment_method(&self, id: Uuid) -> Result<PaymentMethod, AppError> {
        sqlx::query_as::<_, PaymentMethod>("SELECT * FROM payment_methods WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found("Payment method", id))
    }

    async fn list_payment_methods(&self) -> Result<Vec<PaymentMethod>, AppError> {
        Ok(
            sqlx::query_as::<_, PaymentMethod>("SELECT * FROM payment_methods ORDER BY name")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn create_event(&self, event: NewEvent, plans: &[BookPlan]) -> Result<Event, AppError> {
        let mut tx = self.pool.begin().await?;
        let event = sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (id, name, event_date, book_count, cards_per_book, sale_price, max_commission)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event.name)
        .bind(event.event_date)
        .bind(event.book_count)
        .bind(event.cards_per_book)
        .bind(event.sale_price)
        .bind(event.max_commission)
        .fetch_one(&mut *tx)
        .await?;
        Self::insert_inventory(&mut tx, event.id, plans).await?;
        tx.commit().await?;
        Ok(event)
    }

    async fn get_event(&self, id: Uuid) -> Result<Event, AppError> {
        sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found("Event", id))
    }

    async fn latest_event(&self) -> Result<Option<Event>, AppError> {
        Ok(sqlx::query_as::<_, Event>(
            "SELECT * FROM events ORDER BY event_date DESC, created_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_events(&self) -> Result<Vec<Event>, AppError> {
        Ok(sqlx::query_as::<_, Event>(
            "SELECT * FROM events ORDER BY event_date DESC, created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_books(&self, event_id: Uuid) -> Result<Vec<Book>, AppError> {
        Ok(
            sqlx::query_as::<_, Book>("SELECT * FROM books WHERE event_id = $1 ORDER BY number")
                .bind(event_id)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn add_books(
        &self,
        event_id: Uuid,
        book_count: i32,
        generation: Generation,
    ) -> Result<Vec<Book>, AppError> {
        let mut tx = self.pool.begin().await?;
        let event = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1 FOR UPDATE")
            .bind(event_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| not_found("Event", event_id))?;

        let max_book = sqlx::query_scalar::<_, Option<i32>>(
            "SELECT MAX(number) FROM books WHERE event_id = $1 AND number <> $2",
        )
        .bind(event_id)
        .bind(ONLINE_BOOK_NUMBER)
        .fetch_one(&mut *tx)
        .await?;
        if generation == Generation::Initial && max_book.is_some() {
            return Err(AppError::InvalidState(format!(
                "Event '{}' already has its inventory",
                event.name
            )));
        }
        let max_card = sqlx::query_scalar::<_, Option<i32>>(
            r#"
            SELECT MAX(c.number) FROM cards c
            JOIN books b ON b.id = c.book_id
            WHERE b.event_id = $1 AND b.number <> $2
            "#,
        )
        .bind(event_id)
        .bind(ONLINE_BOOK_NUMBER)
        .fetch_one(&mut *tx)
        .await?;

        let (start_book, start_card) = inventory::next_physical_start(max_book, max_card);
        let plans =
            inventory::plan_books(event.cards_per_book, start_book, start_card, book_count)?;
        let books = Self::insert_inventory(&mut tx, event_id, &plans).await?;
        tx.commit().await?;
        Ok(books)
    }

    async fn get_card(&self, id: Uuid) -> Result<Card, AppError> {
        sqlx::query_as::<_, Card>("SELECT * FROM cards WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found("Card", id))
    }

    async fn card_detail(&self, id: Uuid) -> Result<CardDetail, AppError> {
        sqlx::query_as::<_, CardDetail>(&format!("{CARD_DETAIL_SELECT} WHERE c.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found("Card", id))
    }

    async fn list_cards(&self, event_id: Uuid) -> Result<Vec<CardDetail>, AppError> {
        self.get_event(event_id).await?;
        Ok(sqlx::query_as::<_, CardDetail>(&format!(
            "{CARD_DETAIL_SELECT} WHERE b.event_id = $1 ORDER BY c.number, b.number"
        ))
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn update_cards(
        &self,
        selection: CardSelection,
        transition: &CardTransition,
    ) -> Result<Vec<Card>, AppError> {
        let mut tx = self.pool.begin().await?;

        let (event, cards) = match selection {
            CardSelection::Card(id) => {
                let card = sqlx::query_as::<_, Card>("SELECT * FROM cards WHERE id = $1 FOR UPDATE")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| not_found("Card", id))?;
                let event = Self::event_of_book(&mut tx, card.book_id).await?;
                (event, vec![card])
            }
            CardSelection::Book(book_id) => {
                let event = Self::event_of_book(&mut tx, book_id).await?;
                let cards = sqlx::query_as::<_, Card>(
                    "SELECT * FROM cards WHERE book_id = $1 ORDER BY number FOR UPDATE",
                )
                .bind(book_id)
                .fetch_all(&mut *tx)
                .await?;
                (event, cards)
            }
            CardSelection::Range {
                event_id,
                first,
                last,
            } => {
                let event = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1")
                    .bind(event_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| not_found("Event", event_id))?;
                let cards = sqlx::query_as::<_, Card>(
                    r#"
                    SELECT c.* FROM cards c
                    JOIN books b ON b.id = c.book_id
                    WHERE b.event_id = $1 AND b.number <> $2 AND c.number BETWEEN $3 AND $4
                    ORDER BY c.number
                    FOR UPDATE OF c
                    "#,
                )
                .bind(event_id)
                .bind(ONLINE_BOOK_NUMBER)
                .bind(first)
                .bind(last)
                .fetch_all(&mut *tx)
                .await?;
                (event, cards)
            }
        };
        if cards.is_empty() {
            return Err(empty_selection(&selection));
        }

        // Dropping `tx` on the error path rolls everything back.
        let updated = lifecycle::apply_batch(transition, &cards, event.max_commission)?;
        for card in &updated {
            sqlx::query(
                r#"
                UPDATE cards
                SET assignee_id = $2, custody_id = $3, paid = $4, payment_method_id = $5, commission = $6
                WHERE id = $1
                "#,
            )
            .bind(card.id)
            .bind(card.assignee_id)
            .bind(card.custody_id)
            .bind(card.paid)
            .bind(card.payment_method_id)
            .bind(card.commission)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(updated)
    }

    async fn insert_purchase(&self, purchase: &OnlinePurchase) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO online_purchases
                (id, event_id, name, cpf, phone, email, card_count, amount,
                 gateway_reference, status, qr_code, checkout_url, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(purchase.id)
        .bind(purchase.event_id)
        .bind(&purchase.name)
        .bind(&purchase.cpf)
        .bind(&purchase.phone)
        .bind(&purchase.email)
        .bind(purchase.card_count)
        .bind(purchase.amount)
        .bind(&purchase.gateway_reference)
        .bind(&purchase.status)
        .bind(&purchase.qr_code)
        .bind(&purchase.checkout_url)
        .bind(purchase.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_purchase(&self, id: Uuid) -> Result<OnlinePurchase, AppError> {
        sqlx::query_as::<_, OnlinePurchase>("SELECT * FROM online_purchases WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found("Purchase", id))
    }

    async fn purchases_by_cpf(&self, cpf: &str) -> Result<Vec<OnlinePurchase>, AppError> {
        Ok(sqlx::query_as::<_, OnlinePurchase>(
            "SELECT * FROM online_purchases WHERE cpf = $1 ORDER BY created_at DESC",
        )
        .bind(cpf)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn purchase_cards(&self, purchase_id: Uuid) -> Result<Vec<Card>, AppError> {
        Ok(sqlx::query_as::<_, Card>(
            r#"
            SELECT c.* FROM cards c
            JOIN purchase_cards pc ON pc.card_id = c.id
            WHERE pc.purchase_id = $1
            ORDER BY c.number
            "#,
        )
        .bind(purchase_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn update_purchase_status(
        &self,
        purchase_id: Uuid,
        status: &PaymentStatus,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE online_purchases SET status = $2 WHERE id = $1 AND status <> $3",
        )
        .bind(purchase_id)
        .bind(status.as_str())
        .bind(PaymentStatus::Approved.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            // Either missing or already approved; only the former is an error.
            self.get_purchase(purchase_id).await?;
        }
        Ok(())
    }

    async fn approve_purchase(
        &self,
        purchase_id: Uuid,
        sale: &OnlineSale,
    ) -> Result<Option<Vec<Card>>, AppError> {
        let mut tx = self.pool.begin().await?;

        let purchase = sqlx::query_as::<_, OnlinePurchase>(
            "SELECT * FROM online_purchases WHERE id = $1 FOR UPDATE",
        )
        .bind(purchase_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| not_found("Purchase", purchase_id))?;

        sqlx::query("UPDATE online_purchases SET status = $2 WHERE id = $1")
            .bind(purchase_id)
            .bind(PaymentStatus::Approved.as_str())
            .execute(&mut *tx)
            .await?;

        let linked = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM purchase_cards WHERE purchase_id = $1",
        )
        .bind(purchase_id)
        .fetch_one(&mut *tx)
        .await?;
        if linked > 0 {
            tx.commit().await?;
            return Ok(None);
        }

        sqlx::query(
            "INSERT INTO books (id, event_id, number) VALUES ($1, $2, $3) ON CONFLICT (event_id, number) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(purchase.event_id)
        .bind(ONLINE_BOOK_NUMBER)
        .execute(&mut *tx)
        .await?;
        let book = sqlx::query_as::<_, Book>(
            "SELECT * FROM books WHERE event_id = $1 AND number = $2 FOR UPDATE",
        )
        .bind(purchase.event_id)
        .bind(ONLINE_BOOK_NUMBER)
        .fetch_one(&mut *tx)
        .await?;
        let existing =
            sqlx::query_scalar::<_, Option<i32>>("SELECT MAX(number) FROM cards WHERE book_id = $1")
                .bind(book.id)
                .fetch_one(&mut *tx)
                .await?
                .unwrap_or(0);

        let buyer_id = Self::online_buyer(&mut tx, &sale.buyer_name).await?;
        let method_id = Self::payment_method_id(&mut tx, &sale.payment_method_name).await?;

        let cards: Vec<Card> = inventory::plan_online(existing, purchase.card_count)?
            .into_iter()
            .map(|number| {
                lifecycle::mark_sold_online(&Card::pristine(book.id, number), buyer_id, method_id)
            })
            .collect();
        Self::insert_cards(&mut tx, &cards).await?;

        let mut link = QueryBuilder::<Postgres>::new("INSERT INTO purchase_cards (purchase_id, card_id) ");
        link.push_values(&cards, |mut row, card| {
            row.push_bind(purchase_id).push_bind(card.id);
        });
        link.build().execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(Some(cards))
    }
}
