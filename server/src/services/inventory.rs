//! Card inventory generation.
//!
//! Physical inventory is numbered in books starting at `001`; each book holds
//! `cards_per_book` consecutive card numbers. Cards sold online live in the
//! reserved book `000` and are numbered independently of the physical pool.

use uuid::Uuid;

use crate::models::{Book, Card};
use crate::utils::error::AppError;

/// Book number reserved for cards allocated by online purchases.
pub const ONLINE_BOOK_NUMBER: i32 = 0;

/// Most cards a single generation (event creation, more books, one online
/// allocation) may produce.
pub const MAX_CARDS_PER_GENERATION: i64 = 100_000;

pub fn check_generation_size(cards: i64) -> Result<(), AppError> {
    if cards > MAX_CARDS_PER_GENERATION {
        return Err(AppError::ValidationError(format!(
            "At most {MAX_CARDS_PER_GENERATION} cards can be generated at once, {cards} requested"
        )));
    }
    Ok(())
}

pub fn book_label(number: i32) -> String {
    format!("{number:03}")
}

pub fn card_label(number: i32) -> String {
    format!("{number:05}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookPlan {
    pub number: i32,
    pub card_numbers: Vec<i32>,
}

/// Lays out `book_count` books of `cards_per_book` cards each, numbering books
/// from `start_book` and cards contiguously from `start_card`.
pub fn plan_books(
    cards_per_book: i32,
    start_book: i32,
    start_card: i32,
    book_count: i32,
) -> Result<Vec<BookPlan>, AppError> {
    if cards_per_book <= 0 {
        return Err(AppError::ValidationError(
            "Cards per book must be greater than zero".to_string(),
        ));
    }
    if book_count < 0 {
        return Err(AppError::ValidationError(
            "Book count cannot be negative".to_string(),
        ));
    }
    if start_book <= ONLINE_BOOK_NUMBER || start_card <= 0 {
        return Err(AppError::ValidationError(
            "Book and card numbering must start at 1 or above".to_string(),
        ));
    }

    check_generation_size(i64::from(book_count) * i64::from(cards_per_book))?;

    let overflow = || AppError::ValidationError("Card numbering overflow".to_string());
    book_count
        .checked_mul(cards_per_book)
        .and_then(|total| start_card.checked_add(total))
        .ok_or_else(overflow)?;
    start_book.checked_add(book_count).ok_or_else(overflow)?;

    Ok((0..book_count)
        .map(|offset| {
            let first = start_card + offset * cards_per_book;
            BookPlan {
                number: start_book + offset,
                card_numbers: (first..first + cards_per_book).collect(),
            }
        })
        .collect())
}

/// Where the next physical book and card should start, given the highest
/// numbers already issued for the event (online book excluded).
pub fn next_physical_start(max_book: Option<i32>, max_card: Option<i32>) -> (i32, i32) {
    (
        max_book.map_or(1, |n| n.max(ONLINE_BOOK_NUMBER) + 1),
        max_card.map_or(1, |n| n + 1),
    )
}

/// Card numbers appended to the online book that already holds
/// `existing_cards` cards.
pub fn plan_online(existing_cards: i32, count: i32) -> Result<Vec<i32>, AppError> {
    if count <= 0 {
        return Err(AppError::ValidationError(
            "At least one card must be allocated".to_string(),
        ));
    }
    check_generation_size(i64::from(count))?;
    let first = existing_cards + 1;
    let end = first
        .checked_add(count)
        .ok_or_else(|| AppError::ValidationError("Card numbering overflow".to_string()))?;
    Ok((first..end).collect())
}

/// Turns a plan into fresh book and card records for `event_id`.
pub fn materialize(event_id: Uuid, plans: &[BookPlan]) -> (Vec<Book>, Vec<Card>) {
    let mut books = Vec::with_capacity(plans.len());
    let mut cards = Vec::new();
    for plan in plans {
        let book = Book {
            id: Uuid::new_v4(),
            event_id,
            number: plan.number,
        };
        cards.extend(
            plan.card_numbers
                .iter()
                .map(|&number| Card::pristine(book.id, number)),
        );
        books.push(book);
    }
    (books, cards)
}
