//! Card actions: the permission check on the card the caller picked, then a
//! lifecycle transition over that card, its book, or a number range.

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::models::{Card, CardFilter, CardView};
use crate::services::lifecycle::{describe, CardSelection, CardTransition};
use crate::services::permissions::{authorize, card_actions, Action, Roles, Subject};
use crate::store::Store;
use crate::utils::error::AppError;

#[derive(Debug, Serialize)]
pub struct CardOverview {
    #[serde(flatten)]
    pub card: CardView,
    pub actions: Vec<Action>,
}

/// Fails with `NotFound` if the transition names a person or payment method
/// that does not exist.
async fn check_references(store: &dyn Store, transition: &CardTransition) -> Result<(), AppError> {
    match transition {
        CardTransition::Assign { person_id } | CardTransition::TransferCustody { person_id } => {
            store.get_person(*person_id).await?;
        }
        CardTransition::Settle {
            paid: true,
            payment_method_id: Some(method_id),
            ..
        } => {
            store.get_payment_method(*method_id).await?;
        }
        _ => {}
    }
    Ok(())
}

/// Applies `transition` to the card, or to every card of its book when
/// `whole_book` is set. Permission is judged on the chosen card.
pub async fn transition_card(
    store: &dyn Store,
    roles: &Roles,
    card_id: Uuid,
    transition: CardTransition,
    whole_book: bool,
) -> Result<Vec<Card>, AppError> {
    let card = store.get_card(card_id).await?;
    authorize(transition.action(), Subject::Card(&card), roles)?;
    check_references(store, &transition).await?;

    let selection = if whole_book {
        CardSelection::Book(card.book_id)
    } else {
        CardSelection::Card(card.id)
    };
    let updated = store.update_cards(selection, &transition).await?;
    info!(
        action = transition.action().as_str(),
        cards = %describe(&updated),
        "Card transition applied"
    );
    Ok(updated)
}

/// Applies `transition` to cards `first..=last` of the event's physical books.
pub async fn transition_range(
    store: &dyn Store,
    roles: &Roles,
    event_id: Uuid,
    first: i32,
    last: i32,
    transition: CardTransition,
) -> Result<Vec<Card>, AppError> {
    authorize(Action::BatchTransition, Subject::Nothing, roles)?;
    let selection = CardSelection::range(event_id, first, last)?;
    check_references(store, &transition).await?;

    let updated = store.update_cards(selection, &transition).await?;
    info!(
        event_id = %event_id,
        action = transition.action().as_str(),
        cards = %describe(&updated),
        "Batch transition applied"
    );
    Ok(updated)
}

pub async fn card_overview(
    store: &dyn Store,
    roles: &Roles,
    card_id: Uuid,
) -> Result<CardOverview, AppError> {
    let card = store.get_card(card_id).await?;
    let detail = store.card_detail(card_id).await?;
    Ok(CardOverview {
        actions: card_actions(&card, roles),
        card: detail.into(),
    })
}

pub async fn list_cards(
    store: &dyn Store,
    event_id: Uuid,
    filter: &CardFilter,
) -> Result<Vec<CardView>, AppError> {
    Ok(store
        .list_cards(event_id)
        .await?
        .into_iter()
        .filter(|c| filter.matches(c))
        .map(CardView::from)
        .collect())
}

pub async fn person_cards(store: &dyn Store, person_id: Uuid) -> Result<Vec<CardView>, AppError> {
    store.get_person(person_id).await?;
    Ok(store
        .person_cards(person_id)
        .await?
        .into_iter()
        .map(CardView::from)
        .collect())
}
