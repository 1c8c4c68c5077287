use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::{AppState, CallerRoles};
use crate::models::{CardFilter, NewEvent};
use crate::services::lifecycle::CardTransition;
use crate::services::permissions::{authorize, Action, Subject};
use crate::services::{cards, events, report};
use crate::utils::error::AppError;
use crate::utils::response::{created, csv_attachment, success};

#[derive(Debug, Default, Deserialize)]
pub struct InventoryRequest {
    pub book_count: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct MoreBooksRequest {
    pub book_count: i32,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub first: i32,
    pub last: i32,
    #[serde(flatten)]
    pub transition: CardTransition,
}

pub async fn list_events(State(state): State<AppState>) -> Result<Response, AppError> {
    let events = state.store.list_events().await?;
    Ok(success(events, "Events retrieved"))
}

pub async fn create_event(
    State(state): State<AppState>,
    CallerRoles(roles): CallerRoles,
    Json(event): Json<NewEvent>,
) -> Result<Response, AppError> {
    let event = events::create_event(state.store.as_ref(), &roles, event).await?;
    Ok(created(event, "Event created"))
}

pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let overview = events::event_overview(state.store.as_ref(), event_id).await?;
    Ok(success(overview, "Event retrieved"))
}

pub async fn generate_inventory(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    CallerRoles(roles): CallerRoles,
    request: Option<Json<InventoryRequest>>,
) -> Result<Response, AppError> {
    let Json(request) = request.unwrap_or_default();
    let books =
        events::generate_inventory(state.store.as_ref(), &roles, event_id, request.book_count)
            .await?;
    Ok(created(books, "Inventory generated"))
}

pub async fn generate_more_books(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    CallerRoles(roles): CallerRoles,
    Json(request): Json<MoreBooksRequest>,
) -> Result<Response, AppError> {
    let books =
        events::generate_more_books(state.store.as_ref(), &roles, event_id, request.book_count)
            .await?;
    Ok(created(books, "Books generated"))
}

pub async fn list_cards(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Query(filter): Query<CardFilter>,
) -> Result<Response, AppError> {
    let cards = cards::list_cards(state.store.as_ref(), event_id, &filter).await?;
    Ok(success(cards, "Cards retrieved"))
}

pub async fn export_cards(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    CallerRoles(roles): CallerRoles,
    Query(filter): Query<CardFilter>,
) -> Result<Response, AppError> {
    authorize(Action::ExportCards, Subject::Nothing, &roles)?;
    let event = state.store.get_event(event_id).await?;
    let cards: Vec<_> = state
        .store
        .list_cards(event_id)
        .await?
        .into_iter()
        .filter(|c| filter.matches(c))
        .collect();
    let body = report::export_csv(&event, &cards)?;
    Ok(csv_attachment(&format!("cards-{}.csv", event.event_date), body))
}

pub async fn batch_transition(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    CallerRoles(roles): CallerRoles,
    Json(request): Json<BatchRequest>,
) -> Result<Response, AppError> {
    let cards = cards::transition_range(
        state.store.as_ref(),
        &roles,
        event_id,
        request.first,
        request.last,
        request.transition,
    )
    .await?;
    let message = format!("{} card(s) updated", cards.len());
    Ok(success(cards, message))
}
