use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::{AppState, CallerRoles};
use crate::services::cards;
use crate::services::lifecycle::CardTransition;
use crate::utils::error::AppError;
use crate::utils::response::success;

#[derive(Debug, Deserialize)]
pub struct PersonRequest {
    pub person_id: Uuid,
    #[serde(default)]
    pub apply_to_book: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReturnRequest {
    #[serde(default)]
    pub apply_to_book: bool,
}

#[derive(Debug, Deserialize)]
pub struct SettleRequest {
    pub paid: bool,
    pub payment_method_id: Option<Uuid>,
    pub commission: Option<Decimal>,
    #[serde(default)]
    pub apply_to_book: bool,
}

async fn transition(
    state: &AppState,
    card_id: Uuid,
    roles: &CallerRoles,
    transition: CardTransition,
    apply_to_book: bool,
) -> Result<Response, AppError> {
    let cards =
        cards::transition_card(state.store.as_ref(), &roles.0, card_id, transition, apply_to_book)
            .await?;
    let message = format!("{} card(s) updated", cards.len());
    Ok(success(cards, message))
}

pub async fn get_card(
    State(state): State<AppState>,
    Path(card_id): Path<Uuid>,
    CallerRoles(roles): CallerRoles,
) -> Result<Response, AppError> {
    let overview = cards::card_overview(state.store.as_ref(), &roles, card_id).await?;
    Ok(success(overview, "Card retrieved"))
}

pub async fn assign(
    State(state): State<AppState>,
    Path(card_id): Path<Uuid>,
    roles: CallerRoles,
    Json(request): Json<PersonRequest>,
) -> Result<Response, AppError> {
    let assign = CardTransition::Assign {
        person_id: request.person_id,
    };
    transition(&state, card_id, &roles, assign, request.apply_to_book).await
}

pub async fn transfer_custody(
    State(state): State<AppState>,
    Path(card_id): Path<Uuid>,
    roles: CallerRoles,
    Json(request): Json<PersonRequest>,
) -> Result<Response, AppError> {
    let custody = CardTransition::TransferCustody {
        person_id: request.person_id,
    };
    transition(&state, card_id, &roles, custody, request.apply_to_book).await
}

pub async fn return_card(
    State(state): State<AppState>,
    Path(card_id): Path<Uuid>,
    roles: CallerRoles,
    request: Option<Json<ReturnRequest>>,
) -> Result<Response, AppError> {
    let Json(request) = request.unwrap_or_default();
    transition(&state, card_id, &roles, CardTransition::Return, request.apply_to_book).await
}

pub async fn settle(
    State(state): State<AppState>,
    Path(card_id): Path<Uuid>,
    roles: CallerRoles,
    Json(request): Json<SettleRequest>,
) -> Result<Response, AppError> {
    let settle = CardTransition::Settle {
        paid: request.paid,
        payment_method_id: request.payment_method_id,
        commission: request.commission,
    };
    transition(&state, card_id, &roles, settle, request.apply_to_book).await
}
