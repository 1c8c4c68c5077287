use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::{AppState, CallerRoles};
use crate::models::BuyerInfo;
use crate::utils::error::AppError;
use crate::utils::response::{see_other, see_other_with, success};

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    #[serde(flatten)]
    pub buyer: BuyerInfo,
    pub card_count: i32,
}

#[derive(Debug, Deserialize)]
pub struct CpfQuery {
    pub cpf: String,
}

/// Opens the purchase and sends the buyer to the checkout page.
pub async fn create_purchase(
    State(state): State<AppState>,
    Json(request): Json<PurchaseRequest>,
) -> Result<Response, AppError> {
    let purchase = state
        .purchases
        .create(request.buyer, request.card_count)
        .await?;
    let location = purchase.checkout_url.clone();
    Ok(see_other_with(&location, purchase, "Purchase created"))
}

pub async fn lookup_purchases(
    State(state): State<AppState>,
    Query(query): Query<CpfQuery>,
) -> Result<Response, AppError> {
    let purchases = state.purchases.lookup(&query.cpf).await?;
    Ok(success(purchases, "Purchases retrieved"))
}

pub async fn view_purchase(
    State(state): State<AppState>,
    Path(purchase_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let view = state.purchases.view(purchase_id).await?;
    Ok(success(view, "Purchase retrieved"))
}

pub async fn refresh_purchase(
    State(state): State<AppState>,
    Path(purchase_id): Path<Uuid>,
    CallerRoles(roles): CallerRoles,
) -> Result<Response, AppError> {
    let purchase = state.purchases.request_refresh(purchase_id, &roles).await?;
    let message = format!("Purchase {}", purchase.status_label().to_lowercase());
    Ok(success(purchase, message))
}

pub async fn pay_purchase(
    State(state): State<AppState>,
    Path(purchase_id): Path<Uuid>,
    CallerRoles(roles): CallerRoles,
) -> Result<Response, AppError> {
    let url = state.purchases.checkout_url(purchase_id, &roles).await?;
    Ok(see_other(&url))
}
