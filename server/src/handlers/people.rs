use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::{AppState, CallerRoles};
use crate::models::NewPerson;
use crate::services::cards;
use crate::services::permissions::{authorize, Action, Subject};
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Debug, Deserialize)]
pub struct NewPaymentMethod {
    pub name: String,
}

fn required(value: &str, field: &str) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::ValidationError(format!("{field} is required")));
    }
    Ok(value.to_string())
}

pub async fn list_people(State(state): State<AppState>) -> Result<Response, AppError> {
    let people = state.store.list_people().await?;
    Ok(success(people, "People retrieved"))
}

pub async fn create_person(
    State(state): State<AppState>,
    Json(person): Json<NewPerson>,
) -> Result<Response, AppError> {
    let person = NewPerson {
        name: required(&person.name, "Name")?,
        ..person
    };
    let person = state.store.create_person(person).await?;
    tracing::info!(person_id = %person.id, "Person created");
    Ok(created(person, "Person created"))
}

pub async fn person_cards(
    State(state): State<AppState>,
    Path(person_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let cards = cards::person_cards(state.store.as_ref(), person_id).await?;
    Ok(success(cards, "Cards retrieved"))
}

pub async fn list_payment_methods(State(state): State<AppState>) -> Result<Response, AppError> {
    let methods = state.store.list_payment_methods().await?;
    Ok(success(methods, "Payment methods retrieved"))
}

pub async fn create_payment_method(
    State(state): State<AppState>,
    CallerRoles(roles): CallerRoles,
    Json(method): Json<NewPaymentMethod>,
) -> Result<Response, AppError> {
    authorize(Action::ManagePaymentMethods, Subject::Nothing, &roles)?;
    let name = required(&method.name, "Name")?;
    let method = state.store.create_payment_method(&name).await?;
    Ok(created(method, "Payment method created"))
}
