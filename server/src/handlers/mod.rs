use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::Response;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;

use crate::config::cors::ROLES_HEADER;
use crate::gateway::PaymentGateway;
use crate::services::permissions::Roles;
use crate::services::purchase::PurchaseService;
use crate::store::{OnlineSale, Store};
use crate::utils::response::success;

pub mod cards;
pub mod events;
pub mod people;
pub mod purchases;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub purchases: PurchaseService,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn PaymentGateway>, sale: OnlineSale) -> Self {
        Self {
            purchases: PurchaseService::new(store.clone(), gateway, sale),
            store,
        }
    }
}

/// Roles of the caller, taken from the `x-user-roles` header. A missing or
/// unreadable header means no roles.
#[derive(Debug, Clone)]
pub struct CallerRoles(pub Roles);

#[async_trait]
impl<S> FromRequestParts<S> for CallerRoles
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let roles = parts
            .headers
            .get(ROLES_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(Roles::parse)
            .unwrap_or_default();
        Ok(CallerRoles(roles))
    }
}

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "bingo-api",
    };

    success(payload, "Health check successful")
}
