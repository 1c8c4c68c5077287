use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer, Config};
use crate::handlers::{cards, events, health_check, people, purchases, AppState};

pub fn create_routes(state: AppState, config: &Config) -> Router {
    let router = Router::new()
        .route("/health", get(health_check))
        .route("/people", get(people::list_people).post(people::create_person))
        .route("/people/:id/cards", get(people::person_cards))
        .route(
            "/payment-methods",
            get(people::list_payment_methods).post(people::create_payment_method),
        )
        .route("/events", get(events::list_events).post(events::create_event))
        .route("/events/:id", get(events::get_event))
        .route("/events/:id/inventory", post(events::generate_inventory))
        .route("/events/:id/books", post(events::generate_more_books))
        .route("/events/:id/cards", get(events::list_cards))
        .route("/events/:id/cards/export", get(events::export_cards))
        .route("/events/:id/cards/batch", post(events::batch_transition))
        .route("/cards/:id", get(cards::get_card))
        .route("/cards/:id/assign", post(cards::assign))
        .route("/cards/:id/custody", post(cards::transfer_custody))
        .route("/cards/:id/return", post(cards::return_card))
        .route("/cards/:id/settle", post(cards::settle))
        .route(
            "/purchases",
            get(purchases::lookup_purchases).post(purchases::create_purchase),
        )
        .route("/purchases/:id", get(purchases::view_purchase))
        .route("/purchases/:id/refresh", post(purchases::refresh_purchase))
        .route("/purchases/:id/pay", get(purchases::pay_purchase))
        .with_state(state);

    create_security_headers_layer(router, config.production)
        .layer(create_cors_layer(config.cors_allowed_origins.as_deref()))
        .layer(TraceLayer::new_for_http())
}
