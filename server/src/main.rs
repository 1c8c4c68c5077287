use dotenvy::dotenv;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bingo_server::config::{Config, GatewayKind};
use bingo_server::gateway::{FakeGateway, MercadoPagoGateway, PaymentGateway};
use bingo_server::handlers::AppState;
use bingo_server::routes::create_routes;
use bingo_server::store::{InMemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("bingo_server=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.max_connections).await?;
            store.migrate().await?;
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set, data is kept in memory only");
            Arc::new(InMemoryStore::new())
        }
    };

    let gateway: Arc<dyn PaymentGateway> = match (config.gateway, &config.mercado_pago) {
        (GatewayKind::MercadoPago, Some(mp)) => {
            info!(base_url = %mp.base_url, mode = ?mp.mode, "Using Mercado Pago gateway");
            Arc::new(MercadoPagoGateway::new(mp.clone())?)
        }
        _ => {
            warn!("Using the fake payment gateway; no real charges are made");
            Arc::new(FakeGateway::new())
        }
    };

    let state = AppState::new(store, gateway, config.online_sale.clone());
    let app = create_routes(state, &config);

    info!("🚀 Server running at http://{}", config.bind_addr);
    let listener = TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
