use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::gateway::{mercadopago, CheckoutMode, MercadoPagoConfig};
use crate::services::inventory::MAX_CARDS_PER_GENERATION;
use crate::store::OnlineSale;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_MAX_CARDS_PER_PURCHASE: i32 = 100;
const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },

    #[error("{0} must be set when BINGO_GATEWAY=mercadopago")]
    Missing(&'static str),

    #[error("The fake payment gateway cannot run with RUST_ENV=production")]
    FakeGatewayInProduction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayKind {
    Fake,
    MercadoPago,
}

impl FromStr for GatewayKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fake" => Ok(GatewayKind::Fake),
            "mercadopago" | "mercado_pago" => Ok(GatewayKind::MercadoPago),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// `None` runs against the in-memory store.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub bind_addr: SocketAddr,
    pub production: bool,
    pub cors_allowed_origins: Option<String>,
    pub gateway: GatewayKind,
    /// Present when `gateway` is Mercado Pago.
    pub mercado_pago: Option<MercadoPagoConfig>,
    pub online_sale: OnlineSale,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; `from_env` passes the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let production = get("RUST_ENV").is_some_and(|v| v.eq_ignore_ascii_case("production"));
        let gateway = parse_or(&get, "BINGO_GATEWAY", GatewayKind::Fake)?;
        if production && gateway == GatewayKind::Fake {
            return Err(ConfigError::FakeGatewayInProduction);
        }
        let max_cards = parse_or(&get, "MAX_CARDS_PER_PURCHASE", DEFAULT_MAX_CARDS_PER_PURCHASE)?;
        if !(1..=MAX_CARDS_PER_GENERATION).contains(&i64::from(max_cards)) {
            return Err(ConfigError::Invalid {
                key: "MAX_CARDS_PER_PURCHASE",
                value: max_cards.to_string(),
            });
        }
        let mercado_pago = match gateway {
            GatewayKind::Fake => None,
            GatewayKind::MercadoPago => Some(MercadoPagoConfig {
                base_url: get("MERCADO_PAGO_BASE_URL")
                    .unwrap_or_else(|| mercadopago::DEFAULT_BASE_URL.to_string()),
                access_token: get("MERCADO_PAGO_TOKEN")
                    .ok_or(ConfigError::Missing("MERCADO_PAGO_TOKEN"))?,
                mode: parse_or(&get, "MERCADO_PAGO_MODE", CheckoutMode::Pix)?,
                callback_url: get("CHECKOUT_CALLBACK_URL"),
                timeout: Duration::from_secs(parse_or(
                    &get,
                    "GATEWAY_TIMEOUT_SECS",
                    DEFAULT_GATEWAY_TIMEOUT_SECS,
                )?),
            }),
        };

        Ok(Self {
            database_url: get("DATABASE_URL"),
            max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            bind_addr: match get("BIND_ADDR") {
                Some(value) => parse("BIND_ADDR", value)?,
                None => parse("BIND_ADDR", DEFAULT_BIND_ADDR.to_string())?,
            },
            production,
            cors_allowed_origins: get("CORS_ALLOWED_ORIGINS"),
            gateway,
            mercado_pago,
            online_sale: OnlineSale {
                buyer_name: get("ONLINE_BUYER_NAME").unwrap_or_else(|| "Online Purchase".to_string()),
                payment_method_name: get("ONLINE_PAYMENT_METHOD")
                    .unwrap_or_else(|| "Gateway".to_string()),
                max_cards,
            },
        })
    }
}

fn parse<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value })
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    get(key).map_or(Ok(default), |value| parse(key, value))
}
