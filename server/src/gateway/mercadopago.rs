//! Mercado Pago client.
//!
//! Two ways of charging are supported: a PIX payment created directly through
//! `/v1/payments`, and a hosted checkout preference whose payments are later
//! found by external reference.

use async_trait::async_trait;
use reqwest::{Client, Response};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{Charge, ChargeRequest, GatewayError, PaymentGateway, PaymentStatus};

pub const DEFAULT_BASE_URL: &str = "https://api.mercadopago.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutMode {
    Pix,
    Hosted,
}

impl FromStr for CheckoutMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pix" => Ok(CheckoutMode::Pix),
            "checkout" | "hosted" => Ok(CheckoutMode::Hosted),
            other => Err(format!("unknown checkout mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MercadoPagoConfig {
    pub base_url: String,
    pub access_token: String,
    pub mode: CheckoutMode,
    /// Where the hosted checkout sends the buyer back to.
    pub callback_url: Option<String>,
    pub timeout: Duration,
}

#[derive(Clone)]
pub struct MercadoPagoGateway {
    client: Client,
    config: MercadoPagoConfig,
}

#[derive(Serialize)]
struct Identification<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    number: &'a str,
}

#[derive(Serialize)]
struct PixPayer<'a> {
    email: Option<&'a str>,
    first_name: &'a str,
    last_name: &'a str,
    identification: Option<Identification<'a>>,
}

#[derive(Serialize)]
struct PixPaymentRequest<'a> {
    transaction_amount: f64,
    description: &'a str,
    payment_method_id: &'static str,
    external_reference: &'a str,
    payer: PixPayer<'a>,
}

#[derive(Serialize)]
struct PreferenceItem<'a> {
    title: &'a str,
    currency_id: &'static str,
    description: &'a str,
    quantity: u32,
    unit_price: f64,
}

#[derive(Serialize)]
struct PreferencePayer<'a> {
    name: &'a str,
    email: Option<&'a str>,
    identification: Option<Identification<'a>>,
}

#[derive(Serialize)]
struct BackUrls<'a> {
    success: &'a str,
    failure: &'a str,
    pending: &'a str,
}

#[derive(Serialize)]
struct PreferenceRequest<'a> {
    items: Vec<PreferenceItem<'a>>,
    payer: PreferencePayer<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    back_urls: Option<BackUrls<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    auto_return: Option<&'static str>,
    statement_descriptor: &'static str,
    external_reference: &'a str,
}

#[derive(Debug, Deserialize)]
struct TransactionData {
    qr_code: Option<String>,
    ticket_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PointOfInteraction {
    transaction_data: Option<TransactionData>,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    id: serde_json::Value,
    status: String,
    point_of_interaction: Option<PointOfInteraction>,
}

#[derive(Debug, Deserialize)]
struct PaymentStatusResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct PreferenceResponse {
    init_point: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<PaymentStatusResponse>,
}

fn amount_as_f64(amount: Decimal) -> Result<f64, GatewayError> {
    amount
        .to_f64()
        .ok_or_else(|| GatewayError::InvalidResponse(format!("amount {amount} is not representable")))
}

/// Splits a full name into the first and last word, as the processor wants.
fn split_name(name: &str) -> (&str, &str) {
    let mut words = name.split_whitespace();
    let first = words.next().unwrap_or_default();
    let last = words.last().unwrap_or(first);
    (first, last)
}

fn digits_only(cpf: &str) -> String {
    cpf.chars().filter(char::is_ascii_digit).collect()
}

fn reference_string(id: &serde_json::Value) -> Result<String, GatewayError> {
    match id {
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(GatewayError::InvalidResponse(format!(
            "payment id has unexpected shape: {other}"
        ))),
    }
}

async fn ensure_success(response: Response) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), %body, "Mercado Pago rejected request");
        Err(GatewayError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

impl MercadoPagoGateway {
    pub fn new(config: MercadoPagoConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn create_pix_payment(&self, request: &ChargeRequest) -> Result<Charge, GatewayError> {
        let (first_name, last_name) = split_name(&request.payer.name);
        let cpf = request.payer.cpf.as_deref().map(digits_only);
        let body = PixPaymentRequest {
            transaction_amount: amount_as_f64(request.amount)?,
            description: &request.description,
            payment_method_id: "pix",
            external_reference: &request.external_reference,
            payer: PixPayer {
                email: request.payer.email.as_deref(),
                first_name,
                last_name,
                identification: cpf.as_deref().map(|number| Identification {
                    kind: "CPF",
                    number,
                }),
            },
        };

        let response = self
            .client
            .post(self.url("/v1/payments"))
            .bearer_auth(&self.config.access_token)
            .header("X-Idempotency-Key", &request.external_reference)
            .json(&body)
            .send()
            .await?;
        let payment: PaymentResponse = ensure_success(response).await?.json().await?;

        let data = payment
            .point_of_interaction
            .and_then(|p| p.transaction_data)
            .ok_or_else(|| {
                GatewayError::InvalidResponse("missing point_of_interaction.transaction_data".into())
            })?;
        let checkout_url = data
            .ticket_url
            .ok_or_else(|| GatewayError::InvalidResponse("missing ticket_url".into()))?;

        Ok(Charge {
            status: PaymentStatus::from(payment.status),
            reference: reference_string(&payment.id)?,
            checkout_url,
            qr_code: data.qr_code,
        })
    }

    async fn create_preference(&self, request: &ChargeRequest) -> Result<Charge, GatewayError> {
        let cpf = request.payer.cpf.as_deref().map(digits_only);
        let callback = self.config.callback_url.as_deref();
        let body = PreferenceRequest {
            items: vec![PreferenceItem {
                title: &request.payer.name,
                currency_id: "BRL",
                description: &request.description,
                quantity: 1,
                unit_price: amount_as_f64(request.amount)?,
            }],
            payer: PreferencePayer {
                name: &request.payer.name,
                email: request.payer.email.as_deref(),
                identification: cpf.as_deref().map(|number| Identification {
                    kind: "CPF",
                    number,
                }),
            },
            back_urls: callback.map(|url| BackUrls {
                success: url,
                failure: url,
                pending: url,
            }),
            auto_return: callback.map(|_| "approved"),
            statement_descriptor: "Pagamento Online",
            external_reference: &request.external_reference,
        };

        let response = self
            .client
            .post(self.url("/checkout/preferences"))
            .bearer_auth(&self.config.access_token)
            .json(&body)
            .send()
            .await?;
        let preference: PreferenceResponse = ensure_success(response).await?.json().await?;

        Ok(Charge {
            status: PaymentStatus::Pending,
            reference: request.external_reference.clone(),
            checkout_url: preference.init_point,
            qr_code: None,
        })
    }

    async fn payment_status(&self, payment_id: &str) -> Result<PaymentStatus, GatewayError> {
        let response = self
            .client
            .get(self.url(&format!("/v1/payments/{payment_id}")))
            .bearer_auth(&self.config.access_token)
            .send()
            .await?;
        let payment: PaymentStatusResponse = ensure_success(response).await?.json().await?;
        Ok(PaymentStatus::from(payment.status))
    }

    /// Latest payment made against a checkout preference, pending if the buyer
    /// has not paid yet.
    async fn search_status(&self, external_reference: &str) -> Result<PaymentStatus, GatewayError> {
        let response = self
            .client
            .get(self.url("/v1/payments/search"))
            .bearer_auth(&self.config.access_token)
            .query(&[
                ("sort", "date_created"),
                ("criteria", "desc"),
                ("external_reference", external_reference),
                ("range", "date_created"),
                ("begin_date", "NOW-2DAYS"),
                ("end_date", "NOW"),
            ])
            .send()
            .await?;
        let search: SearchResponse = ensure_success(response).await?.json().await?;
        Ok(search
            .results
            .into_iter()
            .next()
            .map_or(PaymentStatus::Pending, |p| PaymentStatus::from(p.status)))
    }
}

#[async_trait]
impl PaymentGateway for MercadoPagoGateway {
    async fn create_charge(&self, request: &ChargeRequest) -> Result<Charge, GatewayError> {
        let charge = match self.config.mode {
            CheckoutMode::Pix => self.create_pix_payment(request).await?,
            CheckoutMode::Hosted => self.create_preference(request).await?,
        };
        info!(
            reference = %charge.reference,
            status = %charge.status,
            external_reference = %request.external_reference,
            "Mercado Pago charge created"
        );
        Ok(charge)
    }

    async fn query_status(&self, reference: &str) -> Result<PaymentStatus, GatewayError> {
        let status = match self.config.mode {
            CheckoutMode::Pix => self.payment_status(reference).await?,
            CheckoutMode::Hosted => self.search_status(reference).await?,
        };
        debug!(%reference, %status, "Mercado Pago status queried");
        Ok(status)
    }
}
