// applepay_gateway/src/paypal_handler.rs
// PayPal variant: OAuth token, order creation and the diagnostic echo routes

use axum::{
    extract::{Json, State},
    response::IntoResponse,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::PayPalConfig;
use crate::error::{ApiError, GatewayError, Result};
use crate::money::{Amount, Currency};

// ═══════════════════════════════════════════════════════════════════════════════
// PAYPAL WIRE TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub currency: String,
    pub amount: Value,
}

#[derive(Debug, Serialize)]
struct OrderBody {
    intent: &'static str,
    purchase_units: Vec<PurchaseUnit>,
}

#[derive(Debug, Serialize)]
struct PurchaseUnit {
    amount: UnitAmount,
}

#[derive(Debug, Serialize)]
struct UnitAmount {
    currency_code: Currency,
    value: Amount,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

/// Refresh a minute early; `expires_in` is held to one minute .. one day.
fn token_expiry(now: DateTime<Utc>, expires_in: i64) -> DateTime<Utc> {
    now + chrono::Duration::seconds(expires_in.clamp(60, 86_400) - 60)
}

#[derive(Debug, Serialize)]
pub struct Diagnostics {
    pub message: &'static str,
    pub client_id: String,
    pub environment: &'static str,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PAYPAL STATE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct PayPalState {
    pub config: PayPalConfig,
    pub http_client: Client,
    pub auth_token: Arc<RwLock<Option<(String, DateTime<Utc>)>>>,
}

impl PayPalState {
    pub fn new(config: PayPalConfig, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            config,
            http_client: builder.build()?,
            auth_token: Arc::new(RwLock::new(None)),
        })
    }

    /// Get valid access token (Cached or Refreshed)
    pub async fn get_access_token(&self) -> Result<String> {
        {
            let token_lock = self.auth_token.read().await;
            if let Some((token, expiry)) = &*token_lock {
                if *expiry > Utc::now() {
                    return Ok(token.clone());
                }
            }
        }

        let auth_str = format!("{}:{}", self.config.client_id, self.config.client_secret);
        let auth_basic = STANDARD.encode(auth_str);

        let url = format!("{}/v1/oauth2/token", self.config.base_url());
        let params = [("grant_type", "client_credentials")];

        let resp = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Basic {}", auth_basic))
            .form(&params)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(GatewayError::Upstream {
                context: "PayPal token endpoint",
                status: resp.status().as_u16(),
            });
        }

        let body: TokenResponse = resp.json().await?;

        let mut token_lock = self.auth_token.write().await;
        *token_lock = Some((
            body.access_token.clone(),
            token_expiry(Utc::now(), body.expires_in),
        ));

        Ok(body.access_token)
    }

    /// Creates a CAPTURE order with a single purchase unit.
    pub async fn create_order(&self, amount: Amount, currency: Currency) -> Result<Value> {
        let access_token = self.get_access_token().await?;

        let body = OrderBody {
            intent: "CAPTURE",
            purchase_units: vec![PurchaseUnit {
                amount: UnitAmount {
                    currency_code: currency,
                    value: amount,
                },
            }],
        };

        let resp = self
            .http_client
            .post(format!("{}/v2/checkout/orders", self.config.base_url()))
            .bearer_auth(access_token)
            .header("PayPal-Request-Id", Uuid::new_v4().to_string())
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(GatewayError::Upstream {
                context: "PayPal orders endpoint",
                status: resp.status().as_u16(),
            });
        }

        Ok(resp.json().await?)
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            message: "Test request successful",
            client_id: self.config.client_id.clone(),
            environment: self.config.environment.as_str(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLERS
// ═══════════════════════════════════════════════════════════════════════════════

const ORDER_FAILED: &str = "Order creation failed";

pub async fn create_order_handler(
    State(state): State<Arc<PayPalState>>,
    Json(request): Json<CreateOrderRequest>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    let amount = Amount::from_value(&request.amount).map_err(|e| e.into_api(ORDER_FAILED))?;
    let currency: Currency = request.currency.parse().map_err(|e: GatewayError| e.into_api(ORDER_FAILED))?;

    tracing::info!("[PAYPAL] creating order for {} {}", amount, currency);

    let order = state
        .create_order(amount, currency)
        .await
        .map_err(|e| e.into_api(ORDER_FAILED))?;

    tracing::info!("[PAYPAL] order created: {}", order["id"]);
    Ok(Json(order))
}

pub async fn test_request_handler(State(state): State<Arc<PayPalState>>) -> Json<Diagnostics> {
    tracing::debug!("[PAYPAL] diagnostic request");
    Json(state.diagnostics())
}
