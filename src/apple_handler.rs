// applepay_gateway/src/apple_handler.rs
// Direct Apple Pay: merchant validation over mutual TLS and the payment process hook

use async_trait::async_trait;
use axum::{
    extract::{Json, State},
    response::IntoResponse,
};
use reqwest::{Client, Identity, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::MerchantConfig;
use crate::error::{ApiError, GatewayError, Result};
use crate::money::{Amount, Currency};
use crate::tables::RowId;

// ═══════════════════════════════════════════════════════════════════════════════
// WIRE TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    #[serde(rename = "validationURL")]
    pub validation_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MerchantValidationBody<'a> {
    merchant_identifier: &'a str,
    domain_name: &'a str,
    display_name: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub token: Value,
    pub row_id: RowId,
    pub amount: Value,
    pub currency: String,
}

/// Authorized payment handed to the [`PaymentProcessor`].
#[derive(Debug, Clone)]
pub struct PaymentAuthorization {
    /// Apple Pay payment token, opaque to this service.
    pub token: Value,
    pub row_id: RowId,
    pub amount: Amount,
    pub currency: Currency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessOutcome {
    pub status: PaymentStatus,
    pub row_id: RowId,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PAYMENT PROCESSOR EXTENSION POINT
// ═══════════════════════════════════════════════════════════════════════════════

/// Hands an authorized Apple Pay token to a payment service provider.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn process(&self, authorization: PaymentAuthorization) -> Result<PaymentStatus>;
}

/// Placeholder that reports success without looking at the token.
/// Replace with a real PSP handoff before taking live payments.
pub struct AcceptAllProcessor;

#[async_trait]
impl PaymentProcessor for AcceptAllProcessor {
    async fn process(&self, authorization: PaymentAuthorization) -> Result<PaymentStatus> {
        tracing::warn!(
            "[APPLEPAY] accepting {} {} for row {} without a payment processor",
            authorization.amount,
            authorization.currency,
            authorization.row_id
        );
        Ok(PaymentStatus::Success)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MERCHANT STATE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct MerchantState {
    pub config: Arc<MerchantConfig>,
    pub timeout: Option<Duration>,
    pub processor: Arc<dyn PaymentProcessor>,
}

impl MerchantState {
    pub fn new(config: MerchantConfig, timeout: Option<Duration>) -> Self {
        Self {
            config: Arc::new(config),
            timeout,
            processor: Arc::new(AcceptAllProcessor),
        }
    }

    pub fn with_processor(mut self, processor: Arc<dyn PaymentProcessor>) -> Self {
        self.processor = processor;
        self
    }

    /// Rejects URLs that are not https on an allowed validation host.
    pub fn check_validation_url(&self, raw: &str) -> Result<Url> {
        let url = Url::parse(raw).map_err(|e| GatewayError::ValidationUrl(e.to_string()))?;
        let hosts = &self.config.validation_hosts;
        if hosts.is_empty() {
            return Ok(url);
        }
        if url.scheme() != "https" {
            return Err(GatewayError::ValidationUrl(format!("{} must use https", raw)));
        }

        let host = url
            .host_str()
            .ok_or_else(|| GatewayError::ValidationUrl(format!("{} has no host", raw)))?;
        let allowed = hosts
            .iter()
            .any(|allowed| host == allowed || host.ends_with(&format!(".{}", allowed)));
        if !allowed {
            return Err(GatewayError::ValidationUrl(format!("host {} is not allowed", host)));
        }
        Ok(url)
    }

    /// Client carrying the merchant identity. The bundle is read on every call.
    async fn identity_client(&self) -> Result<Client> {
        let der = tokio::fs::read(&self.config.identity_path).await?;
        let identity = Identity::from_pkcs12_der(&der, &self.config.identity_password)
            .map_err(|e| GatewayError::Identity(e.to_string()))?;

        let mut builder = Client::builder().identity(identity);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }

    /// POSTs the merchant details to Apple and returns the merchant session verbatim.
    pub async fn request_merchant_session(&self, validation_url: &str) -> Result<Value> {
        let url = self.check_validation_url(validation_url)?;
        let client = self.identity_client().await?;

        let body = MerchantValidationBody {
            merchant_identifier: &self.config.merchant_id,
            domain_name: &self.config.domain_name,
            display_name: &self.config.display_name,
        };

        let resp = client.post(url).json(&body).send().await?;
        if resp.status() != StatusCode::OK {
            return Err(GatewayError::Upstream {
                context: "Apple merchant validation",
                status: resp.status().as_u16(),
            });
        }

        Ok(resp.json().await?)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLERS
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn validate_merchant(
    State(state): State<MerchantState>,
    Json(request): Json<ValidateRequest>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    tracing::info!("[APPLEPAY] merchant validation via {}", request.validation_url);

    let session = state
        .request_merchant_session(&request.validation_url)
        .await
        .map_err(|e| e.into_api("Merchant validation failed"))?;

    Ok(Json(session))
}

pub async fn process_payment(
    State(state): State<MerchantState>,
    Json(request): Json<ProcessRequest>,
) -> std::result::Result<Json<ProcessOutcome>, ApiError> {
    let authorization = PaymentAuthorization {
        amount: Amount::from_value(&request.amount).map_err(|e| e.into_api("Payment failed"))?,
        currency: request.currency.parse().map_err(|e: GatewayError| e.into_api("Payment failed"))?,
        token: request.token,
        row_id: request.row_id,
    };
    let row_id = authorization.row_id.clone();

    let status = match state.processor.process(authorization).await {
        Ok(status) => status,
        Err(e) => {
            tracing::error!("[APPLEPAY] payment processing failed for row {}: {}", row_id, e);
            PaymentStatus::Failure
        }
    };

    tracing::info!("[APPLEPAY] payment for row {}: {:?}", row_id, status);
    Ok(Json(ProcessOutcome { status, row_id }))
}
