// applepay_gateway/src/checkout.rs
// Checkout action, paid callback and the domain-association file

use axum::{
    extract::{Json, Query, State},
    http::header,
    response::{IntoResponse, Redirect},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::amount::{AmountResolver, FormulaEvaluator};
use crate::config::{CheckoutConfig, SiteConfig};
use crate::error::{ApiError, GatewayError, Result};
use crate::money::{Amount, Currency};
use crate::tables::{FieldKind, RowId, TableStore};

// ═══════════════════════════════════════════════════════════════════════════════
// CHECKOUT STATE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct CheckoutState {
    pub site: Arc<SiteConfig>,
    pub config: Arc<CheckoutConfig>,
    pub tables: TableStore,
    pub resolver: AmountResolver,
}

impl CheckoutState {
    pub fn new(
        site: SiteConfig,
        config: CheckoutConfig,
        tables: TableStore,
        evaluator: Arc<dyn FormulaEvaluator>,
    ) -> Result<Self> {
        let table = tables.schema().table(&config.table)?;
        if table.field(&config.paid_field)?.kind != FieldKind::Bool {
            return Err(GatewayError::Schema(format!(
                "{}.{} must be a Bool field",
                config.table, config.paid_field
            )));
        }

        let resolver = AmountResolver::new(
            tables.schema(),
            &config.table,
            &config.amount_field,
            config.amount_formula.as_deref(),
            evaluator,
        )?;

        Ok(Self {
            site: Arc::new(site),
            config: Arc::new(config),
            tables,
            resolver,
        })
    }

    /// Link to the button view carrying the order metadata.
    pub fn button_link(&self, amount: Amount, currency: &Currency, row_id: &RowId) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("amount", &amount.to_string())
            .append_pair("currency", currency.as_str())
            .append_pair("row_id", row_id.as_str())
            .finish();
        format!("{}{}?{}", self.site.base_url, self.config.button_view_path, query)
    }
}

/// Appends `row_id` to `target`, keeping any query it already has.
fn with_row_id(target: &str, row_id: &RowId) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("row_id", row_id.as_str())
        .finish();
    let separator = if target.contains('?') { '&' } else { '?' };
    format!("{}{}{}", target, separator, query)
}

// ═══════════════════════════════════════════════════════════════════════════════
// DOMAIN VERIFICATION
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn domain_association(State(state): State<CheckoutState>) -> impl IntoResponse {
    tracing::debug!("[CHECKOUT] domain association requested");
    (
        [(header::CONTENT_TYPE, "text/plain")],
        state.site.domain_association.clone(),
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHECKOUT ACTION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct InitiateRequest {
    pub row_id: RowId,
}

#[derive(Debug, Serialize)]
pub struct InitiateResponse {
    pub goto: String,
    pub amount: Amount,
    pub currency: Currency,
    pub row_id: RowId,
}

pub async fn initiate_checkout(
    State(state): State<CheckoutState>,
    Json(request): Json<InitiateRequest>,
) -> std::result::Result<Json<InitiateResponse>, ApiError> {
    let amount = state
        .resolver
        .resolve_row(&state.tables, request.row_id.as_str())
        .await
        .map_err(|e| e.into_api("Checkout failed"))?;
    let currency = state.config.currency.clone();

    tracing::info!(
        "[CHECKOUT] row {} of {} payable {} {}",
        request.row_id,
        state.resolver.table(),
        amount,
        currency
    );

    Ok(Json(InitiateResponse {
        goto: state.button_link(amount, &currency, &request.row_id),
        amount,
        currency,
        row_id: request.row_id,
    }))
}

// ═══════════════════════════════════════════════════════════════════════════════
// PAID CALLBACK
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub status: String,
    pub row_id: RowId,
}

/// Marks the row paid on `status=success`. Unauthenticated GET: anyone who
/// knows a row id can mark it paid until a real `PaymentProcessor` handoff
/// confirms the payment server-side.
pub async fn payment_callback(
    State(state): State<CheckoutState>,
    Query(query): Query<CallbackQuery>,
) -> std::result::Result<Redirect, ApiError> {
    if query.status != "success" {
        tracing::warn!("[CHECKOUT] row {} returned with status {}", query.row_id, query.status);
        return match &state.config.cancel_url {
            Some(cancel) => Ok(Redirect::to(&with_row_id(cancel, &query.row_id))),
            None => Err(ApiError::bad_request("Payment was not successful")),
        };
    }

    state
        .tables
        .set_field(
            &state.config.table,
            query.row_id.as_str(),
            &state.config.paid_field,
            Value::Bool(true),
        )
        .await
        .map_err(|e| e.into_api("Could not record payment"))?;

    tracing::info!("[CHECKOUT] row {} marked {}", query.row_id, state.config.paid_field);
    Ok(Redirect::to(&with_row_id(&state.config.success_url, &query.row_id)))
}
