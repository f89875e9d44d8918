// applepay_gateway/src/views.rs
// Apple Pay button page and the client scripts it loads

use axum::{
    extract::{Query, State},
    http::header,
    response::{Html, IntoResponse},
};
use html_escape::encode_double_quoted_attribute;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{ButtonConfig, MerchantConfig, PayPalConfig, Processor};
use crate::error::{ApiError, GatewayError};
use crate::money::{Amount, Currency};
use crate::tables::RowId;

const APPLEPAY_JS: &str = include_str!("../public/applepay.js");
const PAYPAL_APPLEPAY_JS: &str = include_str!("../public/paypal-applepay.js");
const APPLE_SDK_URL: &str = "https://applepay.cdn-apple.com/jsapi/v1/apple-pay-sdk.js";

// ═══════════════════════════════════════════════════════════════════════════════
// VIEW STATE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct PayPalClient {
    pub client_id: String,
    pub environment: &'static str,
}

/// Everything the button page needs, fixed at startup.
#[derive(Debug, Clone)]
pub struct ButtonView {
    pub processor: Processor,
    pub button: ButtonConfig,
    pub merchant_id: String,
    pub display_name: String,
    pub supported_networks: Vec<String>,
    pub locale: String,
    pub country_code: String,
    pub default_currency: Currency,
    pub callback_path: String,
    pub paypal: Option<PayPalClient>,
}

impl ButtonView {
    pub fn new(
        processor: Processor,
        button: ButtonConfig,
        merchant: &MerchantConfig,
        paypal: &PayPalConfig,
        default_currency: Currency,
    ) -> Self {
        Self {
            processor,
            button,
            merchant_id: merchant.merchant_id.clone(),
            display_name: merchant.display_name.clone(),
            supported_networks: merchant.supported_networks.clone(),
            locale: merchant.locale.clone(),
            country_code: merchant.country_code.clone(),
            default_currency,
            callback_path: "/applepay/callback".to_string(),
            paypal: (processor == Processor::PayPal).then(|| PayPalClient {
                client_id: paypal.client_id.clone(),
                environment: paypal.environment.as_str(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ButtonQuery {
    pub amount: Option<String>,
    pub currency: Option<String>,
    pub row_id: Option<RowId>,
}

/// JSON block read by the client scripts.
#[derive(Debug, Serialize)]
struct ClientConfig<'a> {
    merchant_id: &'a str,
    display_name: &'a str,
    supported_networks: &'a [String],
    currency: &'a Currency,
    locale: &'a str,
    country_code: &'a str,
    amount: Amount,
    row_id: &'a RowId,
    callback_path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    environment: Option<&'static str>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// RENDERING
// ═══════════════════════════════════════════════════════════════════════════════

/// JSON that is safe inside a `<script>` element.
fn script_json<T: Serialize>(value: &T) -> Result<String, GatewayError> {
    Ok(serde_json::to_string(value)?.replace('<', "\\u003c"))
}

pub fn render_button_page(
    view: &ButtonView,
    amount: Amount,
    currency: &Currency,
    row_id: &RowId,
) -> Result<String, GatewayError> {
    let config = ClientConfig {
        merchant_id: &view.merchant_id,
        display_name: &view.display_name,
        supported_networks: &view.supported_networks,
        currency,
        locale: &view.locale,
        country_code: &view.country_code,
        amount,
        row_id,
        callback_path: &view.callback_path,
        client_id: view.paypal.as_ref().map(|p| p.client_id.as_str()),
        environment: view.paypal.as_ref().map(|p| p.environment),
    };

    let scripts = match &view.paypal {
        Some(paypal) => {
            let sdk = url::form_urlencoded::Serializer::new(String::new())
                .append_pair("client-id", &paypal.client_id)
                .append_pair("components", "applepay")
                .append_pair("currency", currency.as_str())
                .finish();
            format!(
                "<script src=\"https://www.paypal.com/sdk/js?{}\"></script>\n    \
                 <script src=\"{}\"></script>\n    \
                 <script src=\"/applepay/paypal-applepay.js\" defer></script>",
                encode_double_quoted_attribute(&sdk),
                APPLE_SDK_URL
            )
        }
        None => format!(
            "<script src=\"{}\"></script>\n    \
             <script src=\"/applepay/applepay.js\" defer></script>",
            APPLE_SDK_URL
        ),
    };

    let row_attr = format!(
        " data-row-id=\"{}\"",
        encode_double_quoted_attribute(row_id.as_str())
    );

    Ok(format!(
        r#"<!DOCTYPE html>
<html lang="{locale}">
  <head>
    <meta charset="utf-8">
    <style>
      apple-pay-button {{
        --apple-pay-button-width: 240px;
        --apple-pay-button-height: 44px;
      }}
    </style>
    {scripts}
  </head>
  <body{row_attr}>
    <apple-pay-button buttonstyle="{style}" type="{kind}" locale="{locale}"{row_attr}></apple-pay-button>
    <script id="applepay-config" type="application/json">{config}</script>
  </body>
</html>
"#,
        locale = encode_double_quoted_attribute(&view.locale),
        scripts = scripts,
        row_attr = row_attr,
        style = view.button.style.as_str(),
        kind = view.button.kind.as_str(),
        config = script_json(&config)?,
    ))
}

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLERS
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn button_view(
    State(view): State<Arc<ButtonView>>,
    Query(query): Query<ButtonQuery>,
) -> Result<Html<String>, ApiError> {
    let amount: Amount = query
        .amount
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("amount is required"))?
        .parse()
        .map_err(|e: GatewayError| e.into_api("Could not render button"))?;
    let currency = match query.currency.as_deref() {
        Some(code) => code.parse().map_err(|e: GatewayError| e.into_api("Could not render button"))?,
        None => view.default_currency.clone(),
    };

    // Without a row the paid callback has nothing to mark, so never open the sheet.
    let row_id = query
        .row_id
        .as_ref()
        .ok_or_else(|| ApiError::bad_request("row_id is required"))?;

    let page = render_button_page(&view, amount, &currency, row_id)
        .map_err(|e| e.into_api("Could not render button"))?;
    Ok(Html(page))
}

pub async fn applepay_script() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/javascript")], APPLEPAY_JS)
}

pub async fn paypal_applepay_script() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/javascript")], PAYPAL_APPLEPAY_JS)
}
