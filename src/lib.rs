// applepay_gateway/src/lib.rs
// Apple Pay checkout service: direct merchant validation or PayPal-backed orders

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod amount;
pub mod apple_handler;
pub mod checkout;
pub mod config;
pub mod error;
pub mod money;
pub mod paypal_handler;
pub mod tables;
pub mod views;

use amount::FormulaEvaluator;
use apple_handler::{process_payment, validate_merchant, MerchantState};
use checkout::{domain_association, initiate_checkout, payment_callback, CheckoutState};
use config::{Config, Processor};
use error::Result;
use paypal_handler::{create_order_handler, test_request_handler, PayPalState};
use tables::TableStore;
use views::{applepay_script, button_view, paypal_applepay_script, ButtonView};

pub const DOMAIN_ASSOCIATION_PATH: &str =
    "/.well-known/apple-developer-merchantid-domain-association";

/// Processor-specific routes and their state.
#[derive(Clone)]
pub enum Variant {
    Direct(MerchantState),
    PayPal(Arc<PayPalState>),
}

#[derive(Clone)]
pub struct AppState {
    pub checkout: CheckoutState,
    pub view: Arc<ButtonView>,
    pub variant: Variant,
}

impl AppState {
    pub fn from_config(
        config: Config,
        tables: TableStore,
        evaluator: Arc<dyn FormulaEvaluator>,
    ) -> Result<Self> {
        let Config {
            site,
            merchant,
            paypal,
            checkout,
        } = config;

        let view = ButtonView::new(
            site.processor,
            site.button,
            &merchant,
            &paypal,
            checkout.currency.clone(),
        );

        let variant = match site.processor {
            Processor::Direct => Variant::Direct(MerchantState::new(merchant, site.upstream_timeout)),
            Processor::PayPal => {
                Variant::PayPal(Arc::new(PayPalState::new(paypal, site.upstream_timeout)?))
            }
        };

        Ok(Self {
            checkout: CheckoutState::new(site, checkout, tables, evaluator)?,
            view: Arc::new(view),
            variant,
        })
    }
}

pub fn app(state: AppState) -> Router {
    let checkout_router = Router::new()
        .route(DOMAIN_ASSOCIATION_PATH, get(domain_association))
        .route("/applepay/initiate", post(initiate_checkout))
        .route("/applepay/callback", get(payment_callback))
        .with_state(state.checkout);

    let view_router = Router::new()
        .route("/view/applepay-button", get(button_view))
        .route("/applepay/applepay.js", get(applepay_script))
        .route("/applepay/paypal-applepay.js", get(paypal_applepay_script))
        .with_state(state.view);

    let variant_router = match state.variant {
        Variant::Direct(merchant) => Router::new()
            .route("/applepay/validate", post(validate_merchant))
            .route("/applepay/process", post(process_payment))
            .with_state(merchant),
        Variant::PayPal(paypal) => Router::new()
            .route("/applepay/create_order", post(create_order_handler))
            .route("/applepay/test_req", post(test_request_handler))
            .route("/test", get(test_request_handler))
            .with_state(paypal),
    };

    Router::new()
        .merge(checkout_router)
        .merge(view_router)
        .merge(variant_router)
        .route("/health", get(|| async { "OK" }))
        .layer(TraceLayer::new_for_http())
}

/// Loads the tables file, or an empty checkout table when none is configured.
pub fn load_tables(config: &Config) -> Result<TableStore> {
    match &config.site.tables_path {
        Some(path) => {
            tracing::info!("[CHECKOUT] loading tables from {}", path.display());
            TableStore::from_file(path)
        }
        None => {
            tracing::warn!(
                "[CHECKOUT] APPLEPAY_TABLES_PATH not set, starting with an empty {} table",
                config.checkout.table
            );
            TableStore::new(vec![config.checkout.default_table()])
        }
    }
}
