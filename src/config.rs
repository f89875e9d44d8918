// applepay_gateway/src/config.rs
// Environment-driven configuration, handed to each component at construction

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::amount::FORMULA_SELECTOR;
use crate::error::{GatewayError, Result};
use crate::money::Currency;
use crate::tables::{FieldKind, FieldSchema, TableDefinition, TableSchema};

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn var_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROCESSOR / BUTTON CHOICES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Processor {
    /// Server performs merchant validation with its own identity certificate.
    Direct,
    PayPal,
}

impl FromStr for Processor {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" | "apple" => Ok(Self::Direct),
            "paypal" => Ok(Self::PayPal),
            other => Err(GatewayError::Config(format!("unknown processor {:?}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonStyle {
    Black,
    White,
    WhiteOutline,
}

impl ButtonStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Black => "black",
            Self::White => "white",
            Self::WhiteOutline => "white-outline",
        }
    }
}

impl FromStr for ButtonStyle {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "black" => Ok(Self::Black),
            "white" => Ok(Self::White),
            "white-outline" => Ok(Self::WhiteOutline),
            other => Err(GatewayError::Config(format!("unknown button style {:?}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonType {
    Buy,
    Donate,
    Plain,
    CheckOut,
    SetUp,
    Book,
}

impl ButtonType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Donate => "donate",
            Self::Plain => "plain",
            Self::CheckOut => "check-out",
            Self::SetUp => "set-up",
            Self::Book => "book",
        }
    }
}

impl FromStr for ButtonType {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "buy" => Ok(Self::Buy),
            "donate" => Ok(Self::Donate),
            "plain" => Ok(Self::Plain),
            "check-out" => Ok(Self::CheckOut),
            "set-up" => Ok(Self::SetUp),
            "book" => Ok(Self::Book),
            other => Err(GatewayError::Config(format!("unknown button type {:?}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonConfig {
    pub style: ButtonStyle,
    pub kind: ButtonType,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            style: ButtonStyle::Black,
            kind: ButtonType::Buy,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SITE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub port: u16,
    /// Prefix for generated links; empty keeps them relative.
    pub base_url: String,
    pub processor: Processor,
    /// Contents of apple-developer-merchantid-domain-association.
    pub domain_association: String,
    pub tables_path: Option<PathBuf>,
    pub upstream_timeout: Option<Duration>,
    pub button: ButtonConfig,
}

impl SiteConfig {
    pub fn from_env() -> Result<Self> {
        let port = var_or("PORT", "3000")
            .parse()
            .map_err(|_| GatewayError::Config("PORT must be a port number".into()))?;

        let domain_association = match var_opt("APPLEPAY_DOMAIN_ASSOCIATION_PATH") {
            Some(path) => std::fs::read_to_string(path)?,
            None => var_or("APPLEPAY_DOMAIN_ASSOCIATION", ""),
        };

        let upstream_timeout = var_opt("UPSTREAM_TIMEOUT_SECS")
            .map(|secs| {
                secs.parse()
                    .map(Duration::from_secs)
                    .map_err(|_| GatewayError::Config("UPSTREAM_TIMEOUT_SECS must be an integer".into()))
            })
            .transpose()?;

        Ok(Self {
            port,
            base_url: var_or("BASE_URL", "").trim_end_matches('/').to_string(),
            processor: var_or("APPLEPAY_PROCESSOR", "direct").parse()?,
            domain_association,
            tables_path: var_opt("APPLEPAY_TABLES_PATH").map(PathBuf::from),
            upstream_timeout,
            button: ButtonConfig {
                style: var_or("APPLEPAY_BUTTON_STYLE", "black").parse()?,
                kind: var_or("APPLEPAY_BUTTON_TYPE", "buy").parse()?,
            },
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// APPLE PAY MERCHANT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct MerchantConfig {
    pub merchant_id: String,
    pub display_name: String,
    /// Domain registered with Apple, sent as `domainName`.
    pub domain_name: String,
    pub supported_networks: Vec<String>,
    pub identity_path: PathBuf,
    pub identity_password: String,
    /// Validation URLs must be on one of these hosts or a subdomain. Empty allows any.
    pub validation_hosts: Vec<String>,
    pub locale: String,
    pub country_code: String,
}

impl MerchantConfig {
    pub fn from_env() -> Self {
        Self {
            merchant_id: var_or("APPLEPAY_MERCHANT_ID", "merchant.placeholder"),
            display_name: var_or("APPLEPAY_DISPLAY_NAME", "Store"),
            domain_name: var_or("APPLEPAY_DOMAIN_NAME", "localhost"),
            supported_networks: list(&var_or(
                "APPLEPAY_SUPPORTED_NETWORKS",
                "visa,masterCard,amex,discover",
            )),
            identity_path: PathBuf::from(var_or("APPLEPAY_IDENTITY_PATH", "certs/merchant_id.p12")),
            identity_password: var_or("APPLEPAY_IDENTITY_PASSWORD", ""),
            validation_hosts: list(&var_or("APPLEPAY_VALIDATION_HOSTS", "apple.com")),
            locale: var_or("APPLEPAY_LOCALE", "en-US"),
            country_code: var_or("APPLEPAY_COUNTRY_CODE", "US"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PAYPAL
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayPalEnvironment {
    Sandbox,
    Production,
}

impl PayPalEnvironment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sandbox => "sandbox",
            Self::Production => "production",
        }
    }
}

impl FromStr for PayPalEnvironment {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Ok(Self::Sandbox),
            "production" | "live" => Ok(Self::Production),
            other => Err(GatewayError::Config(format!("unknown PayPal environment {:?}", other))),
        }
    }
}

#[derive(Clone)]
pub struct PayPalConfig {
    pub client_id: String,
    pub client_secret: String,
    pub environment: PayPalEnvironment,
    /// Replaces the environment's API host when set.
    pub api_base: Option<String>,
}

impl PayPalConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            client_id: var_or("PAYPAL_CLIENT_ID", "sb_client_id_placeholder"),
            client_secret: var_or("PAYPAL_CLIENT_SECRET", "sb_client_secret_placeholder"),
            environment: var_or("PAYPAL_ENVIRONMENT", "sandbox").parse()?,
            api_base: var_opt("PAYPAL_API_BASE"),
        })
    }

    pub fn base_url(&self) -> &str {
        if let Some(base) = &self.api_base {
            return base.trim_end_matches('/');
        }
        match self.environment {
            PayPalEnvironment::Sandbox => "https://api-m.sandbox.paypal.com",
            PayPalEnvironment::Production => "https://api-m.paypal.com",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHECKOUT ACTION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub table: String,
    /// Field name, `fk.field`, or `Formula`.
    pub amount_field: String,
    pub amount_formula: Option<String>,
    /// Bool field set once the payment succeeds.
    pub paid_field: String,
    pub currency: Currency,
    pub button_view_path: String,
    pub success_url: String,
    pub cancel_url: Option<String>,
}

impl CheckoutConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            table: var_or("APPLEPAY_TABLE", "orders"),
            amount_field: var_or("APPLEPAY_AMOUNT_FIELD", "amount"),
            amount_formula: var_opt("APPLEPAY_AMOUNT_FORMULA"),
            paid_field: var_or("APPLEPAY_PAID_FIELD", "paid"),
            currency: var_or("APPLEPAY_CURRENCY", "USD").parse()?,
            button_view_path: var_or("APPLEPAY_BUTTON_VIEW_PATH", "/view/applepay-button"),
            success_url: var_or("APPLEPAY_SUCCESS_URL", "/view/thankyou"),
            cancel_url: var_opt("APPLEPAY_CANCEL_URL"),
        })
    }

    /// Empty checkout table holding just the amount and paid fields.
    pub fn default_table(&self) -> TableDefinition {
        let mut fields = vec![FieldSchema::new(&self.paid_field, FieldKind::Bool)];
        if self.amount_field != FORMULA_SELECTOR && !self.amount_field.contains('.') {
            fields.insert(0, FieldSchema::new(&self.amount_field, FieldKind::Float));
        }
        TableDefinition {
            schema: TableSchema::new(&self.table, fields),
            rows: Vec::new(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// AGGREGATE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct Config {
    pub site: SiteConfig,
    pub merchant: MerchantConfig,
    pub paypal: PayPalConfig,
    pub checkout: CheckoutConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            site: SiteConfig::from_env()?,
            merchant: MerchantConfig::from_env(),
            paypal: PayPalConfig::from_env()?,
            checkout: CheckoutConfig::from_env()?,
        })
    }
}
