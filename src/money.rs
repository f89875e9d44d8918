// applepay_gateway/src/money.rs
// Amount and currency value types shared by every checkout route

use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{GatewayError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// AMOUNT
// ═══════════════════════════════════════════════════════════════════════════════

/// Non-negative monetary amount held as integer cents.
/// Always displayed with two fraction digits (`9` -> `"9.00"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount {
    cents: u64,
}

impl Amount {
    pub const fn from_cents(cents: u64) -> Self {
        Self { cents }
    }

    pub fn cents(&self) -> u64 {
        self.cents
    }

    /// Rounds to two decimal places (half away from zero).
    pub fn from_f64(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(GatewayError::InvalidAmount(format!("{} is not finite", value)));
        }
        if value < 0.0 {
            return Err(GatewayError::InvalidAmount(format!("{} is negative", value)));
        }
        let cents = (value * 100.0).round();
        if cents > u64::MAX as f64 {
            return Err(GatewayError::InvalidAmount(format!("{} is too large", value)));
        }
        Ok(Self {
            cents: cents as u64,
        })
    }

    /// Accepts a JSON number or a numeric string.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| GatewayError::InvalidAmount(n.to_string()))
                .and_then(Self::from_f64),
            Value::String(s) => s.parse(),
            Value::Null => Err(GatewayError::InvalidAmount("missing".to_string())),
            other => Err(GatewayError::InvalidAmount(other.to_string())),
        }
    }
}

impl FromStr for Amount {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let value: f64 = trimmed
            .parse()
            .map_err(|_| GatewayError::InvalidAmount(format!("{:?} is not a number", trimmed)))?;
        Self::from_f64(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.cents / 100, self.cents % 100)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CURRENCY
// ═══════════════════════════════════════════════════════════════════════════════

/// Three-letter ISO 4217 code, upper-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Currency(String);

impl Currency {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Currency {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        let code = s.trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(GatewayError::InvalidCurrency(code.to_string()));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Currency {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}
