//! # Money Types
//!
//! Currencies, prices and settlement conversion.
//! Amounts are held in the smallest currency unit; the backend wire format
//! uses decimal major units.

use crate::error::{PaymentError, PaymentResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Supported currencies (ISO 4217)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    USD,
    EUR,
    GBP,
    JPY,
    CAD,
    AUD,
    CHF,
    MXN,
    /// Kenyan shilling, settlement currency of the mobile-money provider
    KES,
}

impl Currency {
    /// Returns the ISO 4217 currency code
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::JPY => "JPY",
            Currency::CAD => "CAD",
            Currency::AUD => "AUD",
            Currency::CHF => "CHF",
            Currency::MXN => "MXN",
            Currency::KES => "KES",
        }
    }

    /// Returns the number of decimal places for this currency
    /// (JPY has 0 decimals, most others have 2)
    pub fn decimal_places(&self) -> u8 {
        match self {
            Currency::JPY => 0,
            _ => 2,
        }
    }

    /// Convert a decimal amount to the smallest currency unit (cents, etc.)
    pub fn to_smallest_unit(&self, amount: f64) -> i64 {
        let multiplier = 10_f64.powi(self.decimal_places() as i32);
        (amount * multiplier).round() as i64
    }

    /// Convert from smallest unit back to decimal
    pub fn from_smallest_unit(&self, amount: i64) -> f64 {
        let divisor = 10_f64.powi(self.decimal_places() as i32);
        amount as f64 / divisor
    }

    fn symbol(&self) -> &'static str {
        match self {
            Currency::USD => "$",
            Currency::EUR => "€",
            Currency::GBP => "£",
            Currency::JPY => "¥",
            Currency::CAD => "C$",
            Currency::AUD => "A$",
            Currency::CHF => "CHF ",
            Currency::MXN => "MX$",
            Currency::KES => "KSh ",
        }
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::USD
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            "GBP" => Ok(Currency::GBP),
            "JPY" => Ok(Currency::JPY),
            "CAD" => Ok(Currency::CAD),
            "AUD" => Ok(Currency::AUD),
            "CHF" => Ok(Currency::CHF),
            "MXN" => Ok(Currency::MXN),
            "KES" => Ok(Currency::KES),
            other => Err(PaymentError::InvalidRequest(format!(
                "unknown currency code: {}",
                other
            ))),
        }
    }
}

/// Price with amount in smallest currency unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in smallest currency unit (cents for USD)
    pub amount: i64,
    /// Currency
    pub currency: Currency,
}

impl Price {
    /// Create a new price from decimal amount
    pub fn new(amount: f64, currency: Currency) -> Self {
        Self {
            amount: currency.to_smallest_unit(amount),
            currency,
        }
    }

    /// Create a price from smallest unit (cents)
    pub fn from_cents(amount: i64, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Get the decimal amount
    pub fn as_decimal(&self) -> f64 {
        self.currency.from_smallest_unit(self.amount)
    }

    /// Format for display (e.g., "$10.00")
    pub fn display(&self) -> String {
        let symbol = self.currency.symbol();
        if self.currency.decimal_places() == 0 {
            format!("{}{}", symbol, self.amount)
        } else {
            format!("{}{:.2}", symbol, self.as_decimal())
        }
    }
}

/// A fixed conversion rate between two currencies
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConversionRate {
    pub from: Currency,
    pub to: Currency,
    /// Units of `to` per one unit of `from`
    pub rate: f64,
}

impl ConversionRate {
    pub fn new(from: Currency, to: Currency, rate: f64) -> Self {
        Self { from, to, rate }
    }

    /// Apply the rate. The price must be denominated in `from`.
    fn apply(&self, price: &Price) -> PaymentResult<Price> {
        if price.currency != self.from {
            return Err(PaymentError::UnsupportedCurrency {
                from: price.currency.to_string(),
                to: self.to.to_string(),
            });
        }
        Ok(Price::new(price.as_decimal() * self.rate, self.to))
    }
}

/// Table of fixed settlement rates, keyed by (from, to)
#[derive(Debug, Clone, Default)]
pub struct ConversionTable {
    rates: HashMap<(Currency, Currency), f64>,
}

impl ConversionTable {
    pub fn new() -> Self {
        Self {
            rates: HashMap::new(),
        }
    }

    /// Register a rate
    pub fn insert(&mut self, rate: ConversionRate) {
        self.rates.insert((rate.from, rate.to), rate.rate);
    }

    /// Builder: register a rate
    pub fn with_rate(mut self, from: Currency, to: Currency, rate: f64) -> Self {
        self.insert(ConversionRate::new(from, to, rate));
        self
    }

    pub fn rate(&self, from: Currency, to: Currency) -> Option<ConversionRate> {
        self.rates
            .get(&(from, to))
            .map(|rate| ConversionRate::new(from, to, *rate))
    }

    /// Convert `price` into `target`. Same-currency conversion is the identity.
    pub fn convert(&self, price: &Price, target: Currency) -> PaymentResult<Price> {
        if price.currency == target {
            return Ok(*price);
        }
        let rate = self
            .rate(price.currency, target)
            .ok_or_else(|| PaymentError::UnsupportedCurrency {
                from: price.currency.to_string(),
                to: target.to_string(),
            })?;
        rate.apply(price)
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

impl FromIterator<ConversionRate> for ConversionTable {
    fn from_iter<I: IntoIterator<Item = ConversionRate>>(iter: I) -> Self {
        let mut table = ConversionTable::new();
        for rate in iter {
            table.insert(rate);
        }
        table
    }
}
