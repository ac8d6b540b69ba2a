//! # pay-wasm
//!
//! WebAssembly bindings for folio-checkout-rs.
//!
//! The billing form runs the same checks the checkout service does, so a
//! malformed phone number or an unsupported currency is caught before the
//! user presses "Pay":
//! - Phone normalization for push payments
//! - Settlement quotes (what the payer will actually be charged)
//! - Payment method names
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { normalize_phone, settlement_quote } from 'folio-checkout-wasm';
//!
//! await init();
//!
//! const msisdn = normalize_phone('0712 345 678');   // "254712345678"
//! const quote = settlement_quote(19.0, 'USD', 'KES', [
//!   { from: 'USD', to: 'KES', rate: 130.0 }
//! ]);
//! console.log(quote.display);                        // "KSh 2470.00"
//! ```
//!
//! ## Building
//!
//! ```bash
//! wasm-pack build --target web
//! ```

use pay_core::{
    ConversionRate, ConversionTable, Currency, PaymentError, PaymentMethod, PaymentResult,
    PhoneRules, Price,
};
use serde::Serialize;
use wasm_bindgen::prelude::*;

/// Amount the payer is charged after conversion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementQuote {
    pub amount: f64,
    pub currency: Currency,
    pub display: String,
}

fn to_js_error(err: PaymentError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Normalize a phone number for the push provider (Kenyan rules)
#[wasm_bindgen]
pub fn normalize_phone(input: &str) -> Result<String, JsValue> {
    pay_core::normalize_phone(input).map_err(to_js_error)
}

/// Normalize with explicit numbering rules
#[wasm_bindgen]
pub fn normalize_phone_with(
    input: &str,
    country_prefix: &str,
    national_digits: usize,
) -> Result<String, JsValue> {
    PhoneRules::new(country_prefix, national_digits)
        .normalize(input)
        .map_err(to_js_error)
}

/// Whether the input would be accepted for a push payment
#[wasm_bindgen]
pub fn is_valid_phone(input: &str) -> bool {
    pay_core::normalize_phone(input).is_ok()
}

/// Canonical method name ("card", "redirect", "push") for a method or
/// provider name
#[wasm_bindgen]
pub fn canonical_method(name: &str) -> Result<String, JsValue> {
    canonical(name).map_err(to_js_error)
}

fn canonical(name: &str) -> PaymentResult<String> {
    let method: PaymentMethod = name.parse()?;
    Ok(method.as_str().to_string())
}

/// Quote the amount charged in `target` for `amount` in `currency`.
///
/// `rates` is an array of `{ from, to, rate }` objects.
#[wasm_bindgen]
pub fn settlement_quote(
    amount: f64,
    currency: &str,
    target: &str,
    rates: JsValue,
) -> Result<JsValue, JsValue> {
    let rates: Vec<ConversionRate> = serde_wasm_bindgen::from_value(rates)
        .map_err(|e| JsValue::from_str(&format!("Invalid conversion rates: {}", e)))?;

    let quote = quote(amount, currency, target, rates).map_err(to_js_error)?;
    serde_wasm_bindgen::to_value(&quote).map_err(|e| JsValue::from_str(&e.to_string()))
}

fn quote(
    amount: f64,
    currency: &str,
    target: &str,
    rates: impl IntoIterator<Item = ConversionRate>,
) -> PaymentResult<SettlementQuote> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(PaymentError::InvalidRequest(
            "amount must be positive".to_string(),
        ));
    }

    let table: ConversionTable = rates.into_iter().collect();
    let settled = table.convert(&Price::new(amount, currency.parse()?), target.parse()?)?;

    Ok(SettlementQuote {
        amount: settled.as_decimal(),
        currency: settled.currency,
        display: settled.display(),
    })
}

/// Format a decimal amount for display
#[wasm_bindgen]
pub fn format_amount(amount: f64, currency: &str) -> Result<String, JsValue> {
    let currency: Currency = currency.parse().map_err(to_js_error)?;
    Ok(Price::new(amount, currency).display())
}

/// Log to browser console
#[wasm_bindgen]
pub fn log(message: &str) {
    web_sys::console::log_1(&JsValue::from_str(message));
}

/// Get library version
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kes_rates() -> Vec<ConversionRate> {
        vec![ConversionRate::new(Currency::USD, Currency::KES, 130.0)]
    }

    #[test]
    fn test_quote_usd_to_kes() {
        let quote = quote(19.0, "usd", "KES", kes_rates()).unwrap();
        assert_eq!(quote.amount, 2470.0);
        assert_eq!(quote.currency, Currency::KES);
        assert_eq!(quote.display, "KSh 2470.00");
    }

    #[test]
    fn test_quote_same_currency_is_identity() {
        let quote = quote(12.5, "EUR", "EUR", Vec::new()).unwrap();
        assert_eq!(quote.amount, 12.5);
    }

    #[test]
    fn test_quote_rejections() {
        assert!(matches!(
            quote(19.0, "EUR", "KES", kes_rates()),
            Err(PaymentError::UnsupportedCurrency { .. })
        ));
        assert!(quote(0.0, "USD", "KES", kes_rates()).is_err());
        assert!(quote(19.0, "XYZ", "KES", kes_rates()).is_err());
    }

    #[test]
    fn test_canonical_method() {
        assert_eq!(canonical("mpesa").unwrap(), "push");
        assert_eq!(canonical("PayPal").unwrap(), "redirect");
        assert!(canonical("cash").is_err());
    }

    #[test]
    fn test_phone_validity() {
        assert!(is_valid_phone("+254 712 345 678"));
        assert!(!is_valid_phone("12345"));
    }
}
