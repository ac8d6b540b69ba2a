//! # Phone Normalization
//!
//! Mobile-money prompts are addressed to an international MSISDN without
//! the leading `+`. Malformed input is rejected here, before any network call.

use crate::error::{PaymentError, PaymentResult};
use serde::{Deserialize, Serialize};

/// National numbering rules for the push provider's market
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneRules {
    /// Country calling code, digits only (e.g. "254")
    #[serde(default = "default_country_prefix")]
    pub country_prefix: String,

    /// Subscriber digits after the country code
    #[serde(default = "default_national_digits")]
    pub national_digits: usize,
}

fn default_country_prefix() -> String {
    "254".to_string()
}

fn default_national_digits() -> usize {
    9
}

impl Default for PhoneRules {
    fn default() -> Self {
        Self {
            country_prefix: default_country_prefix(),
            national_digits: default_national_digits(),
        }
    }
}

impl PhoneRules {
    pub fn new(country_prefix: impl Into<String>, national_digits: usize) -> Self {
        Self {
            country_prefix: country_prefix.into(),
            national_digits,
        }
    }

    /// Normalize to `<prefix><national digits>`.
    ///
    /// Non-digits are stripped, a leading trunk `0` becomes the country
    /// prefix, and a missing prefix is added.
    pub fn normalize(&self, input: &str) -> PaymentResult<String> {
        let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();

        let normalized = if let Some(rest) = digits.strip_prefix('0') {
            format!("{}{}", self.country_prefix, rest)
        } else if digits.starts_with(&self.country_prefix) {
            digits
        } else {
            format!("{}{}", self.country_prefix, digits)
        };

        if self.is_valid(&normalized) {
            Ok(normalized)
        } else {
            Err(PaymentError::InvalidPhoneNumber {
                input: input.to_string(),
            })
        }
    }

    /// Whether `msisdn` matches `^<prefix>\d{national_digits}$`
    pub fn is_valid(&self, msisdn: &str) -> bool {
        match msisdn.strip_prefix(self.country_prefix.as_str()) {
            Some(rest) => {
                rest.len() == self.national_digits && rest.chars().all(|c| c.is_ascii_digit())
            }
            None => false,
        }
    }
}

/// Normalize with the default (Kenyan) rules
pub fn normalize_phone(input: &str) -> PaymentResult<String> {
    PhoneRules::default().normalize(input)
}
