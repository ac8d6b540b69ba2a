//! # Payment Requests
//!
//! The immutable input of a checkout: what is being paid for, how much,
//! and through which method.

use crate::error::{PaymentError, PaymentResult};
use crate::money::{Currency, Price};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Maximum description length accepted by the backend
pub const MAX_DESCRIPTION_LEN: usize = 255;

/// Payment method selected by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Tokenize-then-confirm card flow
    Card,
    /// Create order / hosted approval / capture flow
    Redirect,
    /// Mobile push prompt plus status polling
    Push,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Redirect => "redirect",
            PaymentMethod::Push => "push",
        }
    }

    /// Name of the provider behind this method on the backend contract
    pub fn provider_name(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "stripe",
            PaymentMethod::Redirect => "paypal",
            PaymentMethod::Push => "mpesa",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "card" | "stripe" => Ok(PaymentMethod::Card),
            "redirect" | "paypal" => Ok(PaymentMethod::Redirect),
            "push" | "mpesa" => Ok(PaymentMethod::Push),
            other => Err(PaymentError::InvalidRequest(format!(
                "unknown payment method: {}",
                other
            ))),
        }
    }
}

/// Payer information collected by the billing form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayerDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Raw phone number as typed (push flow)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    /// Payment-method token already produced by the card widget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_token: Option<String>,
}

impl PayerDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_card_token(mut self, token: impl Into<String>) -> Self {
        self.card_token = Some(token.into());
        self
    }
}

/// A request to pay for a portfolio or plan.
///
/// Amount and currency are fixed at creation. Resubmitting after a failure
/// means building a new request, which carries a new idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Unique request ID (generated)
    pub request_id: String,

    pub method: PaymentMethod,

    /// Amount in the request's base currency
    pub amount: Price,

    /// Portfolio or plan being paid for
    pub subject_id: String,

    pub description: String,

    #[serde(default)]
    pub payer: PayerDetails,

    /// Sent to the backend so a double submit cannot create two charges
    pub idempotency_key: String,

    pub created_at: DateTime<Utc>,
}

impl PaymentRequest {
    /// Create a new request with generated ID and idempotency key
    pub fn new(
        method: PaymentMethod,
        amount: Price,
        subject_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            method,
            amount,
            subject_id: subject_id.into(),
            description: description.into(),
            payer: PayerDetails::default(),
            idempotency_key: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
        }
    }

    /// Set payer details
    pub fn with_payer(mut self, payer: PayerDetails) -> Self {
        self.payer = payer;
        self
    }

    /// Set idempotency key
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = key.into();
        self
    }

    pub fn currency(&self) -> Currency {
        self.amount.currency
    }

    /// Reject requests that can never succeed, before any session exists
    pub fn validate(&self) -> PaymentResult<()> {
        if self.amount.amount <= 0 {
            return Err(PaymentError::InvalidRequest(format!(
                "amount must be positive, got {}",
                self.amount.display()
            )));
        }
        if self.subject_id.trim().is_empty() {
            return Err(PaymentError::InvalidRequest(
                "subject_id is required".to_string(),
            ));
        }
        if self.description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(PaymentError::InvalidRequest(format!(
                "description exceeds {} characters",
                MAX_DESCRIPTION_LEN
            )));
        }
        if self.idempotency_key.trim().is_empty() {
            return Err(PaymentError::InvalidRequest(
                "idempotency_key must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
