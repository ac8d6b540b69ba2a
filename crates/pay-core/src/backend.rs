//! # Backend Contract
//!
//! Wire types for the payments backend REST API and the traits the adapters
//! call through. Concrete HTTP clients live in `pay-checkout`; tests inject
//! in-memory implementations.
//!
//! | Call | Endpoint |
//! |------|----------|
//! | [`PaymentBackend::initiate`] | `POST /payments/initiate` |
//! | [`PaymentBackend::push_status`] | `POST /payments/mpesa/status` |
//! | [`PaymentBackend::capture_order`] | `POST /payments/paypal/capture` |
//! | [`CardConfirmer::confirm`] | card provider hosted confirm |

use crate::error::PaymentResult;
use crate::money::{Currency, Price};
use crate::request::PaymentRequest;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Body of `POST /payments/initiate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateRequest {
    pub method: String,

    /// Decimal major units in `currency`
    pub amount: f64,

    pub currency: Currency,

    pub subject_id: String,

    pub description: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Also sent as the `Idempotency-Key` header
    #[serde(skip)]
    pub idempotency_key: String,
}

impl InitiateRequest {
    /// Build from a request and the amount actually being settled
    pub fn from_request(request: &PaymentRequest, settled: &Price) -> Self {
        Self {
            method: request.method.provider_name().to_string(),
            amount: settled.as_decimal(),
            currency: settled.currency,
            subject_id: request.subject_id.clone(),
            description: request.description.clone(),
            phone_number: None,
            email: request.payer.email.clone(),
            idempotency_key: request.idempotency_key.clone(),
        }
    }

    pub fn with_phone_number(mut self, msisdn: impl Into<String>) -> Self {
        self.phone_number = Some(msisdn.into());
        self
    }
}

/// Response of `POST /payments/initiate`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateResponse {
    pub success: bool,

    #[serde(default)]
    pub payment_id: Option<String>,

    /// Card flow
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Redirect flow
    #[serde(default)]
    pub order_id: Option<String>,

    /// Push flow
    #[serde(default, rename = "checkoutRequestID")]
    pub checkout_request_id: Option<String>,

    #[serde(default)]
    pub message: Option<String>,
}

/// Provider-side state of a push payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushState {
    Pending,
    Completed,
    Failed,
}

/// Response of `POST /payments/mpesa/status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushStatusResponse {
    pub success: bool,

    pub status: PushState,

    #[serde(default)]
    pub payment_id: Option<String>,

    #[serde(default)]
    pub message: Option<String>,
}

/// Response of `POST /payments/paypal/capture`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResponse {
    pub success: bool,

    #[serde(default)]
    pub payment_id: Option<String>,

    #[serde(default)]
    pub message: Option<String>,
}

/// Payments backend REST contract
#[async_trait]
pub trait PaymentBackend: Send + Sync {
    /// First call of every flow
    async fn initiate(&self, request: &InitiateRequest) -> PaymentResult<InitiateResponse>;

    /// One status probe for a push payment
    async fn push_status(&self, checkout_request_id: &str) -> PaymentResult<PushStatusResponse>;

    /// Capture an approved redirect order
    async fn capture_order(
        &self,
        order_id: &str,
        idempotency_key: &str,
    ) -> PaymentResult<CaptureResponse>;
}

/// Opaque payment-method token produced by the card widget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardToken(pub String);

impl CardToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Provider-side state after a confirm call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardConfirmStatus {
    Succeeded,
    Processing,
    RequiresAction,
    RequiresPaymentMethod,
    Canceled,
}

/// Result of a card confirm round trip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardConfirmation {
    /// Payment intent id
    pub intent_id: String,
    pub status: CardConfirmStatus,
    pub decline_code: Option<String>,
}

/// Source of card tokens (the card-input widget)
#[async_trait]
pub trait CardTokenSource: Send + Sync {
    async fn create_token(&self, request: &PaymentRequest) -> PaymentResult<CardToken>;
}

/// Card provider confirm operation
#[async_trait]
pub trait CardConfirmer: Send + Sync {
    /// Confirm once. Declines, validation failures and transport errors come
    /// back as distinct `PaymentError` variants.
    async fn confirm(
        &self,
        client_secret: &str,
        token: &CardToken,
    ) -> PaymentResult<CardConfirmation>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{PayerDetails, PaymentMethod};
    use serde_json::json;

    #[test]
    fn test_initiate_request_wire_format() {
        let request = PaymentRequest::new(
            PaymentMethod::Push,
            Price::new(19.00, Currency::USD),
            "plan_pro",
            "Pro plan",
        )
        .with_payer(PayerDetails::new().with_email("ada@example.com"));
        let settled = Price::new(2470.0, Currency::KES);

        let body = InitiateRequest::from_request(&request, &settled).with_phone_number("254712345678");
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["method"], "mpesa");
        assert_eq!(json["amount"], 2470.0);
        assert_eq!(json["currency"], "KES");
        assert_eq!(json["subjectId"], "plan_pro");
        assert_eq!(json["phoneNumber"], "254712345678");
        assert!(json.get("idempotencyKey").is_none());
    }

    #[test]
    fn test_initiate_response_parsing() {
        let response: InitiateResponse = serde_json::from_value(json!({
            "success": true,
            "paymentId": "pay_1",
            "checkoutRequestID": "ws_CO_01"
        }))
        .unwrap();

        assert!(response.success);
        assert_eq!(response.checkout_request_id.as_deref(), Some("ws_CO_01"));
        assert!(response.client_secret.is_none());
    }

    #[test]
    fn test_push_status_parsing() {
        let response: PushStatusResponse = serde_json::from_value(json!({
            "success": true,
            "status": "completed",
            "paymentId": "pay_2"
        }))
        .unwrap();

        assert_eq!(response.status, PushState::Completed);
        assert_eq!(response.payment_id.as_deref(), Some("pay_2"));
    }
}
