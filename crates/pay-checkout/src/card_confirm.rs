//! # Card Provider Confirm
//!
//! Client-side confirmation of a payment intent with the publishable key.
//! The backend creates the intent and hands back its client secret; this
//! module attaches the card token and confirms exactly once.

use crate::config::CardProviderConfig;
use async_trait::async_trait;
use pay_core::{
    CardConfirmStatus, CardConfirmation, CardConfirmer, CardToken, PaymentError, PaymentResult,
};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{error, info, instrument};

/// Confirms payment intents against the card provider API
#[derive(Debug, Clone)]
pub struct CardConfirmClient {
    config: CardProviderConfig,
    client: Client,
}

impl CardConfirmClient {
    pub fn new(config: CardProviderConfig) -> PaymentResult<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                PaymentError::Configuration(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    /// Create from environment variables
    pub fn from_env() -> PaymentResult<Self> {
        Self::new(CardProviderConfig::from_env()?)
    }
}

/// Intent id embedded in a client secret (`pi_123_secret_abc` -> `pi_123`)
pub fn intent_id_from_secret(client_secret: &str) -> PaymentResult<&str> {
    match client_secret.split_once("_secret_") {
        Some((intent, secret)) if !intent.is_empty() && !secret.is_empty() => Ok(intent),
        _ => Err(PaymentError::InitiationFailed(
            "malformed client secret from backend".to_string(),
        )),
    }
}

#[async_trait]
impl CardConfirmer for CardConfirmClient {
    #[instrument(skip(self, client_secret, token))]
    async fn confirm(
        &self,
        client_secret: &str,
        token: &CardToken,
    ) -> PaymentResult<CardConfirmation> {
        let intent_id = intent_id_from_secret(client_secret)?;
        let url = format!(
            "{}/v1/payment_intents/{}/confirm",
            self.config.api_base_url, intent_id
        );

        let form_params = [
            ("client_secret", client_secret),
            ("payment_method", token.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.config.auth_header())
            .header("Stripe-Version", &self.config.api_version)
            .form(&form_params)
            .send()
            .await
            .map_err(|e| PaymentError::NetworkError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PaymentError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            error!("Card confirm error: status={}, body={}", status, body);

            if let Ok(error_response) = serde_json::from_str::<CardErrorResponse>(&body) {
                return Err(error_response.error.into_payment_error());
            }

            return Err(PaymentError::ProviderError {
                provider: "stripe".to_string(),
                message: format!("HTTP {}: {}", status, body),
            });
        }

        let intent: PaymentIntentResponse = serde_json::from_str(&body).map_err(|e| {
            PaymentError::Serialization(format!("Failed to parse confirm response: {}", e))
        })?;

        info!("Confirmed payment intent: id={}, status={:?}", intent.id, intent.status);

        // A soft decline comes back as 200 with the intent reset to
        // requires_payment_method.
        let decline_code = match intent.last_payment_error {
            Some(last_error) if intent.status == CardConfirmStatus::RequiresPaymentMethod => {
                return Err(last_error.into_payment_error());
            }
            Some(last_error) => last_error.decline_code.or(last_error.code),
            None => None,
        };

        Ok(CardConfirmation {
            intent_id: intent.id,
            status: intent.status,
            decline_code,
        })
    }
}

// =============================================================================
// Card provider API types
// =============================================================================

#[derive(Debug, Deserialize)]
struct PaymentIntentResponse {
    id: String,
    status: CardConfirmStatus,
    #[serde(default)]
    last_payment_error: Option<CardApiError>,
}

#[derive(Debug, Deserialize)]
struct CardErrorResponse {
    error: CardApiError,
}

#[derive(Debug, Deserialize)]
struct CardApiError {
    #[serde(rename = "type", default)]
    error_type: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    decline_code: Option<String>,
}

impl CardApiError {
    fn into_payment_error(self) -> PaymentError {
        let message = self
            .message
            .unwrap_or_else(|| "card provider error".to_string());
        let code = self.code.as_deref().unwrap_or_default();

        match self.error_type.as_deref() {
            Some("card_error") if code == "card_declined" || code == "expired_card" => {
                PaymentError::PaymentDeclined {
                    reason: self.decline_code.unwrap_or(message),
                }
            }
            Some("card_error")
                if code.starts_with("incorrect_")
                    || code.starts_with("invalid_")
                    || code.starts_with("incomplete_") =>
            {
                PaymentError::CardValidation(message)
            }
            Some("card_error") => PaymentError::PaymentDeclined {
                reason: self.decline_code.unwrap_or(message),
            },
            Some("validation_error") => PaymentError::CardValidation(message),
            _ => PaymentError::ProviderError {
                provider: "stripe".to_string(),
                message,
            },
        }
    }
}
