//! # Payments Backend Client
//!
//! reqwest implementation of the backend REST contract. One client is
//! constructed explicitly and injected into every adapter that needs it.

use crate::config::BackendConfig;
use async_trait::async_trait;
use pay_core::{
    CaptureResponse, InitiateRequest, InitiateResponse, PaymentBackend, PaymentError,
    PaymentResult, PushState, PushStatusResponse,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, instrument};

const INITIATE_PATH: &str = "/payments/initiate";
const PUSH_STATUS_PATH: &str = "/payments/mpesa/status";
const CAPTURE_PATH: &str = "/payments/paypal/capture";

/// HTTP client for the payments backend
#[derive(Debug, Clone)]
pub struct HttpBackend {
    config: BackendConfig,
    client: Client,
}

impl HttpBackend {
    /// Create a new backend client
    pub fn new(config: BackendConfig) -> PaymentResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                PaymentError::Configuration(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    /// Share an existing connection pool
    pub fn with_client(config: BackendConfig, client: Client) -> Self {
        Self { config, client }
    }

    /// Create from environment variables
    pub fn from_env() -> PaymentResult<Self> {
        Self::new(BackendConfig::from_env()?)
    }

    async fn post_json<B, R>(
        &self,
        path: &str,
        body: &B,
        idempotency_key: Option<&str>,
    ) -> PaymentResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.config.url(path);

        let mut request = self.client.post(&url).json(body);
        if let Some(token) = &self.config.api_token {
            request = request.bearer_auth(token);
        }
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PaymentError::NetworkError(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PaymentError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            error!("Backend error: path={}, status={}, body={}", path, status, text);

            let message = serde_json::from_str::<BackendErrorBody>(&text)
                .ok()
                .and_then(|b| b.message.or(b.error))
                .unwrap_or_else(|| format!("HTTP {}: {}", status, text));

            return Err(PaymentError::ProviderError {
                provider: "backend".to_string(),
                message,
            });
        }

        serde_json::from_str(&text).map_err(|e| {
            PaymentError::Serialization(format!("Failed to parse backend response: {}", e))
        })
    }
}

fn rejected(message: Option<String>, fallback: &str) -> PaymentError {
    PaymentError::ProviderError {
        provider: "backend".to_string(),
        message: message.unwrap_or_else(|| fallback.to_string()),
    }
}

#[async_trait]
impl PaymentBackend for HttpBackend {
    #[instrument(skip(self, request), fields(method = %request.method, subject_id = %request.subject_id))]
    async fn initiate(&self, request: &InitiateRequest) -> PaymentResult<InitiateResponse> {
        debug!("Initiating payment: {} {}", request.amount, request.currency);

        let response: InitiateResponse = self
            .post_json(INITIATE_PATH, request, Some(&request.idempotency_key))
            .await?;

        if !response.success {
            return Err(rejected(response.message, "payment initiation rejected"));
        }
        Ok(response)
    }

    #[instrument(skip(self))]
    async fn push_status(&self, checkout_request_id: &str) -> PaymentResult<PushStatusResponse> {
        let body = PushStatusBody {
            checkout_request_id,
        };
        let response: PushStatusBodyResponse = self.post_json(PUSH_STATUS_PATH, &body, None).await?;

        // A reported state is authoritative even when `success` is false:
        // the backend flags a failed or cancelled prompt that way.
        match response.status {
            Some(status) => Ok(PushStatusResponse {
                success: response.success,
                status,
                payment_id: response.payment_id,
                message: response.message,
            }),
            None if !response.success => Err(rejected(response.message, "status check rejected")),
            None => Err(PaymentError::Serialization(
                "status response carried no status".to_string(),
            )),
        }
    }

    #[instrument(skip(self, idempotency_key))]
    async fn capture_order(
        &self,
        order_id: &str,
        idempotency_key: &str,
    ) -> PaymentResult<CaptureResponse> {
        let body = CaptureBody { order_id };
        let response: CaptureResponse = self
            .post_json(CAPTURE_PATH, &body, Some(idempotency_key))
            .await?;

        if !response.success {
            return Err(rejected(response.message, "capture rejected"));
        }
        Ok(response)
    }
}

// =============================================================================
// Backend wire bodies
// =============================================================================

#[derive(Debug, Serialize)]
struct PushStatusBody<'a> {
    #[serde(rename = "checkoutRequestID")]
    checkout_request_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CaptureBody<'a> {
    order_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushStatusBodyResponse {
    success: bool,
    #[serde(default)]
    status: Option<PushState>,
    #[serde(default)]
    payment_id: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BackendErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}
