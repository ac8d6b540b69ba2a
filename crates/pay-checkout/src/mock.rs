//! # In-memory Providers
//!
//! Scripted `PaymentBackend` and `CardConfirmer` implementations that record
//! every call. Used by the adapter tests and by the API service when it runs
//! without a real backend.

use async_trait::async_trait;
use pay_core::{
    CaptureResponse, CardConfirmStatus, CardConfirmation, CardConfirmer, CardToken,
    InitiateRequest, InitiateResponse, PaymentBackend, PaymentError, PaymentMethod, PaymentResult,
    PushState, PushStatusResponse,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// One recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Initiate(InitiateRequest),
    PushStatus { checkout_request_id: String },
    Capture { order_id: String, idempotency_key: String },
}

/// Scripted answer to one push status probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushProbe {
    Pending,
    Completed,
    Failed,
    TransportError,
}

/// Backend with scripted behavior
#[derive(Debug)]
pub struct MockBackend {
    initiate_failure: Option<String>,
    omit_reference: bool,
    push_script: Mutex<VecDeque<PushProbe>>,
    push_default: PushProbe,
    capture_failure: Option<String>,
    calls: Mutex<Vec<BackendCall>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Accepts everything; push probes stay pending
    pub fn new() -> Self {
        Self {
            initiate_failure: None,
            omit_reference: false,
            push_script: Mutex::new(VecDeque::new()),
            push_default: PushProbe::Pending,
            capture_failure: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_initiate(mut self, message: impl Into<String>) -> Self {
        self.initiate_failure = Some(message.into());
        self
    }

    /// Initiate succeeds but carries no client secret / order id / request id
    pub fn without_reference(mut self) -> Self {
        self.omit_reference = true;
        self
    }

    /// Answers for successive probes, then `default` forever
    pub fn with_push_script(
        mut self,
        script: impl IntoIterator<Item = PushProbe>,
        default: PushProbe,
    ) -> Self {
        self.push_script = Mutex::new(script.into_iter().collect());
        self.push_default = default;
        self
    }

    pub fn failing_capture(mut self, message: impl Into<String>) -> Self {
        self.capture_failure = Some(message.into());
        self
    }

    fn record(&self, call: BackendCall) {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(call);
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn initiate_calls(&self) -> Vec<InitiateRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::Initiate(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn status_probes(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, BackendCall::PushStatus { .. }))
            .count()
    }

    pub fn captures(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, BackendCall::Capture { .. }))
            .count()
    }
}

fn mock_id(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}_{}", prefix, &id[..12])
}

#[async_trait]
impl PaymentBackend for MockBackend {
    async fn initiate(&self, request: &InitiateRequest) -> PaymentResult<InitiateResponse> {
        self.record(BackendCall::Initiate(request.clone()));

        if let Some(message) = &self.initiate_failure {
            return Err(PaymentError::ProviderError {
                provider: "mock".to_string(),
                message: message.clone(),
            });
        }

        let mut response = InitiateResponse {
            success: true,
            payment_id: Some(mock_id("mock_pay")),
            ..Default::default()
        };
        if self.omit_reference {
            return Ok(response);
        }

        match request.method.parse::<PaymentMethod>()? {
            PaymentMethod::Card => {
                response.client_secret = Some(format!("{}_secret_mock", mock_id("pi")));
            }
            PaymentMethod::Redirect => {
                response.order_id = Some(mock_id("ORDER"));
            }
            PaymentMethod::Push => {
                response.checkout_request_id = Some(mock_id("ws_CO"));
            }
        }
        Ok(response)
    }

    async fn push_status(&self, checkout_request_id: &str) -> PaymentResult<PushStatusResponse> {
        self.record(BackendCall::PushStatus {
            checkout_request_id: checkout_request_id.to_string(),
        });

        let probe = self
            .push_script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .unwrap_or(self.push_default);

        let (status, payment_id, message) = match probe {
            PushProbe::Pending => (PushState::Pending, None, None),
            PushProbe::Completed => (PushState::Completed, Some(mock_id("mock_pay")), None),
            PushProbe::Failed => (
                PushState::Failed,
                None,
                Some("Request cancelled by user".to_string()),
            ),
            PushProbe::TransportError => {
                return Err(PaymentError::NetworkError("connection reset".to_string()));
            }
        };

        Ok(PushStatusResponse {
            success: true,
            status,
            payment_id,
            message,
        })
    }

    async fn capture_order(
        &self,
        order_id: &str,
        idempotency_key: &str,
    ) -> PaymentResult<CaptureResponse> {
        self.record(BackendCall::Capture {
            order_id: order_id.to_string(),
            idempotency_key: idempotency_key.to_string(),
        });

        if let Some(message) = &self.capture_failure {
            return Err(PaymentError::ProviderError {
                provider: "mock".to_string(),
                message: message.clone(),
            });
        }

        Ok(CaptureResponse {
            success: true,
            payment_id: Some(mock_id("mock_pay")),
            message: None,
        })
    }
}

/// Scripted card confirm result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmBehavior {
    Succeed,
    Decline(String),
    Invalid(String),
    Network(String),
}

/// Card confirmer with a fixed behavior and a call counter
#[derive(Debug)]
pub struct MockCardConfirmer {
    behavior: ConfirmBehavior,
    calls: AtomicU32,
}

impl MockCardConfirmer {
    pub fn new(behavior: ConfirmBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockCardConfirmer {
    fn default() -> Self {
        Self::new(ConfirmBehavior::Succeed)
    }
}

#[async_trait]
impl CardConfirmer for MockCardConfirmer {
    async fn confirm(
        &self,
        client_secret: &str,
        _token: &CardToken,
    ) -> PaymentResult<CardConfirmation> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let intent_id = crate::card_confirm::intent_id_from_secret(client_secret)?.to_string();
        match &self.behavior {
            ConfirmBehavior::Succeed => Ok(CardConfirmation {
                intent_id,
                status: CardConfirmStatus::Succeeded,
                decline_code: None,
            }),
            ConfirmBehavior::Decline(code) => Err(PaymentError::PaymentDeclined {
                reason: code.clone(),
            }),
            ConfirmBehavior::Invalid(message) => Err(PaymentError::CardValidation(message.clone())),
            ConfirmBehavior::Network(message) => Err(PaymentError::NetworkError(message.clone())),
        }
    }
}
