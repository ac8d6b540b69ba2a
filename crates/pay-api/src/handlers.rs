//! # Request Handlers
//!
//! Axum request handlers for the checkout API. Starting a checkout returns
//! immediately with the session; the outcome is read from the status route
//! once the adapter resolves.

use crate::state::{AppState, CheckoutView, Lookup};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use pay_core::{
    Currency, PayerDetails, PaymentError, PaymentMethod, PaymentOutcome, PaymentRequest, Price,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Start checkout request
#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    /// "card", "redirect" or "push" (provider names are accepted too)
    pub method: String,
    /// Decimal amount in `currency`
    pub amount: f64,
    pub currency: Currency,
    /// Portfolio or plan being paid for
    pub subject_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub payer: PayerDetails,
    /// Idempotency key (optional, generated when absent)
    #[serde(default)]
    pub idempotency_key: Option<String>,
    /// Client checkout instance (a browser tab or widget). Only one session
    /// runs per instance; a fresh instance is created when absent.
    #[serde(default)]
    pub checkout_id: Option<String>,
}

/// Session view returned by every checkout route
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub checkout_id: String,
    pub subject_id: String,
    pub method: PaymentMethod,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
    /// Amount submitted to the provider, after settlement conversion
    pub settled_amount: String,
    pub attempts: u32,
    pub expires_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<PaymentOutcome>,
}

impl From<CheckoutView> for CheckoutResponse {
    fn from(view: CheckoutView) -> Self {
        let session = view.session;
        Self {
            session_id: session.session_id,
            checkout_id: view.checkout_id,
            subject_id: view.subject_id,
            method: session.method,
            status: session.status.to_string(),
            external_ref: session.external_ref,
            settled_amount: session.settled_amount.display(),
            attempts: session.attempts,
            expires_at: session.expires_at.to_rfc3339(),
            outcome: view.outcome,
        }
    }
}

/// Body of the approve callback
#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub order_id: String,
}

/// Body of the provider-error callback
#[derive(Debug, Deserialize)]
pub struct ProviderErrorRequest {
    #[serde(default)]
    pub message: Option<String>,
}

/// Result of a delegate callback
#[derive(Debug, Serialize)]
pub struct DelegateResponse {
    pub session_id: String,
    /// False when an earlier callback already decided the session
    pub accepted: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: error.into(),
            code,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn payment_error_to_response(err: PaymentError) -> ApiError {
    let code = err.status_code();
    let response = ErrorResponse::new(err.to_string(), code).with_details(err.kind().as_str());
    (StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), Json(response))
}

fn redirect_only(session_id: &str) -> ApiError {
    (
        StatusCode::CONFLICT,
        Json(ErrorResponse::new(
            format!("Session {} has no hosted approval step", session_id),
            409,
        )),
    )
}

/// Delegate callback on a session that already resolved: too late for a
/// redirect, meaningless for any other method
fn resolved_delegate(session_id: &str, view: &CheckoutView) -> Result<bool, ApiError> {
    if view.session.method == PaymentMethod::Redirect {
        Ok(false)
    } else {
        Err(redirect_only(session_id))
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let methods: Vec<_> = state.registry.methods().iter().map(|m| m.as_str()).collect();
    Json(serde_json::json!({
        "status": "healthy",
        "service": "folio-checkout",
        "version": env!("CARGO_PKG_VERSION"),
        "methods": methods,
        "live_sessions": state.live_count(),
        "unread_outcomes": state.unread_count(),
    }))
}

/// Start a checkout for a subject
#[instrument(skip(state, request), fields(method = %request.method, subject_id = %request.subject_id))]
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(request): Json<CreateCheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let method: PaymentMethod = request.method.parse().map_err(payment_error_to_response)?;

    if !request.amount.is_finite() {
        return Err(payment_error_to_response(PaymentError::InvalidRequest(
            "amount must be a finite number".to_string(),
        )));
    }

    let mut payment = PaymentRequest::new(
        method,
        Price::new(request.amount, request.currency),
        request.subject_id,
        request.description,
    )
    .with_payer(request.payer);

    if let Some(key) = request.idempotency_key {
        payment = payment.with_idempotency_key(key);
    }

    let view = state
        .start_checkout(request.checkout_id, payment)
        .map_err(|e| {
        warn!("Checkout rejected: {}", e);
        payment_error_to_response(e)
    })?;

    info!(
        "Started checkout: session={}, settled={}",
        view.session.session_id,
        view.session.settled_amount.display()
    );

    Ok((StatusCode::ACCEPTED, Json(view.into())))
}

/// Session status, plus the outcome once resolved
pub async fn get_checkout(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let view = state.view(&session_id).map_err(payment_error_to_response)?;
    Ok(Json(view.into()))
}

/// Hosted approval finished: capture the order
#[instrument(skip(state, body))]
pub async fn approve_checkout(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<ApproveRequest>,
) -> Result<Json<DelegateResponse>, ApiError> {
    let accepted = match state.lookup(&session_id).map_err(payment_error_to_response)? {
        Lookup::Live(tracked) => tracked
            .approval
            .ok_or_else(|| redirect_only(&session_id))?
            .on_approved(body.order_id),
        Lookup::Resolved(view) => resolved_delegate(&session_id, &view)?,
    };
    info!(accepted, "Approval callback received");

    Ok(Json(DelegateResponse {
        session_id,
        accepted,
    }))
}

/// User abandoned the checkout
#[instrument(skip(state))]
pub async fn cancel_checkout(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<DelegateResponse>, ApiError> {
    let accepted = match state.lookup(&session_id).map_err(payment_error_to_response)? {
        Lookup::Live(tracked) => {
            let accepted = match &tracked.approval {
                Some(delegate) => delegate.on_cancelled(),
                None => !tracked.session.status().is_terminal(),
            };
            tracked.cancel.cancel();
            accepted
        }
        Lookup::Resolved(_) => false,
    };
    info!(accepted, "Cancel requested");

    Ok(Json(DelegateResponse {
        session_id,
        accepted,
    }))
}

/// Hosted approval UI reported an error
#[instrument(skip(state, body))]
pub async fn provider_error(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<ProviderErrorRequest>,
) -> Result<Json<DelegateResponse>, ApiError> {
    let message = body
        .message
        .unwrap_or_else(|| "payment provider reported an error".to_string());
    error!("Hosted approval error: {}", message);

    let accepted = match state.lookup(&session_id).map_err(payment_error_to_response)? {
        Lookup::Live(tracked) => tracked
            .approval
            .ok_or_else(|| redirect_only(&session_id))?
            .on_provider_error(message),
        Lookup::Resolved(view) => resolved_delegate(&session_id, &view)?,
    };

    Ok(Json(DelegateResponse {
        session_id,
        accepted,
    }))
}
