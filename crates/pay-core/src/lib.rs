//! # pay-core
//!
//! Core types and traits for the folio-checkout orchestration layer.
//!
//! This crate provides:
//! - `PaymentAdapter` trait and `AdapterRegistry` for the per-provider flows
//! - `PaymentRequest`, `PaymentSession` and `PaymentOutcome` for the checkout lifecycle
//! - `PaymentBackend`, `CardTokenSource` and `CardConfirmer` seams for I/O
//! - `StatusPoller` for bounded, cancellable status polling
//! - `PhoneRules` and `ConversionTable` for input normalization
//! - `PaymentError` / `ErrorKind` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use pay_core::{Currency, PaymentMethod, PaymentRequest, PayerDetails, Price};
//!
//! let request = PaymentRequest::new(
//!     PaymentMethod::Push,
//!     Price::new(19.00, Currency::USD),
//!     "plan_pro",
//!     "Pro plan, monthly",
//! )
//! .with_payer(PayerDetails::new().with_phone("0712345678"));
//!
//! let handle = coordinator.checkout(request)?;
//! match handle.outcome().await.into_result() {
//!     Ok(receipt) => println!("paid: {}", receipt.payment_id),
//!     Err(failure) => println!("not paid: {}", failure),
//! }
//! ```

pub mod adapter;
pub mod backend;
pub mod cancel;
pub mod error;
pub mod money;
pub mod outcome;
pub mod phone;
pub mod poller;
pub mod request;
pub mod session;

// Re-exports for convenience
pub use adapter::{
    AdapterContext, AdapterRegistry, ApprovalDelegate, ApprovalEvent, ApprovalInbox,
    BoxedPaymentAdapter, PaymentAdapter,
};
pub use backend::{
    CaptureResponse, CardConfirmStatus, CardConfirmation, CardConfirmer, CardToken,
    CardTokenSource, InitiateRequest, InitiateResponse, PaymentBackend, PushState,
    PushStatusResponse,
};
pub use cancel::CancelToken;
pub use error::{ErrorKind, PaymentError, PaymentResult};
pub use money::{ConversionRate, ConversionTable, Currency, Price};
pub use outcome::{
    outcome_channel, CheckoutFailure, CheckoutObserver, OutcomeReceiver, OutcomeSender,
    PaymentOutcome, PaymentReceipt,
};
pub use phone::{normalize_phone, PhoneRules};
pub use poller::{PollOutcome, PollerConfig, ProbeStatus, StatusPoller};
pub use request::{PayerDetails, PaymentMethod, PaymentRequest};
pub use session::{PaymentSession, SessionHandle, SessionStatus};
