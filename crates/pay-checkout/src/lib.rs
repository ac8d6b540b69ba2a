//! # pay-checkout
//!
//! The three payment adapters, the checkout coordinator, and the HTTP
//! clients they run against.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pay_checkout::{
//!     standard_registry, CardConfirmClient, CheckoutCoordinator, CheckoutSettings, HttpBackend,
//! };
//! use std::sync::Arc;
//!
//! let settings = CheckoutSettings::load("config/checkout.toml")?;
//! let backend = Arc::new(HttpBackend::from_env()?);
//! let confirmer = Arc::new(CardConfirmClient::from_env()?);
//!
//! let coordinator = CheckoutCoordinator::from_settings(
//!     standard_registry(backend, confirmer, &settings),
//!     &settings,
//! );
//!
//! let handle = coordinator.checkout(request)?;
//! let outcome = handle.outcome().await;
//! ```

pub mod backend;
pub mod card;
pub mod card_confirm;
pub mod config;
pub mod coordinator;
mod flow;
pub mod mock;
pub mod push;
pub mod redirect;

#[cfg(test)]
mod test_support;

pub use backend::HttpBackend;
pub use card::{CardAdapter, ForwardedCardToken};
pub use card_confirm::{intent_id_from_secret, CardConfirmClient};
pub use config::{BackendConfig, CardProviderConfig, CheckoutSettings, PushSettings, SessionSettings};
pub use coordinator::{standard_registry, CheckoutCoordinator, CheckoutHandle};
pub use push::PushAdapter;
pub use redirect::{CreatedOrder, RedirectAdapter};
