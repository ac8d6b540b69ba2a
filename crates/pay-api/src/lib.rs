//! # pay-api
//!
//! HTTP API layer for folio-checkout-rs.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - One checkout coordinator per client checkout instance
//! - Delegate routes the hosted approval widget calls back into
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | POST | `/api/v1/checkout` | Start a checkout session |
//! | GET | `/api/v1/checkout/{session_id}` | Session status and outcome |
//! | POST | `/api/v1/checkout/{session_id}/approve` | Hosted approval succeeded |
//! | POST | `/api/v1/checkout/{session_id}/cancel` | User abandoned checkout |
//! | POST | `/api/v1/checkout/{session_id}/provider-error` | Hosted approval failed |

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::{AppConfig, AppState, ProviderMode};
