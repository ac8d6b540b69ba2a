//! # Folio Checkout
//!
//! Checkout service for portfolio and plan purchases.
//!
//! ## Usage
//!
//! ```bash
//! # Set environment variables
//! export BACKEND_BASE_URL=https://api.example.com
//! export BACKEND_API_TOKEN=...
//! export CARD_PUBLISHABLE_KEY=pk_test_...
//!
//! # Or run without providers
//! export CHECKOUT_MODE=mock
//!
//! # Run the server
//! folio-checkout
//! ```

use pay_api::{routes, state::AppState};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    if json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    print_banner();

    let state = AppState::new()?;

    let addr = state.config.socket_addr()?;
    let is_prod = state.config.is_production();

    info!("Environment: {}", state.config.environment);
    info!("Provider mode: {:?}", state.config.mode);
    info!("Payment methods: {:?}", state.registry.methods());

    let app = routes::create_router(state);

    info!("🚀 Folio Checkout starting on http://{}", addr);

    if !is_prod {
        info!("📝 Health: http://{}/health", addr);
        info!("💳 Checkout: POST http://{}/api/v1/checkout", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
  ◆ Folio Checkout RS ◆
  ━━━━━━━━━━━━━━━━━━━━━━━
  Card · Redirect · Push
  Version: {}

"#,
        env!("CARGO_PKG_VERSION")
    );
}
