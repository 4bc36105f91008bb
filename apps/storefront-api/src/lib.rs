//! # Storefront API
//!
//! HTTP server for order placement, coupon preview, price quotes and the
//! return lifecycle.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Storefront API                                 │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌──────────────────────────┐   │
//! │  │  Orders        │  │  Coupons       │  │  Returns                 │   │
//! │  │                │  │                │  │                          │   │
//! │  │ • POST /orders │  │ • POST apply   │  │ • POST /returns          │   │
//! │  │ • GET  (admin) │  │ • POST (admin) │  │ • GET  (admin) / mine    │   │
//! │  │ • GET  mine    │  │ • GET  (admin) │  │ • GET  /:id              │   │
//! │  │ • GET  /:id    │  │ • GET/PUT/DEL  │  │ • PUT  status / refund   │   │
//! │  │ • PUT  pay     │  │   /:id (admin) │  │ • PUT  quality-check     │   │
//! │  │ • PUT  deliver │  │  Pricing       │  │ • PUT  cancel            │   │
//! │  │ • GET  returns │  │ • POST quote   │  │                          │   │
//! │  └────────────────┘  └────────────────┘  └──────────────────────────┘   │
//! │          │                   │                        │                 │
//! │          ▼                   ▼                        ▼                 │
//! │  storefront-core (pure rules)  ──►  storefront-db (guarded writes)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! See [`config::Settings`]. Environment variables use the `STOREFRONT__`
//! prefix, e.g. `STOREFRONT__DATABASE_PATH`.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use storefront_core::placement::PlacementValidator;
use storefront_core::pricing::PricingPolicy;
use storefront_core::returns::ReturnPolicy;
use storefront_db::Database;

pub use config::Settings;
pub use error::{ApiError, ApiResult};

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub db: Database,
    pub pricing: PricingPolicy,
    pub placement: PlacementValidator,
    pub returns: ReturnPolicy,
}

impl AppState {
    pub fn new(db: Database, settings: &Settings) -> Self {
        AppState {
            db,
            pricing: settings.pricing_policy(),
            placement: settings.placement_validator(),
            returns: settings.return_policy(),
        }
    }

    /// Default business rules over `db`.
    pub fn with_defaults(db: Database) -> Self {
        AppState {
            db,
            pricing: PricingPolicy::default(),
            placement: PlacementValidator::default(),
            returns: ReturnPolicy::default(),
        }
    }
}

pub type SharedState = Arc<AppState>;

/// Builds the full router.
pub fn router(state: SharedState) -> Router {
    use handlers::{coupons, health, orders, pricing, returns};

    Router::new()
        .route("/health", get(health::health))
        .route("/orders", post(orders::place_order).get(orders::list_orders))
        .route("/orders/mine", get(orders::my_orders))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/pay", put(orders::pay_order))
        .route("/orders/:id/deliver", put(orders::deliver_order))
        .route("/orders/:id/returns", get(returns::list_for_order))
        .route("/coupons", post(coupons::create_coupon).get(coupons::list_coupons))
        .route("/coupons/apply", post(coupons::apply_coupon))
        .route(
            "/coupons/:id",
            get(coupons::get_coupon)
                .put(coupons::update_coupon)
                .delete(coupons::delete_coupon),
        )
        .route("/pricing/quote", post(pricing::quote))
        .route("/returns", post(returns::create_return).get(returns::list_returns))
        .route("/returns/mine", get(returns::my_returns))
        .route("/returns/:id", get(returns::get_return))
        .route("/returns/:id/status", put(returns::update_status))
        .route("/returns/:id/refund", put(returns::process_refund))
        .route("/returns/:id/quality-check", put(returns::quality_check))
        .route("/returns/:id/cancel", put(returns::cancel_return))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
