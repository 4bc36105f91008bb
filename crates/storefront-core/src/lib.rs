//! # storefront-core: Pure Business Logic for the Storefront
//!
//! This crate holds every pricing, coupon, stock, order and return rule as
//! pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Storefront Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  storefront-api (axum)                          │   │
//! │  │   /orders  /coupons  /pricing/quote  /returns                   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ storefront-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────────────┐  │   │
//! │  │   │  money   │ │ pricing  │ │  coupon  │ │  customization   │  │   │
//! │  │   │  cart    │ │  stock   │ │ placement│ │  returns/refund  │  │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘ └──────────────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • `now` IS A PARAMETER     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                storefront-db (SQLite via sqlx)                  │   │
//! │  │     conditional decrements, status compare-and-set, JSON cols   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Money type with integer arithmetic
//! - [`types`] - Products, payment methods, addresses, actors
//! - [`customization`] - Tailoring options and their surcharges
//! - [`cart`] - Client-side cart operations
//! - [`coupon`] - Coupon rules and rejection reasons
//! - [`pricing`] - The single pricing function used by preview and placement
//! - [`stock`] - Aggregated inventory checks
//! - [`placement`] - Authoritative order validation
//! - [`order`] - The frozen order record
//! - [`returns`] - Return request state machine
//! - [`refund`] - Refund amount calculation
//! - [`validation`] - Field-level input checks
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **One pricing function**: the cart preview and the placement validator
//!    call the same [`pricing::PricingPolicy::price`]
//! 2. **Integer Money**: every amount is in cents; rates are basis points
//! 3. **Frozen snapshots**: orders keep the prices they were placed at
//! 4. **Explicit Errors**: all errors are typed and carry a stable code
//!
//! ## Example Usage
//!
//! ```rust
//! use storefront_core::money::Money;
//! use storefront_core::pricing::PricingPolicy;
//! use storefront_core::types::TaxRate;
//!
//! let policy = PricingPolicy::default();
//! let breakdown = policy.breakdown(Money::from_dollars(125), Money::from_dollars(25));
//!
//! // $100 after discount is not strictly above the threshold, so shipping applies
//! assert_eq!(breakdown.shipping_price, Money::from_dollars(10));
//! assert_eq!(breakdown.tax_price, Money::from_dollars(100).calculate_tax(TaxRate::from_bps(1500)));
//! assert_eq!(breakdown.total_price, Money::from_dollars(125));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod coupon;
pub mod customization;
pub mod error;
pub mod money;
pub mod order;
pub mod placement;
pub mod pricing;
pub mod refund;
pub mod returns;
pub mod stock;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines in a cart or order.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity on a single line.
///
/// ## Business Reason
/// Catches typos like 1000 instead of 10 before they reach stock checks.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Days after delivery during which a return may be opened.
pub const RETURN_WINDOW_DAYS: i64 = 30;
