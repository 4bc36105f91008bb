//! # Stock Checker
//!
//! Validates requested quantities against a snapshot of inventory.
//!
//! ## Aggregation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  lines                              requests                            │
//! │  ──────────────────────────         ──────────────────────────          │
//! │  suit 40R ×1 (peak lapel)    ─┐                                         │
//! │  suit 40R ×1 (shawl lapel)   ─┴──►  suit 40R ×2   vs  40R available 1   │
//! │  tie  (no size) ×3           ────►  tie       ×3   vs  count_in_stock 5  │
//! │                                                                         │
//! │  Two lines for the same scarce size cannot each pass on their own.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every violation is collected, not just the first. The check reads a
//! snapshot; storage repeats the `available ≥ requested` predicate in its
//! conditional decrement, so the checked [`Reservation`]s are what get
//! written.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::cart::CartLine;
use crate::types::Product;

// =============================================================================
// Types
// =============================================================================

/// An aggregated, checked quantity for one product (and size).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub product_id: String,
    /// `None` for products without sized inventory.
    pub size: Option<String>,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockViolation {
    #[error("{}: available {available}, requested {requested}", describe(.product_id, .size))]
    #[serde(rename_all = "camelCase")]
    OutOfStock {
        product_id: String,
        size: Option<String>,
        available: i64,
        requested: i64,
    },

    #[error("product {product_id} not found")]
    #[serde(rename_all = "camelCase")]
    ProductNotFound { product_id: String },
}

impl StockViolation {
    pub fn code(&self) -> &'static str {
        match self {
            StockViolation::OutOfStock { .. } => "OUT_OF_STOCK",
            StockViolation::ProductNotFound { .. } => "PRODUCT_NOT_FOUND",
        }
    }
}

fn describe<'a>(product_id: &'a str, size: &'a Option<String>) -> impl fmt::Display + 'a {
    struct Described<'a>(&'a str, Option<&'a str>);

    impl fmt::Display for Described<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self.1 {
                Some(size) => write!(f, "{} (size {})", self.0, size),
                None => write!(f, "{}", self.0),
            }
        }
    }

    Described(product_id, size.as_deref())
}

// =============================================================================
// Checker
// =============================================================================

/// Checks `lines` against `products`.
///
/// Returns one [`Reservation`] per distinct (product, size) on success, in
/// first-seen order.
pub fn check_stock(
    lines: &[CartLine],
    products: &[Product],
) -> Result<Vec<Reservation>, Vec<StockViolation>> {
    let catalog: HashMap<&str, &Product> = products.iter().map(|p| (p.id.as_str(), p)).collect();

    let mut violations = Vec::new();
    let mut reservations: Vec<Reservation> = Vec::new();

    for line in lines {
        let Some(product) = catalog.get(line.product_id.as_str()) else {
            let missing = StockViolation::ProductNotFound {
                product_id: line.product_id.clone(),
            };
            if !violations.contains(&missing) {
                violations.push(missing);
            }
            continue;
        };

        // Sizeless products pool every line regardless of selected size.
        let size = if product.is_sized() {
            line.selected_size.clone()
        } else {
            None
        };

        match reservations
            .iter_mut()
            .find(|r| r.product_id == line.product_id && r.size == size)
        {
            Some(existing) => existing.quantity += line.quantity,
            None => reservations.push(Reservation {
                product_id: line.product_id.clone(),
                size,
                quantity: line.quantity,
            }),
        }
    }

    for reservation in &reservations {
        let Some(product) = catalog.get(reservation.product_id.as_str()) else {
            continue;
        };

        let available = product.available(reservation.size.as_deref()).unwrap_or(0);
        if available < reservation.quantity {
            violations.push(StockViolation::OutOfStock {
                product_id: reservation.product_id.clone(),
                size: reservation.size.clone(),
                available,
                requested: reservation.quantity,
            });
        }
    }

    if violations.is_empty() {
        Ok(reservations)
    } else {
        Err(violations)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
