//! # Domain Types
//!
//! Shared domain types used throughout the storefront.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │  ShippingAddress│   │ PaymentMethod   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id             │   │  address        │   │  Paypal         │       │
//! │  │  name           │   │  city           │   │  Stripe         │       │
//! │  │  price          │   │  postal_code    │   │  Card           │       │
//! │  │  count_in_stock │   │  country        │   │  CashOnDelivery │       │
//! │  │  sizes[]        │   └─────────────────┘   └─────────────────┘       │
//! │  └─────────────────┘                                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    TaxRate      │   │    Percent      │   │     Actor       │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  bps (u32)      │   │  bps (u32)      │   │  user_id        │       │
//! │  │  1500 = 15%     │   │  2000 = 20%     │   │  role           │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 1500 bps = 15% (the storefront's default sales tax)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Percent
// =============================================================================

/// A discount percentage in basis points. `Percent(2000)` is 20%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Percent(u32);

impl Percent {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Percent(bps)
    }

    /// `from_whole(20)` is 20%.
    #[inline]
    pub const fn from_whole(percent: u32) -> Self {
        Percent(percent * 100)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }
}

// =============================================================================
// Product
// =============================================================================

/// Stock held for one size of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SizeStock {
    pub size: String,
    pub quantity: i64,
}

/// The slice of a catalog product the core needs for stock checks.
///
/// Catalog CRUD lives elsewhere; this is a read-only snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,

    /// Current catalog price. Orders freeze their own copy at placement.
    pub price: Money,

    /// Overall stock, used only when `sizes` is empty.
    pub count_in_stock: i64,

    /// Per-size inventory. Non-empty means the product is sized.
    #[serde(default)]
    pub sizes: Vec<SizeStock>,
}

impl Product {
    /// Whether inventory is tracked per size.
    #[inline]
    pub fn is_sized(&self) -> bool {
        !self.sizes.is_empty()
    }

    /// Quantity available for `size`.
    ///
    /// Sized products require an exact size match (`None` when the size is
    /// missing or unknown). Sizeless products ignore `size` and report
    /// `count_in_stock`.
    pub fn available(&self, size: Option<&str>) -> Option<i64> {
        if !self.is_sized() {
            return Some(self.count_in_stock);
        }

        let size = size?;
        self.sizes
            .iter()
            .find(|s| s.size == size)
            .map(|s| s.quantity)
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Paypal,
    Stripe,
    Card,
    CashOnDelivery,
}

impl PaymentMethod {
    pub const ALL: [&'static str; 4] = ["paypal", "stripe", "card", "cash_on_delivery"];

    /// Parses a wire name, accepting the capitalised forms the checkout
    /// form submits ("PayPal", "Stripe").
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "paypal" => Some(PaymentMethod::Paypal),
            "stripe" => Some(PaymentMethod::Stripe),
            "card" => Some(PaymentMethod::Card),
            "cash_on_delivery" | "cod" => Some(PaymentMethod::CashOnDelivery),
            _ => None,
        }
    }
}

// =============================================================================
// Shipping Address
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase", default)]
pub struct ShippingAddress {
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

// =============================================================================
// Actor
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Admin,
}

/// Who is performing an action. Identity comes from the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub user_id: String,
    pub role: Role,
}

impl Actor {
    pub fn customer(user_id: impl Into<String>) -> Self {
        Actor {
            user_id: user_id.into(),
            role: Role::Customer,
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Actor {
            user_id: user_id.into(),
            role: Role::Admin,
        }
    }

    #[inline]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn suit(sizes: Vec<(&str, i64)>) -> Product {
        Product {
            id: "navy-suit".to_string(),
            name: "Navy Suit".to_string(),
            price: Money::from_dollars(200),
            count_in_stock: 7,
            sizes: sizes
                .into_iter()
                .map(|(size, quantity)| SizeStock {
                    size: size.to_string(),
                    quantity,
                })
                .collect(),
        }
    }

    #[test]
    fn test_tax_rate_from_bps() {
        let rate = TaxRate::from_bps(1500);
        assert_eq!(rate.bps(), 1500);
        assert!((rate.percentage() - 15.0).abs() < 0.001);
    }

    #[test]
    fn test_available_sizeless_uses_count_in_stock() {
        let product = suit(vec![]);
        assert_eq!(product.available(None), Some(7));
        assert_eq!(product.available(Some("40R")), Some(7));
    }

    #[test]
    fn test_available_sized_requires_exact_match() {
        let product = suit(vec![("40R", 2), ("42R", 0)]);
        assert_eq!(product.available(Some("40R")), Some(2));
        assert_eq!(product.available(Some("42R")), Some(0));
        assert_eq!(product.available(Some("40r")), None);
        assert_eq!(product.available(None), None);
    }

    #[test]
    fn test_payment_method_parse() {
        assert_eq!(PaymentMethod::parse("PayPal"), Some(PaymentMethod::Paypal));
        assert_eq!(
            PaymentMethod::parse("cash_on_delivery"),
            Some(PaymentMethod::CashOnDelivery)
        );
        assert_eq!(PaymentMethod::parse("bitcoin"), None);
    }
}
