//! # Validation Module
//!
//! Input validation utilities for the storefront.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Client (TypeScript)                                          │
//! │  ├── Basic format checks (empty, length)                               │
//! │  └── Immediate user feedback                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: HTTP handler (Rust)                                          │
//! │  ├── Type validation (deserialization)                                 │
//! │  └── THIS MODULE: Business rule validation                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / UNIQUE / CHECK constraints                             │
//! │  └── Conditional updates for stock, coupons, return status             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use storefront_core::validation::{normalize_coupon_code, validate_quantity};
//!
//! assert_eq!(normalize_coupon_code(" save20 ").unwrap(), "SAVE20");
//! assert!(validate_quantity(5).is_ok());
//! ```

use crate::error::ValidationError;
use crate::types::{PaymentMethod, ShippingAddress};
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Coupon code length bounds (after trimming and uppercasing).
pub const COUPON_CODE_MIN_LEN: usize = 4;
pub const COUPON_CODE_MAX_LEN: usize = 15;

// =============================================================================
// String Validators
// =============================================================================

/// Requires a non-blank string field.
pub fn validate_required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Normalizes a raw coupon code and checks its format.
///
/// ## Rules
/// - Surrounding whitespace is ignored
/// - Compared case-insensitively, stored uppercase
/// - 4 to 15 characters from `[A-Z0-9_-]`
///
/// ## Example
/// ```rust
/// use storefront_core::validation::normalize_coupon_code;
///
/// assert_eq!(normalize_coupon_code("summer-24").unwrap(), "SUMMER-24");
/// assert!(normalize_coupon_code("ab").is_err());
/// assert!(normalize_coupon_code("HAS SPACE").is_err());
/// ```
pub fn normalize_coupon_code(raw: &str) -> ValidationResult<String> {
    let code = raw.trim().to_uppercase();

    let len = code.chars().count();
    if !(COUPON_CODE_MIN_LEN..=COUPON_CODE_MAX_LEN).contains(&len) {
        return Err(ValidationError::InvalidFormat {
            field: "couponCode".to_string(),
            reason: format!(
                "must be {COUPON_CODE_MIN_LEN}-{COUPON_CODE_MAX_LEN} characters"
            ),
        });
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' || c == '-')
    {
        return Err(ValidationError::InvalidFormat {
            field: "couponCode".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(code)
}

/// Validates every required field of a shipping address.
pub fn validate_shipping_address(address: &ShippingAddress) -> ValidationResult<()> {
    validate_required("shippingAddress.address", &address.address)?;
    validate_required("shippingAddress.city", &address.city)?;
    validate_required("shippingAddress.postalCode", &address.postal_code)?;
    validate_required("shippingAddress.country", &address.country)?;
    Ok(())
}

/// Parses a payment method name.
pub fn validate_payment_method(raw: &str) -> ValidationResult<PaymentMethod> {
    validate_required("paymentMethod", raw)?;
    PaymentMethod::parse(raw).ok_or_else(|| ValidationError::NotAllowed {
        field: "paymentMethod".to_string(),
        allowed: PaymentMethod::ALL.iter().map(|m| m.to_string()).collect(),
    })
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a quantity value.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
///
/// ## User Workflow
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Cart: Add Item                                                         │
/// │                                                                         │
/// │  User enters quantity: 5                                               │
/// │       │                                                                 │
/// │       ▼                                                                 │
/// │  validate_quantity(5) ← THIS FUNCTION                                  │
/// │       │                                                                 │
/// │       ├── qty <= 0? → Error: "quantity must be positive"               │
/// │       │                                                                 │
/// │       ├── qty > 999? → Error: "quantity must be between 1 and 999"     │
/// │       │                                                                 │
/// │       └── OK → Proceed with add_line                                   │
/// │                                                                         │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price in cents. Zero is allowed.
pub fn validate_price_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the number of distinct lines in a cart or order.
pub fn validate_line_count(lines: usize) -> ValidationResult<()> {
    if lines == 0 {
        return Err(ValidationError::Required {
            field: "orderItems".to_string(),
        });
    }

    if lines > MAX_CART_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "orderItems".to_string(),
            min: 1,
            max: MAX_CART_ITEMS as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_coupon_code() {
        assert_eq!(normalize_coupon_code("save20").unwrap(), "SAVE20");
        assert_eq!(normalize_coupon_code("  Big_Sale-1 ").unwrap(), "BIG_SALE-1");
        assert_eq!(normalize_coupon_code("ABCD").unwrap(), "ABCD");
        assert_eq!(normalize_coupon_code(&"A".repeat(15)).unwrap(), "A".repeat(15));

        assert!(normalize_coupon_code("").is_err());
        assert!(normalize_coupon_code("ABC").is_err());
        assert!(normalize_coupon_code(&"A".repeat(16)).is_err());
        assert!(normalize_coupon_code("SAVE 20").is_err());
        assert!(normalize_coupon_code("SAVE%20").is_err());
    }

    #[test]
    fn test_validate_shipping_address() {
        let mut address = ShippingAddress {
            address: "1 Savile Row".to_string(),
            city: "London".to_string(),
            postal_code: "W1S 3PR".to_string(),
            country: "UK".to_string(),
        };
        assert!(validate_shipping_address(&address).is_ok());

        address.city = "  ".to_string();
        let err = validate_shipping_address(&address).unwrap_err();
        assert_eq!(err.to_string(), "shippingAddress.city is required");
    }

    #[test]
    fn test_validate_payment_method() {
        assert_eq!(validate_payment_method("stripe").unwrap(), PaymentMethod::Stripe);
        assert!(matches!(
            validate_payment_method("barter"),
            Err(ValidationError::NotAllowed { .. })
        ));
        assert!(matches!(
            validate_payment_method(""),
            Err(ValidationError::Required { .. })
        ));
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_line_count() {
        assert!(validate_line_count(1).is_ok());
        assert!(validate_line_count(100).is_ok());
        assert!(validate_line_count(0).is_err());
        assert!(validate_line_count(101).is_err());
    }

    #[test]
    fn test_validate_price_cents() {
        assert!(validate_price_cents("price", 0).is_ok());
        assert!(validate_price_cents("price", 1099).is_ok());
        assert!(validate_price_cents("price", -100).is_err());
    }
}
