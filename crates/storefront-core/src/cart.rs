//! # Cart
//!
//! An explicit cart value: lines plus at most one coupon code.
//!
//! ## Cart Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  add_line(line)                                                         │
//! │     ├── same product + size + customization already present?            │
//! │     │       └── merge quantities (still ≤ 999)                          │
//! │     └── otherwise append (≤ 100 lines)                                  │
//! │                                                                         │
//! │  update_quantity(i, 0)   → removes the line                             │
//! │  apply_coupon("save20")  → replaces any prior code, never stacks        │
//! │                                                                         │
//! │  items_price() = Σ unit_price × quantity + customization surcharge      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The cart is passed by reference into the pricing engine. There is no
//! shared mutable cart anywhere in the process.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::coupon::CouponRejection;
use crate::customization::{self, Customization};
use crate::error::{CoreResult, ValidationError};
use crate::money::Money;
use crate::validation::{normalize_coupon_code, validate_price_cents, validate_quantity};
use crate::MAX_CART_ITEMS;

// =============================================================================
// Cart Line
// =============================================================================

/// One product line in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: String,
    pub name: String,
    /// Price snapshot taken when the line was added.
    pub unit_price: Money,
    pub quantity: i64,
    #[serde(default)]
    pub selected_size: Option<String>,
    #[serde(default)]
    pub customization: Option<Customization>,
}

impl CartLine {
    /// Surcharge from tailoring options. Charged once per line.
    #[inline]
    pub fn customization_cost(&self) -> Money {
        customization::resolve(self.customization.as_ref())
    }

    /// `unit_price × quantity + customization surcharge`.
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity) + self.customization_cost()
    }

    /// Whether `other` describes the same purchasable item.
    fn same_item(&self, other: &CartLine) -> bool {
        self.product_id == other.product_id
            && self.selected_size == other.selected_size
            && self.customization == other.customization
    }

    /// Checks the line's own fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        crate::validation::validate_required("productId", &self.product_id)?;
        validate_quantity(self.quantity)?;
        validate_price_cents("unitPrice", self.unit_price.cents())?;
        Ok(())
    }
}

// =============================================================================
// Cart
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub lines: Vec<CartLine>,
    /// Normalized (uppercase) coupon code, if one is applied.
    pub coupon_code: Option<String>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a line, merging with an identical existing one.
    pub fn add_line(&mut self, line: CartLine) -> CoreResult<()> {
        line.validate()?;

        if let Some(existing) = self.lines.iter_mut().find(|l| l.same_item(&line)) {
            let merged = existing.quantity + line.quantity;
            validate_quantity(merged)?;
            existing.quantity = merged;
            return Ok(());
        }

        if self.lines.len() >= MAX_CART_ITEMS {
            return Err(ValidationError::OutOfRange {
                field: "cart lines".to_string(),
                min: 0,
                max: MAX_CART_ITEMS as i64,
            }
            .into());
        }

        self.lines.push(line);
        Ok(())
    }

    /// Sets the quantity of line `index`. Zero removes the line.
    pub fn update_quantity(&mut self, index: usize, quantity: i64) -> CoreResult<()> {
        if quantity == 0 {
            return self.remove_line(index).map(|_| ());
        }
        validate_quantity(quantity)?;

        let line = self.line_mut(index)?;
        line.quantity = quantity;
        Ok(())
    }

    /// Removes and returns line `index`.
    pub fn remove_line(&mut self, index: usize) -> CoreResult<CartLine> {
        if index >= self.lines.len() {
            return Err(out_of_bounds(index, self.lines.len()).into());
        }
        Ok(self.lines.remove(index))
    }

    /// Applies a coupon code, replacing any prior one. Returns the replaced
    /// code. Only the format is checked here; eligibility is decided at
    /// pricing time against the live coupon record.
    pub fn apply_coupon(&mut self, raw_code: &str) -> CoreResult<Option<String>> {
        let code = normalize_coupon_code(raw_code).map_err(|_| CouponRejection::MalformedCode)?;
        Ok(self.coupon_code.replace(code))
    }

    pub fn clear_coupon(&mut self) -> Option<String> {
        self.coupon_code.take()
    }

    /// Σ line totals, customization included.
    pub fn items_price(&self) -> Money {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    fn line_mut(&mut self, index: usize) -> Result<&mut CartLine, ValidationError> {
        let len = self.lines.len();
        self.lines
            .get_mut(index)
            .ok_or_else(|| out_of_bounds(index, len))
    }
}

fn out_of_bounds(index: usize, len: usize) -> ValidationError {
    ValidationError::OutOfRange {
        field: format!("line index {index}"),
        min: 0,
        max: len as i64 - 1,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
