//! # Refund Calculator
//!
//! Derives the money owed back for a return from the order's frozen prices.
//!
//! ## Computation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  return_amount = Σ order_item.price × return_item.return_qty            │
//! │                    ▲                                                    │
//! │                    └── frozen at placement, never the live catalog      │
//! │                                                                         │
//! │  chosen  = admin override ?? return_amount                              │
//! │  final   = chosen − restocking_fee − return_shipping_cost               │
//! │  require 0 ≤ final ≤ return_amount                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Customization surcharges are not refunded; only the unit price is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::order::Order;
use crate::returns::ReturnItem;

// =============================================================================
// Return Amount
// =============================================================================

/// Σ frozen unit price × returned quantity.
///
/// Fails with an integrity error when a return item points at a line the
/// order does not have.
pub fn return_amount(order: &Order, items: &[ReturnItem]) -> CoreResult<Money> {
    items
        .iter()
        .map(|item| {
            order
                .item(&item.order_item_id)
                .map(|line| line.price.multiply_quantity(item.return_qty))
                .ok_or_else(|| CoreError::Integrity {
                    reason: format!(
                        "return item {} is not a line of order {}",
                        item.order_item_id, order.id
                    ),
                })
        })
        .sum()
}

// =============================================================================
// Refund Processing
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RefundMethod {
    #[default]
    OriginalPayment,
    StoreCredit,
    BankTransfer,
}

/// What an administrator submits when processing a refund.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase", default)]
pub struct RefundInput {
    /// Overrides the computed amount when present.
    pub refund_amount: Option<Money>,
    pub refund_reason: Option<String>,
    pub refund_method: RefundMethod,
    pub restocking_fee: Option<Money>,
    pub return_shipping_cost: Option<Money>,
}

/// A processed refund, as recorded on the return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RefundRecord {
    /// Amount actually paid back.
    pub amount: Money,
    /// The calculator's figure, kept even when overridden.
    pub computed_amount: Money,
    pub is_override: bool,
    pub restocking_fee: Money,
    pub return_shipping_cost: Money,
    pub method: RefundMethod,
    pub reason: Option<String>,
    pub processed_by: String,
    #[ts(as = "String")]
    pub processed_at: DateTime<Utc>,
}

impl RefundInput {
    /// Applies override and deductions to `computed`.
    pub fn settle(
        &self,
        computed: Money,
        processed_by: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<RefundRecord> {
        let restocking_fee = non_negative("restockingFee", self.restocking_fee)?;
        let return_shipping_cost = non_negative("returnShippingCost", self.return_shipping_cost)?;
        let chosen = non_negative("refundAmount", self.refund_amount)?;

        let is_override = self.refund_amount.is_some_and(|amount| amount != computed);
        let chosen = if self.refund_amount.is_some() { chosen } else { computed };
        let out_of_range = || ValidationError::OutOfRange {
            field: "refundAmount".to_string(),
            min: 0,
            max: computed.cents(),
        };

        // Deductions can sum past i64::MIN; that is a negative refund too.
        let amount = chosen
            .checked_sub(restocking_fee)
            .and_then(|rest| rest.checked_sub(return_shipping_cost))
            .ok_or_else(out_of_range)?;

        if amount.is_negative() || amount > computed {
            return Err(out_of_range().into());
        }

        Ok(RefundRecord {
            amount,
            computed_amount: computed,
            is_override,
            restocking_fee,
            return_shipping_cost,
            method: self.refund_method,
            reason: self.refund_reason.clone(),
            processed_by: processed_by.to_string(),
            processed_at: now,
        })
    }
}

fn non_negative(field: &str, value: Option<Money>) -> CoreResult<Money> {
    let value = value.unwrap_or_default();
    if value.is_negative() {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        }
        .into());
    }
    Ok(value)
}

// =============================================================================
// Unit Tests
// =============================================================================
