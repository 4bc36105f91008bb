//! # Order
//!
//! The immutable record of a placed order.
//!
//! ## Snapshot Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Catalog (mutable)              Order (frozen at placement)             │
//! │  ─────────────────              ───────────────────────────             │
//! │  navy-suit  $150  ──placement──► OrderItem { price: $200, qty: 1 }      │
//! │  (price cut later)                                                      │
//! │                                                                         │
//! │  Refunds read OrderItem.price, never the catalog.                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only two flags ever change after placement, and only from false to true:
//! `is_paid` and `is_delivered`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::coupon::AppliedCoupon;
use crate::customization::Customization;
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::pricing::PriceBreakdown;
use crate::types::{Actor, PaymentMethod, ShippingAddress};

/// A frozen order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: String,
    pub product_id: String,
    pub name: String,
    /// Unit price at placement.
    pub price: Money,
    pub quantity: i64,
    pub selected_size: Option<String>,
    pub customization: Option<Customization>,
    /// Customization surcharge charged on this line at placement.
    pub customization_cost: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub order_items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub applied_coupon: Option<AppliedCoupon>,
    pub price_breakdown: PriceBreakdown,
    pub is_paid: bool,
    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,
    pub is_delivered: bool,
    #[ts(as = "Option<String>")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn item(&self, order_item_id: &str) -> Option<&OrderItem> {
        self.order_items.iter().find(|i| i.id == order_item_id)
    }

    /// Units across all lines.
    pub fn total_units(&self) -> i64 {
        self.order_items.iter().map(|i| i.quantity).sum()
    }

    /// Owner or admin.
    pub fn ensure_visible_to(&self, actor: &Actor) -> CoreResult<()> {
        if actor.is_admin() || actor.user_id == self.user_id {
            return Ok(());
        }
        Err(CoreError::Forbidden {
            action: format!("view order {}", self.id),
        })
    }

    /// Sets `is_paid`. Paying twice is a conflict.
    pub fn mark_paid(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        if self.is_paid {
            return Err(CoreError::OrderStateConflict {
                order_id: self.id.clone(),
                state: "paid".to_string(),
            });
        }
        self.is_paid = true;
        self.paid_at = Some(now);
        Ok(())
    }

    /// Sets `is_delivered`. Delivering twice is a conflict.
    pub fn mark_delivered(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        if self.is_delivered {
            return Err(CoreError::OrderStateConflict {
                order_id: self.id.clone(),
                state: "delivered".to_string(),
            });
        }
        self.is_delivered = true;
        self.delivered_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_order() -> Order {
        Order {
            id: "o1".to_string(),
            user_id: "u1".to_string(),
            order_items: vec![OrderItem {
                id: "i1".to_string(),
                product_id: "suit".to_string(),
                name: "Navy Suit".to_string(),
                price: Money::from_dollars(200),
                quantity: 2,
                selected_size: Some("40R".to_string()),
                customization: None,
                customization_cost: Money::zero(),
            }],
            shipping_address: ShippingAddress::default(),
            payment_method: PaymentMethod::Card,
            applied_coupon: None,
            price_breakdown: crate::pricing::PricingPolicy::default()
                .breakdown(Money::from_dollars(400), Money::zero()),
            is_paid: false,
            paid_at: None,
            is_delivered: false,
            delivered_at: None,
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_flags_are_monotonic() {
        let mut order = sample_order();
        let now = Utc::now();

        order.mark_paid(now).unwrap();
        assert!(order.is_paid);
        assert_eq!(order.paid_at, Some(now));
        assert!(matches!(
            order.mark_paid(now),
            Err(CoreError::OrderStateConflict { .. })
        ));

        order.mark_delivered(now).unwrap();
        assert!(order.mark_delivered(now).is_err());
        assert!(order.is_delivered);
    }

    #[test]
    fn test_visibility() {
        let order = sample_order();
        assert!(order.ensure_visible_to(&Actor::customer("u1")).is_ok());
        assert!(order.ensure_visible_to(&Actor::admin("staff")).is_ok());
        assert!(order.ensure_visible_to(&Actor::customer("u2")).is_err());
    }

    #[test]
    fn test_item_lookup() {
        let order = sample_order();
        assert_eq!(order.item("i1").map(|i| i.quantity), Some(2));
        assert!(order.item("nope").is_none());
        assert_eq!(order.total_units(), 2);
    }
}
