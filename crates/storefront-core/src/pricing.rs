//! # Pricing Engine
//!
//! Turns cart lines and an optional coupon into a [`PriceBreakdown`].
//!
//! ## Algorithm
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. items      = Σ unit_price × qty + customization surcharge           │
//! │  2. discount   = coupon still valid against items ? computed : 0        │
//! │  3. discounted = max(0, items − discount)                               │
//! │  4. shipping   = discounted > threshold ? 0 : flat fee                  │
//! │  5. tax        = round(discounted × tax_rate)                           │
//! │  6. total      = discounted + shipping + tax                            │
//! │                                                                         │
//! │  Shipping and tax are both taken on the POST-discount amount.           │
//! │  Only discount and tax are rounded; the sums are exact.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Shipping Boundary
//! The threshold comparison is strict: with the default policy a discounted
//! subtotal of exactly `$100.00` still pays `$10.00` shipping, `$100.01`
//! ships free.
//!
//! The client preview and the server recomputation both run this module,
//! so a breakdown for the same inputs is identical to the cent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::cart::{Cart, CartLine};
use crate::coupon::{self, AppliedCoupon, Coupon, CouponRejection};
use crate::money::Money;
use crate::types::TaxRate;

// =============================================================================
// Pricing Policy
// =============================================================================

/// Shipping and tax rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PricingPolicy {
    pub tax_rate: TaxRate,
    pub shipping_fee: Money,
    /// Shipping is free only strictly above this amount.
    pub free_shipping_threshold: Money,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        PricingPolicy {
            tax_rate: TaxRate::from_bps(1500),
            shipping_fee: Money::from_dollars(10),
            free_shipping_threshold: Money::from_dollars(100),
        }
    }
}

impl PricingPolicy {
    /// Flat fee, or zero when `discounted` is above the threshold.
    pub fn shipping_for(&self, discounted: Money) -> Money {
        if discounted > self.free_shipping_threshold {
            Money::zero()
        } else {
            self.shipping_fee
        }
    }

    /// Steps 3-6 for a known items price and discount.
    pub fn breakdown(&self, items_price: Money, discount_amount: Money) -> PriceBreakdown {
        let discount_amount = discount_amount.non_negative();
        let discounted_items_price = (items_price - discount_amount).non_negative();
        let shipping_price = self.shipping_for(discounted_items_price);
        let tax_price = discounted_items_price.calculate_tax(self.tax_rate);

        PriceBreakdown {
            items_price,
            discount_amount,
            discounted_items_price,
            shipping_price,
            tax_price,
            total_price: discounted_items_price + shipping_price + tax_price,
        }
    }

    /// Authoritative pricing. A supplied coupon that no longer validates is
    /// an error, never silently dropped.
    pub fn price(
        &self,
        lines: &[CartLine],
        coupon: Option<&Coupon>,
        now: DateTime<Utc>,
        user_redemptions: Option<i64>,
    ) -> Result<Priced, CouponRejection> {
        let items_price = items_price(lines);

        let applied = coupon
            .map(|c| c.check(items_price, now, user_redemptions))
            .transpose()?;
        let discount = applied
            .as_ref()
            .map_or(Money::zero(), |a| a.discount_amount);

        Ok(Priced {
            breakdown: self.breakdown(items_price, discount),
            coupon: applied,
        })
    }

    /// Preview pricing for a cart.
    ///
    /// `coupon` is the looked-up record for `cart.coupon_code`, if any. When
    /// the code does not validate the quote is priced without it and the
    /// rejection is reported alongside.
    pub fn quote(
        &self,
        cart: &Cart,
        coupon: Option<&Coupon>,
        now: DateTime<Utc>,
        user_redemptions: Option<i64>,
    ) -> Quote {
        let items_price = cart.items_price();

        let outcome = cart
            .coupon_code
            .as_ref()
            .map(|_| coupon::validate(coupon, items_price, now, user_redemptions));

        let (applied, rejection) = match outcome {
            None => (None, None),
            Some(Ok(applied)) => (Some(applied), None),
            Some(Err(rejection)) => (None, Some(rejection)),
        };

        let discount = applied
            .as_ref()
            .map_or(Money::zero(), |a| a.discount_amount);

        Quote {
            breakdown: self.breakdown(items_price, discount),
            coupon: applied,
            coupon_rejection: rejection.map(|r| r.code().to_string()),
        }
    }
}

/// Σ line totals including customization.
pub fn items_price(lines: &[CartLine]) -> Money {
    lines.iter().map(CartLine::line_total).sum()
}

// =============================================================================
// Outputs
// =============================================================================

/// Full decomposition of an order total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    pub items_price: Money,
    pub discount_amount: Money,
    pub discounted_items_price: Money,
    pub shipping_price: Money,
    pub tax_price: Money,
    pub total_price: Money,
}

impl PriceBreakdown {
    /// Checks the arithmetic relations between the fields.
    pub fn is_consistent(&self) -> bool {
        self.discount_amount >= Money::zero()
            && self.discounted_items_price >= Money::zero()
            && self.discounted_items_price == (self.items_price - self.discount_amount).non_negative()
            && self.total_price == self.discounted_items_price + self.shipping_price + self.tax_price
    }
}

/// Authoritative pricing result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Priced {
    pub breakdown: PriceBreakdown,
    pub coupon: Option<AppliedCoupon>,
}

/// Preview pricing result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub breakdown: PriceBreakdown,
    pub coupon: Option<AppliedCoupon>,
    /// Reason code when the cart's coupon was dropped.
    pub coupon_rejection: Option<String>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coupon::DiscountType;
    use crate::customization::{Customization, Monogram};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn line(cents: i64, qty: i64) -> CartLine {
        CartLine {
            product_id: "p1".to_string(),
            name: "Navy Suit".to_string(),
            unit_price: Money::from_cents(cents),
            quantity: qty,
            selected_size: None,
            customization: None,
        }
    }

    fn save20() -> Coupon {
        Coupon {
            id: "c1".to_string(),
            code: "SAVE20".to_string(),
            description: None,
            discount_type: DiscountType::Percentage,
            discount_value: 20,
            minimum_purchase_amount: Money::from_dollars(50),
            valid_from: now() - Duration::days(1),
            valid_until: now() + Duration::days(1),
            usage_limit_total: None,
            usage_limit_per_user: None,
            times_used: 0,
            is_active: true,
        }
    }

    #[test]
    fn test_shipping_threshold_is_strict() {
        let policy = PricingPolicy::default();
        assert_eq!(
            policy.shipping_for(Money::from_cents(10_000)),
            Money::from_dollars(10)
        );
        assert_eq!(policy.shipping_for(Money::from_cents(10_001)), Money::zero());
    }

    #[test]
    fn test_monogrammed_suit_with_save20() {
        let mut suit = line(10_000, 1);
        suit.customization = Some(Customization {
            monogram: Some(Monogram {
                text: "AB".to_string(),
                premium: false,
            }),
            ..Default::default()
        });

        let priced = PricingPolicy::default()
            .price(&[suit], Some(&save20()), now(), None)
            .unwrap();
        let b = priced.breakdown;

        assert_eq!(b.items_price.cents(), 12_500);
        assert_eq!(b.discount_amount.cents(), 2_500);
        assert_eq!(b.discounted_items_price.cents(), 10_000);
        // exactly $100.00 is not above the threshold
        assert_eq!(b.shipping_price.cents(), 1_000);
        assert_eq!(b.tax_price.cents(), 1_500);
        assert_eq!(b.total_price.cents(), 12_500);
        assert!(b.is_consistent());
        assert_eq!(priced.coupon.unwrap().code, "SAVE20");
    }

    #[test]
    fn test_shipping_uses_post_discount_amount() {
        // 110 → 88 after 20% pays shipping even though 110 > 100.
        let priced = PricingPolicy::default()
            .price(&[line(11_000, 1)], Some(&save20()), now(), None)
            .unwrap();
        assert_eq!(priced.breakdown.discounted_items_price.cents(), 8_800);
        assert_eq!(priced.breakdown.shipping_price.cents(), 1_000);
        assert_eq!(priced.breakdown.tax_price.cents(), 1_320);
    }

    #[test]
    fn test_price_rejects_invalid_coupon() {
        let result =
            PricingPolicy::default().price(&[line(4_999, 1)], Some(&save20()), now(), None);
        assert!(matches!(result, Err(CouponRejection::BelowMinimum { .. })));
    }

    #[test]
    fn test_quote_drops_rejected_coupon() {
        let mut cart = Cart::new();
        cart.add_line(line(4_000, 1)).unwrap();
        cart.apply_coupon("save20").unwrap();

        let quote = PricingPolicy::default().quote(&cart, Some(&save20()), now(), None);
        assert!(quote.coupon.is_none());
        assert_eq!(quote.coupon_rejection.as_deref(), Some("BELOW_MINIMUM"));
        assert_eq!(quote.breakdown.discount_amount, Money::zero());
        assert_eq!(quote.breakdown.total_price.cents(), 4_000 + 1_000 + 600);
    }

    #[test]
    fn test_quote_unknown_code() {
        let mut cart = Cart::new();
        cart.add_line(line(4_000, 1)).unwrap();
        cart.apply_coupon("ghost").unwrap();

        let quote = PricingPolicy::default().quote(&cart, None, now(), None);
        assert_eq!(quote.coupon_rejection.as_deref(), Some("NOT_FOUND"));
    }

    #[test]
    fn test_quote_matches_price() {
        let mut cart = Cart::new();
        cart.add_line(line(3_333, 3)).unwrap();
        cart.apply_coupon("SAVE20").unwrap();

        let policy = PricingPolicy::default();
        let quote = policy.quote(&cart, Some(&save20()), now(), None);
        let priced = policy
            .price(&cart.lines, Some(&save20()), now(), None)
            .unwrap();
        assert_eq!(quote.breakdown, priced.breakdown);
    }

    #[test]
    fn test_discount_clamped_to_items() {
        let b = PricingPolicy::default().breakdown(Money::from_cents(500), Money::from_cents(900));
        assert_eq!(b.discount_amount.cents(), 900);
        assert_eq!(b.discounted_items_price, Money::zero());
        assert_eq!(b.tax_price, Money::zero());
        assert_eq!(b.total_price.cents(), 1_000);
        assert!(b.is_consistent());
    }

    #[test]
    fn test_empty_cart() {
        let b = PricingPolicy::default().breakdown(Money::zero(), Money::zero());
        assert_eq!(b.total_price, Money::from_dollars(10));
    }
}
