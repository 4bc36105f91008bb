//! # Order Placement Validator
//!
//! Accepts or rejects an order submission, recomputing every monetary field.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  OrderRequest (client)                                                  │
//! │       │                                                                 │
//! │       ├── 1. shape: lines 1..=100, qty 1..=999, address, payment method │
//! │       ├── 2. coupon code format + lookup result                         │
//! │       ├── 3. stock check (aggregated, all violations)                   │
//! │       ├── 4. freeze catalog prices onto the lines                       │
//! │       ├── 5. price with the server's coupon validation                  │
//! │       └── 6. compare client totals (advisory) ──► discrepancies         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  PlacementPlan { lines, reservations, breakdown, coupon, ... }          │
//! │       │                                                                 │
//! │       ▼  storage: decrement stock, redeem coupon, insert order (1 tx)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Client-submitted prices and totals never reach the plan. A mismatch is
//! returned as a [`TotalsDiscrepancy`] for the caller to log; the request
//! still succeeds with the server's numbers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::cart::CartLine;
use crate::coupon::{self, AppliedCoupon, Coupon, CouponRejection};
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::order::{Order, OrderItem};
use crate::pricing::{PriceBreakdown, PricingPolicy};
use crate::stock::{check_stock, Reservation};
use crate::types::{PaymentMethod, Product, ShippingAddress};
use crate::validation::{validate_line_count, validate_payment_method, validate_shipping_address};

// =============================================================================
// Request
// =============================================================================

/// A submitted coupon: either the bare code or the object the coupon
/// preview returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(untagged)]
pub enum CouponRef {
    Code(String),
    Snapshot {
        #[serde(alias = "couponCode")]
        code: String,
    },
}

impl CouponRef {
    pub fn raw_code(&self) -> &str {
        match self {
            CouponRef::Code(code) | CouponRef::Snapshot { code } => code,
        }
    }
}

/// `POST /orders` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderRequest {
    pub order_items: Vec<CartLine>,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    pub applied_coupon: Option<CouponRef>,

    // Advisory only. Compared, never persisted.
    pub items_price: Option<Money>,
    pub discount_amount: Option<Money>,
    pub shipping_price: Option<Money>,
    pub tax_price: Option<Money>,
    pub total_price: Option<Money>,
}

impl OrderRequest {
    /// The normalized coupon code, if one was submitted.
    pub fn coupon_code(&self) -> Result<Option<String>, CouponRejection> {
        self.applied_coupon
            .as_ref()
            .map(|c| coupon::parse_code(c.raw_code()))
            .transpose()
    }
}

// =============================================================================
// Discrepancies
// =============================================================================

/// A client-submitted monetary field that disagrees with the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct TotalsDiscrepancy {
    pub field: String,
    pub client: Money,
    pub server: Money,
}

fn compare(
    out: &mut Vec<TotalsDiscrepancy>,
    field: impl Into<String>,
    client: Option<Money>,
    server: Money,
    epsilon: Money,
) {
    if let Some(client) = client {
        if !client.within(server, epsilon) {
            out.push(TotalsDiscrepancy {
                field: field.into(),
                client,
                server,
            });
        }
    }
}

// =============================================================================
// Plan
// =============================================================================

/// Everything storage needs to persist an accepted order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementPlan {
    /// Lines with catalog prices frozen in.
    pub lines: Vec<CartLine>,
    pub reservations: Vec<Reservation>,
    pub breakdown: PriceBreakdown,
    pub coupon: Option<AppliedCoupon>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub discrepancies: Vec<TotalsDiscrepancy>,
}

impl PlacementPlan {
    /// Builds the order record. Item ids are fresh UUIDs.
    pub fn to_order(&self, order_id: String, user_id: String, now: DateTime<Utc>) -> Order {
        let order_items = self
            .lines
            .iter()
            .map(|line| OrderItem {
                id: Uuid::new_v4().to_string(),
                product_id: line.product_id.clone(),
                name: line.name.clone(),
                price: line.unit_price,
                quantity: line.quantity,
                selected_size: line.selected_size.clone(),
                customization: line.customization.clone(),
                customization_cost: line.customization_cost(),
            })
            .collect();

        Order {
            id: order_id,
            user_id,
            order_items,
            shipping_address: self.shipping_address.clone(),
            payment_method: self.payment_method,
            applied_coupon: self.coupon.clone(),
            price_breakdown: self.breakdown,
            is_paid: false,
            paid_at: None,
            is_delivered: false,
            delivered_at: None,
            created_at: now,
        }
    }
}

// =============================================================================
// Validator
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementValidator {
    pub policy: PricingPolicy,
    /// Largest client/server difference that is not reported.
    pub epsilon: Money,
}

impl Default for PlacementValidator {
    fn default() -> Self {
        PlacementValidator {
            policy: PricingPolicy::default(),
            epsilon: Money::from_cents(1),
        }
    }
}

impl PlacementValidator {
    /// Validates `request` against a catalog snapshot and the looked-up
    /// coupon.
    ///
    /// `products` must contain every product the request references that
    /// exists; `coupon` is the record for `request.coupon_code()`.
    pub fn validate(
        &self,
        request: &OrderRequest,
        products: &[Product],
        coupon: Option<&Coupon>,
        user_redemptions: Option<i64>,
        now: DateTime<Utc>,
    ) -> CoreResult<PlacementPlan> {
        validate_line_count(request.order_items.len())?;
        for line in &request.order_items {
            line.validate()?;
        }
        validate_shipping_address(&request.shipping_address)?;
        let payment_method = validate_payment_method(&request.payment_method)?;

        let code = request.coupon_code()?;
        if code.is_some() && coupon.is_none() {
            return Err(CouponRejection::NotFound.into());
        }

        let reservations =
            check_stock(&request.order_items, products).map_err(CoreError::OutOfStock)?;

        let mut discrepancies = Vec::new();
        let lines: Vec<CartLine> = request
            .order_items
            .iter()
            .enumerate()
            .map(|(index, submitted)| {
                let catalog_price = products
                    .iter()
                    .find(|p| p.id == submitted.product_id)
                    .map(|p| (p.price, p.name.clone()));

                match catalog_price {
                    Some((price, name)) => {
                        compare(
                            &mut discrepancies,
                            format!("orderItems[{index}].unitPrice"),
                            Some(submitted.unit_price),
                            price,
                            self.epsilon,
                        );
                        Ok(CartLine {
                            unit_price: price,
                            name,
                            ..submitted.clone()
                        })
                    }
                    None => Err(CoreError::not_found("product", submitted.product_id.clone())),
                }
            })
            .collect::<CoreResult<_>>()?;

        let coupon = if code.is_some() { coupon } else { None };
        let priced = self.policy.price(&lines, coupon, now, user_redemptions)?;
        let b = &priced.breakdown;

        compare(&mut discrepancies, "itemsPrice", request.items_price, b.items_price, self.epsilon);
        compare(
            &mut discrepancies,
            "discountAmount",
            request.discount_amount,
            b.discount_amount,
            self.epsilon,
        );
        compare(
            &mut discrepancies,
            "shippingPrice",
            request.shipping_price,
            b.shipping_price,
            self.epsilon,
        );
        compare(&mut discrepancies, "taxPrice", request.tax_price, b.tax_price, self.epsilon);
        compare(&mut discrepancies, "totalPrice", request.total_price, b.total_price, self.epsilon);

        Ok(PlacementPlan {
            lines,
            reservations,
            breakdown: priced.breakdown,
            coupon: priced.coupon,
            shipping_address: request.shipping_address.clone(),
            payment_method,
            discrepancies,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coupon::DiscountType;
    use crate::customization::{Customization, Monogram};
    use crate::error::ErrorKind;
    use crate::types::SizeStock;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn suit() -> Product {
        Product {
            id: "suit".to_string(),
            name: "Navy Suit".to_string(),
            price: Money::from_dollars(100),
            count_in_stock: 0,
            sizes: vec![SizeStock {
                size: "40R".to_string(),
                quantity: 3,
            }],
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
            usage_limit_total: Some(10),
            usage_limit_per_user: Some(1),
            times_used: 0,
            is_active: true,
        }
    }

    fn request() -> OrderRequest {
        OrderRequest {
            order_items: vec![CartLine {
                product_id: "suit".to_string(),
                name: "Navy Suit".to_string(),
                unit_price: Money::from_dollars(100),
                quantity: 1,
                selected_size: Some("40R".to_string()),
                customization: Some(Customization {
                    monogram: Some(Monogram {
                        text: "AB".to_string(),
                        premium: false,
                    }),
                    ..Default::default()
                }),
            }],
            shipping_address: ShippingAddress {
                address: "1 Main St".to_string(),
                city: "Springfield".to_string(),
                postal_code: "12345".to_string(),
                country: "US".to_string(),
            },
            payment_method: "paypal".to_string(),
            applied_coupon: Some(CouponRef::Code("save20".to_string())),
            items_price: Some(Money::from_cents(12_500)),
            discount_amount: Some(Money::from_cents(2_500)),
            shipping_price: Some(Money::from_cents(1_000)),
            tax_price: Some(Money::from_cents(1_500)),
            total_price: Some(Money::from_cents(12_500)),
        }
    }

    #[test]
    fn test_accepts_matching_request() {
        let plan = PlacementValidator::default()
            .validate(&request(), &[suit()], Some(&save20()), Some(0), now())
            .unwrap();

        assert_eq!(plan.breakdown.total_price.cents(), 12_500);
        assert!(plan.discrepancies.is_empty());
        assert_eq!(plan.coupon.as_ref().map(|c| c.code.as_str()), Some("SAVE20"));
        assert_eq!(plan.reservations[0].quantity, 1);
        assert_eq!(plan.payment_method, PaymentMethod::Paypal);
    }

    #[test]
    fn test_client_totals_never_win() {
        let mut req = request();
        req.order_items[0].unit_price = Money::from_cents(1);
        req.total_price = Some(Money::from_cents(100));
        req.tax_price = Some(Money::from_cents(1_501));

        let plan = PlacementValidator::default()
            .validate(&req, &[suit()], Some(&save20()), Some(0), now())
            .unwrap();

        assert_eq!(plan.lines[0].unit_price, Money::from_dollars(100));
        assert_eq!(plan.breakdown.total_price.cents(), 12_500);

        // tax is off by exactly one cent: tolerated
        let fields: Vec<_> = plan.discrepancies.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec!["orderItems[0].unitPrice", "totalPrice"]);
    }

    #[test]
    fn test_extreme_client_totals_are_discrepancies() {
        let mut req = request();
        req.order_items[0].unit_price = Money::from_cents(i64::MAX);
        req.items_price = Some(Money::from_cents(i64::MAX));
        req.total_price = Some(Money::from_cents(i64::MIN));
        req.tax_price = Some(Money::from_cents(i64::MIN + 1));

        let plan = PlacementValidator::default()
            .validate(&req, &[suit()], Some(&save20()), Some(0), now())
            .unwrap();

        assert_eq!(plan.breakdown.total_price.cents(), 12_500);
        let fields: Vec<_> = plan.discrepancies.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["orderItems[0].unitPrice", "itemsPrice", "taxPrice", "totalPrice"]
        );
    }

    #[test]
    fn test_rejected_coupon_fails_request() {
        let mut coupon = save20();
        coupon.times_used = 10;
        let err = PlacementValidator::default()
            .validate(&request(), &[suit()], Some(&coupon), Some(0), now())
            .unwrap_err();
        assert_eq!(err.code(), "USAGE_LIMIT_EXCEEDED");
        assert_eq!(err.kind(), ErrorKind::Eligibility);

        let err = PlacementValidator::default()
            .validate(&request(), &[suit()], Some(&save20()), Some(1), now())
            .unwrap_err();
        assert_eq!(err.code(), "PER_USER_LIMIT_EXCEEDED");

        let err = PlacementValidator::default()
            .validate(&request(), &[suit()], None, None, now())
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn test_stock_failure_names_the_line() {
        let mut req = request();
        req.order_items[0].quantity = 4;
        let err = PlacementValidator::default()
            .validate(&req, &[suit()], Some(&save20()), None, now())
            .unwrap_err();
        match err {
            CoreError::OutOfStock(violations) => assert_eq!(violations.len(), 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_shape_validation() {
        let validator = PlacementValidator::default();

        let mut req = request();
        req.order_items.clear();
        assert_eq!(
            validator.validate(&req, &[suit()], None, None, now()).unwrap_err().code(),
            "REQUIRED_FIELD"
        );

        let mut req = request();
        req.shipping_address.postal_code.clear();
        assert!(validator.validate(&req, &[suit()], None, None, now()).is_err());

        let mut req = request();
        req.payment_method = "iou".to_string();
        assert_eq!(
            validator.validate(&req, &[suit()], None, None, now()).unwrap_err().code(),
            "NOT_ALLOWED"
        );

        let mut req = request();
        req.applied_coupon = Some(CouponRef::Code("!".to_string()));
        assert_eq!(
            validator.validate(&req, &[suit()], None, None, now()).unwrap_err().code(),
            "MALFORMED_CODE"
        );
    }

    #[test]
    fn test_coupon_ref_accepts_object() {
        let req: OrderRequest = serde_json::from_str(
            r#"{"appliedCoupon":{"couponCode":"save20","discountAmount":25}}"#,
        )
        .unwrap();
        assert_eq!(req.coupon_code(), Ok(Some("SAVE20".to_string())));
    }

    #[test]
    fn test_to_order_freezes_lines() {
        let plan = PlacementValidator::default()
            .validate(&request(), &[suit()], Some(&save20()), None, now())
            .unwrap();
        let order = plan.to_order("o1".to_string(), "u1".to_string(), now());

        assert_eq!(order.order_items.len(), 1);
        assert_eq!(order.order_items[0].price, Money::from_dollars(100));
        assert_eq!(order.order_items[0].customization_cost, Money::from_dollars(25));
        assert_eq!(order.price_breakdown, plan.breakdown);
        assert!(!order.is_paid && !order.is_delivered);
    }
}
