//! Property-based tests for pricing, coupons and refunds.
//!
//! These check the relations that must hold for every input, not just the
//! hand-picked cases in the unit tests.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use storefront_core::cart::{Cart, CartLine};
use storefront_core::coupon::{Coupon, DiscountType};
use storefront_core::customization::{self, Alterations, Customization, LapelStyle, Monogram};
use storefront_core::money::Money;
use storefront_core::order::{Order, OrderItem};
use storefront_core::pricing::PricingPolicy;
use storefront_core::refund::return_amount;
use storefront_core::returns::{ItemCondition, ReturnItem};
use storefront_core::types::{PaymentMethod, ShippingAddress};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn coupon(discount_type: DiscountType, value: i64) -> Coupon {
    Coupon {
        id: "c1".to_string(),
        code: "PROMO".to_string(),
        description: None,
        discount_type,
        discount_value: value,
        minimum_purchase_amount: Money::zero(),
        valid_from: now() - Duration::days(1),
        valid_until: now() + Duration::days(1),
        usage_limit_total: None,
        usage_limit_per_user: None,
        times_used: 0,
        is_active: true,
    }
}

fn line_strategy() -> impl Strategy<Value = CartLine> {
    (1i64..50_000, 1i64..20, any::<bool>()).prop_map(|(cents, qty, peak)| CartLine {
        product_id: format!("p{cents}"),
        name: "item".to_string(),
        unit_price: Money::from_cents(cents),
        quantity: qty,
        selected_size: None,
        customization: peak.then(|| Customization {
            lapel_style: LapelStyle::Peak,
            ..Default::default()
        }),
    })
}

fn coupon_strategy() -> impl Strategy<Value = Coupon> {
    prop_oneof![
        (1i64..=100).prop_map(|percent| coupon(DiscountType::Percentage, percent)),
        (1i64..100_000).prop_map(|cents| coupon(DiscountType::FixedAmount, cents)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn customization_cost_is_idempotent(
        text in "[A-Z]{0,3}",
        premium in any::<bool>(),
        sleeve in -3i32..3,
        rush in any::<bool>(),
    ) {
        let c = Customization {
            monogram: Some(Monogram { text, premium }),
            alterations: Alterations { sleeve, ..Default::default() },
            rush,
            ..Default::default()
        };
        let first = customization::resolve(Some(&c));
        prop_assert_eq!(first, customization::resolve(Some(&c)));
        prop_assert_eq!(first, c.surcharge());
        prop_assert!(!first.is_negative());
    }

    #[test]
    fn breakdown_fields_always_add_up(
        items in 0i64..10_000_000,
        discount in 0i64..10_000_000,
    ) {
        let b = PricingPolicy::default()
            .breakdown(Money::from_cents(items), Money::from_cents(discount));
        prop_assert!(b.is_consistent(), "inconsistent breakdown: {:?}", b);
        prop_assert!(!b.total_price.is_negative());
    }

    #[test]
    fn discount_never_exceeds_items_price(
        lines in prop::collection::vec(line_strategy(), 1..8),
        coupon in coupon_strategy(),
    ) {
        let priced = PricingPolicy::default()
            .price(&lines, Some(&coupon), now(), None)
            .unwrap();
        let b = priced.breakdown;
        prop_assert!(b.discount_amount <= b.items_price);
        prop_assert!(b.is_consistent());
    }

    #[test]
    fn preview_matches_authoritative_price(
        lines in prop::collection::vec(line_strategy(), 1..8),
        coupon in coupon_strategy(),
    ) {
        let policy = PricingPolicy::default();
        let cart = Cart {
            lines: lines.clone(),
            coupon_code: Some(coupon.code.clone()),
        };

        let quote = policy.quote(&cart, Some(&coupon), now(), None);
        let priced = policy.price(&lines, Some(&coupon), now(), None).unwrap();

        prop_assert_eq!(quote.breakdown, priced.breakdown);
        prop_assert_eq!(quote.coupon, priced.coupon);
    }

    #[test]
    fn pricing_is_deterministic(
        lines in prop::collection::vec(line_strategy(), 1..8),
        coupon in coupon_strategy(),
    ) {
        let policy = PricingPolicy::default();
        let first = policy.price(&lines, Some(&coupon), now(), None).unwrap();
        let second = policy.price(&lines, Some(&coupon), now(), None).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn free_shipping_only_strictly_above_threshold(discounted in 0i64..30_000) {
        let policy = PricingPolicy::default();
        let shipping = policy.shipping_for(Money::from_cents(discounted));
        if discounted > 10_000 {
            prop_assert_eq!(shipping, Money::zero());
        } else {
            prop_assert_eq!(shipping, Money::from_dollars(10));
        }
    }

    #[test]
    fn partial_returns_sum_to_full_return(
        prices in prop::collection::vec((1i64..100_000, 1i64..10), 1..6),
        split in 0.0f64..1.0,
    ) {
        let order = order_from(&prices);

        let full: Vec<ReturnItem> = order
            .order_items
            .iter()
            .map(|i| returned(&i.id, i.quantity))
            .collect();
        let (first, second): (Vec<_>, Vec<_>) = order
            .order_items
            .iter()
            .map(|i| {
                let head = ((i.quantity as f64) * split).floor() as i64;
                (returned(&i.id, head), returned(&i.id, i.quantity - head))
            })
            .unzip();

        let total = return_amount(&order, &full).unwrap();
        let parts = return_amount(&order, &first).unwrap() + return_amount(&order, &second).unwrap();
        prop_assert_eq!(total, parts);
        prop_assert_eq!(total, return_amount(&order, &full).unwrap());
    }
}

fn order_from(prices: &[(i64, i64)]) -> Order {
    let order_items: Vec<OrderItem> = prices
        .iter()
        .enumerate()
        .map(|(n, (cents, qty))| OrderItem {
            id: format!("i{n}"),
            product_id: format!("p{n}"),
            name: "item".to_string(),
            price: Money::from_cents(*cents),
            quantity: *qty,
            selected_size: None,
            customization: None,
            customization_cost: Money::zero(),
        })
        .collect();
    let items: Money = order_items.iter().map(|i| i.price.multiply_quantity(i.quantity)).sum();

    Order {
        id: "o1".to_string(),
        user_id: "u1".to_string(),
        order_items,
        shipping_address: ShippingAddress::default(),
        payment_method: PaymentMethod::Card,
        applied_coupon: None,
        price_breakdown: PricingPolicy::default().breakdown(items, Money::zero()),
        is_paid: true,
        paid_at: Some(now()),
        is_delivered: true,
        delivered_at: Some(now()),
        created_at: now(),
    }
}

fn returned(order_item_id: &str, qty: i64) -> ReturnItem {
    ReturnItem {
        order_item_id: order_item_id.to_string(),
        product_id: "p".to_string(),
        name: "item".to_string(),
        return_qty: qty,
        condition: ItemCondition::Good,
        return_reason: "changed mind".to_string(),
    }
}
