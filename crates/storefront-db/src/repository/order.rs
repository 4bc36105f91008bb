//! # Order Repository
//!
//! Placement persistence and the two lifecycle flags.
//!
//! ## Placement Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    create(order, reservations)                          │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │    ├── reserve() per line     ← 0 rows → STOCK_CONFLICT                 │
//! │    ├── redeem(coupon)         ← 0 rows → USAGE_LIMIT_EXCEEDED           │
//! │    ├── INSERT orders                                                    │
//! │    └── INSERT order_items (position-ordered, frozen prices)             │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  Any failure rolls back every decrement made before it.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};

use super::{coupon, product};
use crate::error::{DbError, DbResult};
use storefront_core::coupon::AppliedCoupon;
use storefront_core::customization::Customization;
use storefront_core::order::{Order, OrderItem};
use storefront_core::pricing::PriceBreakdown;
use storefront_core::stock::Reservation;
use storefront_core::{CoreError, Money, PaymentMethod, ShippingAddress};

#[derive(Debug, FromRow)]
struct OrderRow {
    id: String,
    user_id: String,
    shipping_address: String,
    payment_method: PaymentMethod,
    applied_coupon: Option<String>,
    items_price_cents: i64,
    discount_cents: i64,
    discounted_items_cents: i64,
    shipping_cents: i64,
    tax_cents: i64,
    total_cents: i64,
    is_paid: bool,
    paid_at: Option<DateTime<Utc>>,
    is_delivered: bool,
    delivered_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct OrderItemRow {
    id: String,
    product_id: String,
    name: String,
    price_cents: i64,
    quantity: i64,
    selected_size: Option<String>,
    customization: Option<String>,
    customization_cents: i64,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = DbError;

    fn try_from(row: OrderItemRow) -> DbResult<Self> {
        let customization: Option<Customization> = row
            .customization
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(OrderItem {
            id: row.id,
            product_id: row.product_id,
            name: row.name,
            price: Money::from_cents(row.price_cents),
            quantity: row.quantity,
            selected_size: row.selected_size,
            customization,
            customization_cost: Money::from_cents(row.customization_cents),
        })
    }
}

const SELECT_ORDER: &str = r#"
    SELECT id, user_id, shipping_address, payment_method, applied_coupon,
           items_price_cents, discount_cents, discounted_items_cents,
           shipping_cents, tax_cents, total_cents,
           is_paid, paid_at, is_delivered, delivered_at, created_at
    FROM orders
"#;

/// Repository for order database operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Persists a validated order, taking its stock and coupon use in the
    /// same transaction.
    pub async fn create(&self, order: &Order, reservations: &[Reservation]) -> DbResult<()> {
        debug!(
            id = %order.id,
            lines = order.order_items.len(),
            reservations = reservations.len(),
            "Creating order"
        );

        let mut tx = self.pool.begin().await?;

        for reservation in reservations {
            product::reserve(&mut tx, reservation).await?;
        }

        if let Some(applied) = &order.applied_coupon {
            coupon::redeem(&mut tx, &applied.coupon_id).await?;
        }

        let breakdown = &order.price_breakdown;
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, user_id, shipping_address, payment_method,
                coupon_id, applied_coupon,
                items_price_cents, discount_cents, discounted_items_cents,
                shipping_cents, tax_cents, total_cents,
                is_paid, paid_at, is_delivered, delivered_at, created_at
            ) VALUES (
                ?1, ?2, ?3, ?4,
                ?5, ?6,
                ?7, ?8, ?9,
                ?10, ?11, ?12,
                ?13, ?14, ?15, ?16, ?17
            )
            "#,
        )
        .bind(&order.id)
        .bind(&order.user_id)
        .bind(serde_json::to_string(&order.shipping_address)?)
        .bind(order.payment_method)
        .bind(order.applied_coupon.as_ref().map(|c| c.coupon_id.clone()))
        .bind(order.applied_coupon.as_ref().map(serde_json::to_string).transpose()?)
        .bind(breakdown.items_price.cents())
        .bind(breakdown.discount_amount.cents())
        .bind(breakdown.discounted_items_price.cents())
        .bind(breakdown.shipping_price.cents())
        .bind(breakdown.tax_price.cents())
        .bind(breakdown.total_price.cents())
        .bind(order.is_paid)
        .bind(order.paid_at)
        .bind(order.is_delivered)
        .bind(order.delivered_at)
        .bind(order.created_at)
        .execute(&mut *tx)
        .await?;

        for (position, item) in order.order_items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    id, order_id, position, product_id, name,
                    price_cents, quantity, selected_size,
                    customization, customization_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
            )
            .bind(&item.id)
            .bind(&order.id)
            .bind(position as i64)
            .bind(&item.product_id)
            .bind(&item.name)
            .bind(item.price.cents())
            .bind(item.quantity)
            .bind(&item.selected_size)
            .bind(item.customization.as_ref().map(serde_json::to_string).transpose()?)
            .bind(item.customization_cost.cents())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            id = %order.id,
            total = %breakdown.total_price,
            coupon = ?order.applied_coupon.as_ref().map(|c| c.code.as_str()),
            "Order placed"
        );
        Ok(())
    }

    /// Loads an order with its items in placement order.
    pub async fn get(&self, id: &str) -> DbResult<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as(&format!("{SELECT_ORDER} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    /// A customer's orders, newest first.
    pub async fn list_for_user(&self, user_id: &str) -> DbResult<Vec<Order>> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "{SELECT_ORDER} WHERE user_id = ?1 ORDER BY created_at DESC, id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        self.hydrate_all(rows).await
    }

    /// Every order, newest first.
    pub async fn list_all(&self) -> DbResult<Vec<Order>> {
        let rows: Vec<OrderRow> =
            sqlx::query_as(&format!("{SELECT_ORDER} ORDER BY created_at DESC, id"))
                .fetch_all(&self.pool)
                .await?;
        self.hydrate_all(rows).await
    }

    async fn hydrate_all(&self, rows: Vec<OrderRow>) -> DbResult<Vec<Order>> {
        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            orders.push(self.hydrate(row).await?);
        }
        Ok(orders)
    }

    /// Attaches items to a header row and checks the stored breakdown.
    async fn hydrate(&self, row: OrderRow) -> DbResult<Order> {
        let items: Vec<OrderItemRow> = sqlx::query_as(
            r#"
            SELECT id, product_id, name, price_cents, quantity, selected_size,
                   customization, customization_cents
            FROM order_items
            WHERE order_id = ?1
            ORDER BY position
            "#,
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await?;

        let price_breakdown = PriceBreakdown {
            items_price: Money::from_cents(row.items_price_cents),
            discount_amount: Money::from_cents(row.discount_cents),
            discounted_items_price: Money::from_cents(row.discounted_items_cents),
            shipping_price: Money::from_cents(row.shipping_cents),
            tax_price: Money::from_cents(row.tax_cents),
            total_price: Money::from_cents(row.total_cents),
        };
        if !price_breakdown.is_consistent() {
            return Err(DbError::Domain(CoreError::Integrity {
                reason: format!("order {} has an inconsistent price breakdown", row.id),
            }));
        }

        let shipping_address: ShippingAddress = serde_json::from_str(&row.shipping_address)?;
        let applied_coupon: Option<AppliedCoupon> = row
            .applied_coupon
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(Order {
            id: row.id,
            user_id: row.user_id,
            order_items: items
                .into_iter()
                .map(OrderItem::try_from)
                .collect::<DbResult<_>>()?,
            shipping_address,
            payment_method: row.payment_method,
            applied_coupon,
            price_breakdown,
            is_paid: row.is_paid,
            paid_at: row.paid_at,
            is_delivered: row.is_delivered,
            delivered_at: row.delivered_at,
            created_at: row.created_at,
        })
    }

    /// Sets `is_paid`. Fails with `ORDER_STATE_CONFLICT` if it already was.
    pub async fn mark_paid(&self, id: &str, now: DateTime<Utc>) -> DbResult<Order> {
        let mut order = self.require(id).await?;
        order.mark_paid(now)?;

        let result = sqlx::query("UPDATE orders SET is_paid = 1, paid_at = ?1 WHERE id = ?2 AND is_paid = 0")
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        ensure_flipped(result.rows_affected(), id, "paid")?;

        info!(id = %id, "Order paid");
        Ok(order)
    }

    /// Sets `is_delivered`. Fails with `ORDER_STATE_CONFLICT` if it already was.
    pub async fn mark_delivered(&self, id: &str, now: DateTime<Utc>) -> DbResult<Order> {
        let mut order = self.require(id).await?;
        order.mark_delivered(now)?;

        let result = sqlx::query(
            "UPDATE orders SET is_delivered = 1, delivered_at = ?1 WHERE id = ?2 AND is_delivered = 0",
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        ensure_flipped(result.rows_affected(), id, "delivered")?;

        info!(id = %id, "Order delivered");
        Ok(order)
    }

    async fn require(&self, id: &str) -> DbResult<Order> {
        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", id))
    }
}

/// A concurrent request flipped the flag between our read and write.
fn ensure_flipped(rows_affected: u64, id: &str, state: &str) -> DbResult<()> {
    if rows_affected == 0 {
        return Err(DbError::Domain(CoreError::OrderStateConflict {
            order_id: id.to_string(),
            state: state.to_string(),
        }));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::Duration;
    use storefront_core::coupon::{Coupon, CouponRejection, DiscountType};
    use storefront_core::{Product, SizeStock};

    fn suit() -> Product {
        Product {
            id: "suit".to_string(),
            name: "Navy Suit".to_string(),
            price: Money::from_dollars(100),
            count_in_stock: 0,
            sizes: vec![SizeStock {
                size: "40R".to_string(),
                quantity: 2,
            }],
        }
    }

    fn coupon(limit: i64) -> Coupon {
        let now = Utc::now();
        Coupon {
            id: "c-1".to_string(),
            code: "SAVE20".to_string(),
            description: None,
            discount_type: DiscountType::Percentage,
            discount_value: 20,
            minimum_purchase_amount: Money::zero(),
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(1),
            usage_limit_total: Some(limit),
            usage_limit_per_user: None,
            times_used: 0,
            is_active: true,
        }
    }

    fn order(id: &str, with_coupon: bool) -> Order {
        let applied_coupon = with_coupon.then(|| AppliedCoupon {
            coupon_id: "c-1".to_string(),
            code: "SAVE20".to_string(),
            discount_type: DiscountType::Percentage,
            discount_value: 20,
            discount_amount: Money::from_dollars(20),
        });
        let discount = if with_coupon { 20 } else { 0 };
        let discounted = Money::from_dollars(100 - discount);
        let tax = Money::from_cents(discounted.cents() * 15 / 100);

        Order {
            id: id.to_string(),
            user_id: "alice".to_string(),
            order_items: vec![OrderItem {
                id: format!("{id}-1"),
                product_id: "suit".to_string(),
                name: "Navy Suit".to_string(),
                price: Money::from_dollars(100),
                quantity: 1,
                selected_size: Some("40R".to_string()),
                customization: None,
                customization_cost: Money::zero(),
            }],
            shipping_address: ShippingAddress {
                address: "1 Main St".to_string(),
                city: "Springfield".to_string(),
                postal_code: "12345".to_string(),
                country: "US".to_string(),
            },
            payment_method: PaymentMethod::Paypal,
            applied_coupon,
            price_breakdown: PriceBreakdown {
                items_price: Money::from_dollars(100),
                discount_amount: Money::from_dollars(discount),
                discounted_items_price: discounted,
                shipping_price: Money::from_dollars(10),
                tax_price: tax,
                total_price: discounted + Money::from_dollars(10) + tax,
            },
            is_paid: false,
            paid_at: None,
            is_delivered: false,
            delivered_at: None,
            created_at: Utc::now(),
        }
    }

    fn one_suit() -> Vec<Reservation> {
        vec![Reservation {
            product_id: "suit".to_string(),
            size: Some("40R".to_string()),
            quantity: 1,
        }]
    }

    async fn seeded() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.products().insert(&suit()).await.unwrap();
        db.coupons().insert(&coupon(1)).await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let db = seeded().await;
        let placed = order("o-1", true);
        db.orders().create(&placed, &one_suit()).await.unwrap();

        let loaded = db.orders().get("o-1").await.unwrap().unwrap();
        assert_eq!(loaded.order_items, placed.order_items);
        assert_eq!(loaded.price_breakdown, placed.price_breakdown);
        assert_eq!(loaded.applied_coupon, placed.applied_coupon);

        let stock = db.products().get_by_id("suit").await.unwrap().unwrap();
        assert_eq!(stock.available(Some("40R")), Some(1));
        let coupon = db.coupons().get("c-1").await.unwrap().unwrap();
        assert_eq!(coupon.times_used, 1);
    }

    #[tokio::test]
    async fn test_exhausted_coupon_rolls_back_stock() {
        let db = seeded().await;
        db.orders().create(&order("o-1", true), &one_suit()).await.unwrap();

        let err = db
            .orders()
            .create(&order("o-2", true), &one_suit())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::Coupon(CouponRejection::UsageLimitExceeded))
        ));

        assert!(db.orders().get("o-2").await.unwrap().is_none());
        let stock = db.products().get_by_id("suit").await.unwrap().unwrap();
        assert_eq!(stock.available(Some("40R")), Some(1));
    }

    #[tokio::test]
    async fn test_stock_conflict() {
        let db = seeded().await;
        let two = vec![Reservation {
            quantity: 3,
            ..one_suit().remove(0)
        }];

        let err = db.orders().create(&order("o-1", false), &two).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::StockConflict { .. })));
    }

    #[tokio::test]
    async fn test_lifecycle_flags() {
        let db = seeded().await;
        db.orders().create(&order("o-1", false), &one_suit()).await.unwrap();

        let paid = db.orders().mark_paid("o-1", Utc::now()).await.unwrap();
        assert!(paid.is_paid);
        assert!(paid.paid_at.is_some());

        let err = db.orders().mark_paid("o-1", Utc::now()).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::OrderStateConflict { .. })));

        let delivered = db.orders().mark_delivered("o-1", Utc::now()).await.unwrap();
        assert!(delivered.is_delivered);

        let missing = db.orders().mark_paid("nope", Utc::now()).await.unwrap_err();
        assert!(matches!(missing, DbError::NotFound { .. }));
    }
    #[tokio::test]
    async fn test_listing_scopes() {
        let db = seeded().await;
        db.orders().create(&order("o-1", false), &one_suit()).await.unwrap();
        let bobs = Order {
            user_id: "bob".to_string(),
            ..order("o-2", false)
        };
        db.orders().create(&bobs, &one_suit()).await.unwrap();

        let mine = db.orders().list_for_user("alice").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, "o-1");
        assert_eq!(mine[0].order_items.len(), 1);

        assert_eq!(db.orders().list_all().await.unwrap().len(), 2);
        assert!(db.orders().list_for_user("carol").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_redemptions_count_paid_orders_only() {
        let db = seeded().await;
        db.coupons()
            .update(&Coupon { usage_limit_total: None, ..coupon(1) }, false)
            .await
            .unwrap();
        db.orders().create(&order("o-1", true), &one_suit()).await.unwrap();
        db.orders().create(&order("o-2", true), &one_suit()).await.unwrap();

        assert_eq!(db.coupons().count_user_redemptions("c-1", "alice").await.unwrap(), 0);
        db.orders().mark_paid("o-1", Utc::now()).await.unwrap();
        assert_eq!(db.coupons().count_user_redemptions("c-1", "alice").await.unwrap(), 1);
        assert_eq!(db.coupons().count_user_redemptions("c-1", "bob").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_deleting_a_used_coupon_keeps_the_snapshot() {
        let db = seeded().await;
        let placed = order("o-1", true);
        db.orders().create(&placed, &one_suit()).await.unwrap();

        db.coupons().delete("c-1").await.unwrap();

        let loaded = db.orders().get("o-1").await.unwrap().unwrap();
        assert_eq!(loaded.applied_coupon, placed.applied_coupon);
        assert_eq!(db.coupons().count_user_redemptions("c-1", "alice").await.unwrap(), 0);
    }
}
