//! # Return Repository
//!
//! Return requests and their guarded status writes.
//!
//! ## Compare-and-Swap
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Admin A: refund                     Admin B: refund                    │
//! │  load (status=inspecting)            load (status=inspecting)           │
//! │  apply → refunded                    apply → refunded                   │
//! │       │                                   │                             │
//! │  UPDATE returns SET status='refunded', …                                │
//! │  WHERE id = ? AND status = 'inspecting'                                 │
//! │       │                                   │                             │
//! │  1 row ✓ (effects applied)           0 rows → STATUS_CONFLICT           │
//! │                                      (refunded, expected inspecting)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Side effects that touch storage (restock, coupon usage) run inside the
//! same transaction as the status write. The rest are returned to the
//! caller.
//!
//! ## Opening
//! ```text
//! BEGIN
//!   ├── UPDATE orders (no-op)     ← takes the write lock first
//!   ├── SELECT sibling returns    ← quantities already claimed
//!   ├── MAX(return_number) + 1
//!   ├── build(siblings, number)   ← RETURN_QUANTITY_EXCEEDED aborts here
//!   └── INSERT returns
//! COMMIT
//! ```

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::{coupon, product};
use crate::error::{DbError, DbResult};
use storefront_core::returns::{
    format_return_number, ReturnMethod, ReturnRequest, ReturnStatus, SideEffect,
};
use storefront_core::{CoreError, CoreResult, Money};

#[derive(Debug, FromRow)]
struct ReturnRow {
    id: String,
    return_number: String,
    order_id: String,
    user_id: String,
    status: ReturnStatus,
    return_method: ReturnMethod,
    customer_notes: Option<String>,
    return_amount_cents: i64,
    return_items: String,
    quality_check: Option<String>,
    refund: Option<String>,
    history: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReturnRow> for ReturnRequest {
    type Error = DbError;

    fn try_from(row: ReturnRow) -> DbResult<Self> {
        Ok(ReturnRequest {
            id: row.id,
            return_number: row.return_number,
            order_id: row.order_id,
            user_id: row.user_id,
            return_items: serde_json::from_str(&row.return_items)?,
            status: row.status,
            return_method: row.return_method,
            customer_notes: row.customer_notes,
            return_amount: Money::from_cents(row.return_amount_cents),
            quality_check: row
                .quality_check
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            refund: row.refund.as_deref().map(serde_json::from_str).transpose()?,
            history: serde_json::from_str(&row.history)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SELECT_RETURN: &str = r#"
    SELECT id, return_number, order_id, user_id, status, return_method,
           customer_notes, return_amount_cents, return_items, quality_check,
           refund, history, created_at, updated_at
    FROM returns
"#;

/// Repository for return request operations.
#[derive(Debug, Clone)]
pub struct ReturnRepository {
    pool: SqlitePool,
}

impl ReturnRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ReturnRepository { pool }
    }

    /// Opens a return against `order_id` in one write-locked transaction.
    ///
    /// `build` receives the order's existing returns and the next free
    /// return number, and decides whether the new return is allowed. No
    /// other return for any order can be written between that read and the
    /// insert, so two concurrent opens can never over-return a line.
    pub async fn open<F>(&self, order_id: &str, build: F) -> DbResult<ReturnRequest>
    where
        F: FnOnce(&[ReturnRequest], String) -> CoreResult<ReturnRequest>,
    {
        let mut tx = self.pool.begin().await?;

        // A write as the first statement takes SQLite's write lock now
        // instead of at the insert; competing opens queue on busy_timeout.
        let locked = sqlx::query("UPDATE orders SET is_delivered = is_delivered WHERE id = ?1")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;
        if locked.rows_affected() == 0 {
            return Err(DbError::not_found("Order", order_id));
        }

        let siblings = fetch_for_order(&mut tx, order_id).await?;
        let last: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(CAST(SUBSTR(return_number, 4) AS INTEGER)), 0) FROM returns",
        )
        .fetch_one(&mut *tx)
        .await?;

        let ret = build(&siblings, format_return_number(last + 1))?;
        debug!(id = %ret.id, return_number = %ret.return_number, "Inserting return");
        insert(&mut tx, &ret).await?;

        tx.commit().await?;

        info!(
            return_number = %ret.return_number,
            order_id = %ret.order_id,
            amount = %ret.return_amount,
            "Return requested"
        );
        Ok(ret)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<ReturnRequest>> {
        let row: Option<ReturnRow> = sqlx::query_as(&format!("{SELECT_RETURN} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ReturnRequest::try_from).transpose()
    }

    /// Every return of an order, oldest first.
    pub async fn list_for_order(&self, order_id: &str) -> DbResult<Vec<ReturnRequest>> {
        let mut conn = self.pool.acquire().await?;
        fetch_for_order(&mut conn, order_id).await
    }

    /// A customer's returns, newest first.
    pub async fn list_for_user(&self, user_id: &str) -> DbResult<Vec<ReturnRequest>> {
        let rows: Vec<ReturnRow> = sqlx::query_as(&format!(
            "{SELECT_RETURN} WHERE user_id = ?1 ORDER BY created_at DESC, return_number DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ReturnRequest::try_from).collect()
    }

    /// Every return, newest first, optionally narrowed to one status.
    pub async fn list_all(&self, status: Option<ReturnStatus>) -> DbResult<Vec<ReturnRequest>> {
        let rows: Vec<ReturnRow> = sqlx::query_as(&format!(
            "{SELECT_RETURN} WHERE (?1 IS NULL OR status = ?1) \
             ORDER BY created_at DESC, return_number DESC"
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ReturnRequest::try_from).collect()
    }

    /// Writes `ret` if the stored status is still `expected_from`, then
    /// performs the storage side effects in the same transaction.
    pub async fn save_transition(
        &self,
        ret: &ReturnRequest,
        expected_from: ReturnStatus,
        effects: &[SideEffect],
    ) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE returns
            SET status = ?1, quality_check = ?2, refund = ?3, history = ?4, updated_at = ?5
            WHERE id = ?6 AND status = ?7
            "#,
        )
        .bind(ret.status)
        .bind(ret.quality_check.as_ref().map(serde_json::to_string).transpose()?)
        .bind(ret.refund.as_ref().map(serde_json::to_string).transpose()?)
        .bind(serde_json::to_string(&ret.history)?)
        .bind(ret.updated_at)
        .bind(&ret.id)
        .bind(expected_from)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let actual: Option<ReturnStatus> =
                sqlx::query_scalar("SELECT status FROM returns WHERE id = ?1")
                    .bind(&ret.id)
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(match actual {
                Some(actual) => DbError::Domain(CoreError::StatusConflict {
                    return_id: ret.id.clone(),
                    expected: expected_from,
                    actual,
                }),
                None => DbError::not_found("Return", ret.id.clone()),
            });
        }

        for effect in effects {
            match effect {
                SideEffect::RestockItems { items } => {
                    for line in items {
                        product::restock(&mut tx, line).await?;
                    }
                }
                SideEffect::RestoreCouponUsage { coupon_id } => {
                    coupon::release(&mut tx, coupon_id).await?;
                }
                _ => {}
            }
        }

        tx.commit().await?;

        info!(
            return_number = %ret.return_number,
            from = %expected_from,
            to = %ret.status,
            "Return updated"
        );
        Ok(())
    }
}

async fn fetch_for_order(
    conn: &mut SqliteConnection,
    order_id: &str,
) -> DbResult<Vec<ReturnRequest>> {
    let rows: Vec<ReturnRow> = sqlx::query_as(&format!(
        "{SELECT_RETURN} WHERE order_id = ?1 ORDER BY created_at, return_number"
    ))
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(ReturnRequest::try_from).collect()
}

async fn insert(conn: &mut SqliteConnection, ret: &ReturnRequest) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO returns (
            id, return_number, order_id, user_id, status, return_method,
            customer_notes, return_amount_cents, return_items,
            quality_check, refund, history, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
    )
    .bind(&ret.id)
    .bind(&ret.return_number)
    .bind(&ret.order_id)
    .bind(&ret.user_id)
    .bind(ret.status)
    .bind(ret.return_method)
    .bind(&ret.customer_notes)
    .bind(ret.return_amount.cents())
    .bind(serde_json::to_string(&ret.return_items)?)
    .bind(ret.quality_check.as_ref().map(serde_json::to_string).transpose()?)
    .bind(ret.refund.as_ref().map(serde_json::to_string).transpose()?)
    .bind(serde_json::to_string(&ret.history)?)
    .bind(ret.created_at)
    .bind(ret.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::Duration;
    use storefront_core::order::{Order, OrderItem};
    use storefront_core::pricing::PriceBreakdown;
    use storefront_core::returns::{
        NewReturn, NewReturnItem, QualityCheckInput, QualityRating, ReturnEvent, ReturnPolicy,
        TransitionContext,
    };
    use storefront_core::stock::Reservation;
    use storefront_core::{Actor, PaymentMethod, Product, ShippingAddress, SizeStock};

    fn order() -> Order {
        let now = Utc::now();
        Order {
            id: "o-1".to_string(),
            user_id: "alice".to_string(),
            order_items: vec![OrderItem {
                id: "line-1".to_string(),
                product_id: "suit".to_string(),
                name: "Navy Suit".to_string(),
                price: Money::from_dollars(100),
                quantity: 2,
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
            payment_method: PaymentMethod::Card,
            applied_coupon: None,
            price_breakdown: PriceBreakdown {
                items_price: Money::from_dollars(200),
                discount_amount: Money::zero(),
                discounted_items_price: Money::from_dollars(200),
                shipping_price: Money::zero(),
                tax_price: Money::from_dollars(30),
                total_price: Money::from_dollars(230),
            },
            is_paid: false,
            paid_at: None,
            is_delivered: false,
            delivered_at: None,
            created_at: now - Duration::days(5),
        }
    }

    /// A paid, delivered order for two suits, with one 40R left in stock.
    async fn delivered_order(db: &Database) -> Order {
        db.products()
            .insert(&Product {
                id: "suit".to_string(),
                name: "Navy Suit".to_string(),
                price: Money::from_dollars(100),
                count_in_stock: 0,
                sizes: vec![SizeStock {
                    size: "40R".to_string(),
                    quantity: 3,
                }],
            })
            .await
            .unwrap();

        let reservations = [Reservation {
            product_id: "suit".to_string(),
            size: Some("40R".to_string()),
            quantity: 2,
        }];
        db.orders().create(&order(), &reservations).await.unwrap();
        db.orders().mark_paid("o-1", Utc::now()).await.unwrap();
        db.orders().mark_delivered("o-1", Utc::now()).await.unwrap()
    }

    fn request() -> NewReturn {
        NewReturn {
            order_id: "o-1".to_string(),
            return_items: vec![NewReturnItem {
                order_item_id: "line-1".to_string(),
                return_qty: 1,
                condition: Default::default(),
                return_reason: "Too small".to_string(),
            }],
            return_method: ReturnMethod::Mail,
            customer_notes: None,
        }
    }

    /// Opens `request()` as `actor` through the repository.
    async fn open(
        db: &Database,
        order: &Order,
        actor: &Actor,
        id: &str,
    ) -> DbResult<ReturnRequest> {
        let policy = ReturnPolicy::default();
        db.returns()
            .open(&order.id, |siblings, number| {
                let ctx = TransitionContext {
                    actor,
                    order,
                    sibling_returns: siblings,
                    policy: &policy,
                    now: Utc::now(),
                };
                ReturnRequest::open(id.to_string(), number, request(), ctx)
            })
            .await
    }

    #[tokio::test]
    async fn test_open_get_and_number() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let order = delivered_order(&db).await;
        let alice = Actor::customer("alice");

        let ret = open(&db, &order, &alice, "r-1").await.unwrap();
        assert_eq!(ret.return_number, "RET000001");

        let second = open(&db, &order, &alice, "r-2").await.unwrap();
        assert_eq!(second.return_number, "RET000002");

        let loaded = db.returns().get("r-1").await.unwrap().unwrap();
        assert_eq!(loaded.return_items, ret.return_items);
        assert_eq!(loaded.return_amount, Money::from_dollars(100));
        assert_eq!(loaded.status, ReturnStatus::Pending);
        assert_eq!(loaded.history.len(), 1);

        let listed = db.returns().list_for_order("o-1").await.unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn test_open_sees_claimed_quantity() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let order = delivered_order(&db).await;
        let alice = Actor::customer("alice");

        open(&db, &order, &alice, "r-1").await.unwrap();
        open(&db, &order, &alice, "r-2").await.unwrap();
        let err = open(&db, &order, &alice, "r-3").await.unwrap_err();
        assert!(matches!(&err, DbError::Domain(e) if e.code() == "RETURN_QUANTITY_EXCEEDED"));

        assert!(db.returns().get("r-3").await.unwrap().is_none());
        assert_eq!(db.returns().list_for_order("o-1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_open_unknown_order() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db
            .returns()
            .open("missing", |_, _| unreachable!("nothing to open against"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_listing_scopes() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let order = delivered_order(&db).await;
        let alice = Actor::customer("alice");
        let admin = Actor::admin("root");

        let first = open(&db, &order, &alice, "r-1").await.unwrap();
        open(&db, &order, &alice, "r-2").await.unwrap();

        let policy = ReturnPolicy::default();
        let ctx = TransitionContext {
            actor: &admin,
            order: &order,
            sibling_returns: &[],
            policy: &policy,
            now: Utc::now(),
        };
        let mut approved = first.clone();
        approved.apply(ReturnEvent::Approve, None, ctx).unwrap();
        db.returns()
            .save_transition(&approved, ReturnStatus::Pending, &[])
            .await
            .unwrap();

        let mine = db.returns().list_for_user("alice").await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(db.returns().list_for_user("bob").await.unwrap().is_empty());

        assert_eq!(db.returns().list_all(None).await.unwrap().len(), 2);
        let pending = db.returns().list_all(Some(ReturnStatus::Pending)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "r-2");
    }

    #[tokio::test]
    async fn test_stale_transition_is_a_conflict() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let order = delivered_order(&db).await;
        let admin = Actor::admin("root");
        let policy = ReturnPolicy::default();
        let ctx = TransitionContext {
            actor: &admin,
            order: &order,
            sibling_returns: &[],
            policy: &policy,
            now: Utc::now(),
        };

        let ret = open(&db, &order, &admin, "r-1").await.unwrap();

        let mut first = ret.clone();
        let effects = first.apply(ReturnEvent::Approve, None, ctx).unwrap();
        db.returns()
            .save_transition(&first, ReturnStatus::Pending, &effects)
            .await
            .unwrap();

        let mut second = ret.clone();
        second
            .apply(ReturnEvent::Reject { reason: "late".to_string() }, None, ctx)
            .unwrap();
        let err = db
            .returns()
            .save_transition(&second, ReturnStatus::Pending, &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::StatusConflict {
                actual: ReturnStatus::Approved,
                ..
            })
        ));

        let stored = db.returns().get("r-1").await.unwrap().unwrap();
        assert_eq!(stored.status, ReturnStatus::Approved);
    }

    #[tokio::test]
    async fn test_finalize_restocks() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let order = delivered_order(&db).await;
        let admin = Actor::admin("root");
        let policy = ReturnPolicy::default();
        let ctx = TransitionContext {
            actor: &admin,
            order: &order,
            sibling_returns: &[],
            policy: &policy,
            now: Utc::now(),
        };

        let mut ret = open(&db, &order, &admin, "r-1").await.unwrap();

        for event in [ReturnEvent::Approve, ReturnEvent::MarkReceived] {
            let from = ret.status;
            let effects = ret.apply(event, None, ctx).unwrap();
            db.returns().save_transition(&ret, from, &effects).await.unwrap();
        }

        ret.record_quality_check(
            QualityCheckInput {
                quality_rating: QualityRating::Excellent,
                quality_notes: None,
                quality_items: vec![],
                restockable: true,
            },
            &admin,
            Utc::now(),
        )
        .unwrap();
        db.returns()
            .save_transition(&ret, ReturnStatus::Received, &[])
            .await
            .unwrap();

        for event in [
            ReturnEvent::StartInspection,
            ReturnEvent::ProcessRefund(Default::default()),
            ReturnEvent::Finalize,
        ] {
            let from = ret.status;
            let effects = ret.apply(event, None, ctx).unwrap();
            db.returns().save_transition(&ret, from, &effects).await.unwrap();
        }

        let stored = db.returns().get("r-1").await.unwrap().unwrap();
        assert_eq!(stored.status, ReturnStatus::Completed);
        assert_eq!(stored.refund.map(|r| r.amount), Some(Money::from_dollars(100)));
        assert!(stored.quality_check.is_some());

        let stock = db.products().get_by_id("suit").await.unwrap().unwrap();
        assert_eq!(stock.available(Some("40R")), Some(2));
    }
}
