//! # Coupon Repository
//!
//! Coupon storage, administrative edits and the usage counter.
//!
//! ## Usage Counter
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  validate (read)         times_used=9, limit=10  → OK                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  redeem (write, in the order transaction)                               │
//! │  UPDATE coupons SET times_used = times_used + 1                         │
//! │  WHERE id = ? AND (usage_limit_total IS NULL                            │
//! │                    OR times_used < usage_limit_total)                   │
//! │       │                                                                 │
//! │       ├── 1 row  → order proceeds                                       │
//! │       └── 0 rows → USAGE_LIMIT_EXCEEDED, order rolled back              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use storefront_core::coupon::{Coupon, CouponRejection, DiscountType};
use storefront_core::{CoreError, Money, ValidationError};

#[derive(Debug, FromRow)]
struct CouponRow {
    id: String,
    code: String,
    description: Option<String>,
    discount_type: DiscountType,
    discount_value: i64,
    minimum_purchase_cents: i64,
    valid_from: DateTime<Utc>,
    valid_until: DateTime<Utc>,
    usage_limit_total: Option<i64>,
    usage_limit_per_user: Option<i64>,
    times_used: i64,
    is_active: bool,
}

impl From<CouponRow> for Coupon {
    fn from(row: CouponRow) -> Self {
        Coupon {
            id: row.id,
            code: row.code,
            description: row.description,
            discount_type: row.discount_type,
            discount_value: row.discount_value,
            minimum_purchase_amount: Money::from_cents(row.minimum_purchase_cents),
            valid_from: row.valid_from,
            valid_until: row.valid_until,
            usage_limit_total: row.usage_limit_total,
            usage_limit_per_user: row.usage_limit_per_user,
            times_used: row.times_used,
            is_active: row.is_active,
        }
    }
}

const SELECT_COUPON: &str = r#"
    SELECT id, code, description, discount_type, discount_value,
           minimum_purchase_cents, valid_from, valid_until,
           usage_limit_total, usage_limit_per_user, times_used, is_active
    FROM coupons
"#;

/// Repository for coupon database operations.
#[derive(Debug, Clone)]
pub struct CouponRepository {
    pool: SqlitePool,
}

impl CouponRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CouponRepository { pool }
    }

    /// Stores a new coupon. A taken code is reported as a validation
    /// `DUPLICATE` on `code`.
    pub async fn insert(&self, coupon: &Coupon) -> DbResult<()> {
        debug!(id = %coupon.id, code = %coupon.code, "Inserting coupon");

        sqlx::query(
            r#"
            INSERT INTO coupons (
                id, code, description, discount_type, discount_value,
                minimum_purchase_cents, valid_from, valid_until,
                usage_limit_total, usage_limit_per_user, times_used, is_active,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&coupon.id)
        .bind(&coupon.code)
        .bind(&coupon.description)
        .bind(coupon.discount_type)
        .bind(coupon.discount_value)
        .bind(coupon.minimum_purchase_amount.cents())
        .bind(coupon.valid_from)
        .bind(coupon.valid_until)
        .bind(coupon.usage_limit_total)
        .bind(coupon.usage_limit_per_user)
        .bind(coupon.times_used)
        .bind(coupon.is_active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| duplicate_code(e.into(), &coupon.code))?;

        info!(code = %coupon.code, "Coupon created");
        Ok(())
    }

    /// Looks a coupon up by its normalized code.
    pub async fn find_by_code(&self, code: &str) -> DbResult<Option<Coupon>> {
        let row: Option<CouponRow> = sqlx::query_as(&format!("{SELECT_COUPON} WHERE code = ?1"))
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Coupon::from))
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Coupon>> {
        let row: Option<CouponRow> = sqlx::query_as(&format!("{SELECT_COUPON} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Coupon::from))
    }

    /// Every coupon, newest first.
    pub async fn list(&self) -> DbResult<Vec<Coupon>> {
        let rows: Vec<CouponRow> =
            sqlx::query_as(&format!("{SELECT_COUPON} ORDER BY created_at DESC, code"))
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(Coupon::from).collect())
    }

    /// Overwrites an edited coupon and returns it as stored.
    ///
    /// `times_used` is only written when `write_usage` is set, so an edit
    /// that does not touch the counter cannot undo a redemption that
    /// landed since the coupon was read.
    pub async fn update(&self, coupon: &Coupon, write_usage: bool) -> DbResult<Coupon> {
        debug!(id = %coupon.id, code = %coupon.code, write_usage, "Updating coupon");

        let result = sqlx::query(
            r#"
            UPDATE coupons SET
                code = ?1, description = ?2, discount_type = ?3, discount_value = ?4,
                minimum_purchase_cents = ?5, valid_from = ?6, valid_until = ?7,
                usage_limit_total = ?8, usage_limit_per_user = ?9, is_active = ?10,
                times_used = CASE WHEN ?11 THEN ?12 ELSE times_used END
            WHERE id = ?13
            "#,
        )
        .bind(&coupon.code)
        .bind(&coupon.description)
        .bind(coupon.discount_type)
        .bind(coupon.discount_value)
        .bind(coupon.minimum_purchase_amount.cents())
        .bind(coupon.valid_from)
        .bind(coupon.valid_until)
        .bind(coupon.usage_limit_total)
        .bind(coupon.usage_limit_per_user)
        .bind(coupon.is_active)
        .bind(write_usage)
        .bind(coupon.times_used)
        .bind(&coupon.id)
        .execute(&self.pool)
        .await
        .map_err(|e| duplicate_code(e.into(), &coupon.code))?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Coupon", coupon.id.clone()));
        }

        info!(code = %coupon.code, "Coupon updated");
        self.get(&coupon.id)
            .await?
            .ok_or_else(|| DbError::not_found("Coupon", coupon.id.clone()))
    }

    /// Removes a coupon. Orders that used it keep their frozen snapshot;
    /// their `coupon_id` is cleared.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM coupons WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Coupon", id));
        }

        info!(id = %id, "Coupon deleted");
        Ok(())
    }

    /// How many of the user's paid orders carry this coupon.
    ///
    /// Unpaid orders are not counted, so a user under a per-user limit of 1
    /// can hold several unpaid orders with the same coupon. The total
    /// `usage_limit_total` counter still caps them at placement.
    pub async fn count_user_redemptions(&self, coupon_id: &str, user_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE coupon_id = ?1 AND user_id = ?2 AND is_paid = 1",
        )
        .bind(coupon_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

/// A taken code is the caller's mistake, not a storage fault.
fn duplicate_code(err: DbError, code: &str) -> DbError {
    match err {
        DbError::UniqueViolation { .. } => DbError::Domain(
            ValidationError::Duplicate {
                field: "code".to_string(),
                value: code.to_string(),
            }
            .into(),
        ),
        other => other,
    }
}

/// Counts one use of the coupon if the total limit still allows it.
pub(crate) async fn redeem(conn: &mut SqliteConnection, coupon_id: &str) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE coupons SET times_used = times_used + 1
        WHERE id = ?1 AND (usage_limit_total IS NULL OR times_used < usage_limit_total)
        "#,
    )
    .bind(coupon_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        warn!(coupon_id = %coupon_id, "Coupon exhausted at redemption");
        return Err(DbError::Domain(CoreError::Coupon(
            CouponRejection::UsageLimitExceeded,
        )));
    }
    Ok(())
}

/// Gives one use back. Never drops below zero.
pub(crate) async fn release(conn: &mut SqliteConnection, coupon_id: &str) -> DbResult<()> {
    let result = sqlx::query(
        "UPDATE coupons SET times_used = times_used - 1 WHERE id = ?1 AND times_used > 0",
    )
    .bind(coupon_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        warn!(coupon_id = %coupon_id, "Coupon usage already at zero");
    } else {
        debug!(coupon_id = %coupon_id, "Coupon usage restored");
    }
    Ok(())
}
