//! # Product Repository
//!
//! Catalog reads and the two stock writes: the conditional decrement at
//! placement and the restock after a completed return.
//!
//! ## Conditional Decrement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Order A (40R ×1)                Order B (40R ×1)       40R quantity=1  │
//! │       │                               │                                 │
//! │  check_stock: 1 ≥ 1 ✓            check_stock: 1 ≥ 1 ✓                   │
//! │       │                               │                                 │
//! │  UPDATE … SET quantity = quantity - 1                                   │
//! │  WHERE … AND quantity >= 1                                              │
//! │       │                               │                                 │
//! │  rows_affected = 1 ✓             rows_affected = 0 → STOCK_CONFLICT     │
//! │                                                                         │
//! │  The predicate is re-evaluated at write time, so the earlier read is    │
//! │  never trusted on its own.                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use storefront_core::returns::RestockLine;
use storefront_core::stock::Reservation;
use storefront_core::{CoreError, Money, Product, SizeStock};

#[derive(Debug, FromRow)]
struct ProductRow {
    id: String,
    name: String,
    price_cents: i64,
    count_in_stock: i64,
}

#[derive(Debug, FromRow)]
struct SizeRow {
    size: String,
    quantity: i64,
}

/// Repository for catalog and inventory operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Inserts a product together with its size rows.
    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, sizes = product.sizes.len(), "Inserting product");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO products (id, name, price_cents, count_in_stock, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(product.count_in_stock)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        for size in &product.sizes {
            sqlx::query(
                "INSERT INTO product_sizes (product_id, size, quantity) VALUES (?1, ?2, ?3)",
            )
            .bind(&product.id)
            .bind(&size.size)
            .bind(size.quantity)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Gets a product and its size inventory.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let row: Option<ProductRow> = sqlx::query_as(
            "SELECT id, name, price_cents, count_in_stock FROM products WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let sizes: Vec<SizeRow> = sqlx::query_as(
            "SELECT size, quantity FROM product_sizes WHERE product_id = ?1 ORDER BY size",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(Product {
            id: row.id,
            name: row.name,
            price: Money::from_cents(row.price_cents),
            count_in_stock: row.count_in_stock,
            sizes: sizes
                .into_iter()
                .map(|s| SizeStock {
                    size: s.size,
                    quantity: s.quantity,
                })
                .collect(),
        }))
    }

    /// Snapshot of every listed product that exists. Missing ids are left
    /// out; the stock checker reports them.
    pub async fn get_many<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a str>,
    ) -> DbResult<Vec<Product>> {
        let mut products: Vec<Product> = Vec::new();
        for id in ids {
            if products.iter().any(|p| p.id == id) {
                continue;
            }
            if let Some(product) = self.get_by_id(id).await? {
                products.push(product);
            }
        }
        debug!(count = products.len(), "Loaded catalog snapshot");
        Ok(products)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Returns stock to inventory.
    pub async fn restock(&self, lines: &[RestockLine]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        for line in lines {
            restock(&mut tx, line).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

/// Decrements inventory for one checked reservation, inside the caller's
/// transaction. Fails with `STOCK_CONFLICT` if the stock is no longer there.
pub(crate) async fn reserve(conn: &mut SqliteConnection, reservation: &Reservation) -> DbResult<()> {
    let result = match &reservation.size {
        Some(size) => {
            sqlx::query(
                r#"
                UPDATE product_sizes SET quantity = quantity - ?1
                WHERE product_id = ?2 AND size = ?3 AND quantity >= ?1
                "#,
            )
            .bind(reservation.quantity)
            .bind(&reservation.product_id)
            .bind(size)
            .execute(&mut *conn)
            .await?
        }
        None => {
            sqlx::query(
                r#"
                UPDATE products SET count_in_stock = count_in_stock - ?1
                WHERE id = ?2 AND count_in_stock >= ?1
                "#,
            )
            .bind(reservation.quantity)
            .bind(&reservation.product_id)
            .execute(&mut *conn)
            .await?
        }
    };

    if result.rows_affected() == 0 {
        warn!(
            product_id = %reservation.product_id,
            size = ?reservation.size,
            requested = reservation.quantity,
            "Lost stock race"
        );
        return Err(DbError::Domain(CoreError::StockConflict {
            product_id: reservation.product_id.clone(),
            size: reservation.size.clone(),
        }));
    }

    Ok(())
}

/// Adds returned units back. A size row wins when one exists; otherwise the
/// product-level count is used.
pub(crate) async fn restock(conn: &mut SqliteConnection, line: &RestockLine) -> DbResult<()> {
    if let Some(size) = &line.size {
        let sized = sqlx::query(
            "UPDATE product_sizes SET quantity = quantity + ?1 WHERE product_id = ?2 AND size = ?3",
        )
        .bind(line.quantity)
        .bind(&line.product_id)
        .bind(size)
        .execute(&mut *conn)
        .await?;

        if sized.rows_affected() > 0 {
            debug!(product_id = %line.product_id, size = %size, qty = line.quantity, "Restocked size");
            return Ok(());
        }
    }

    let result = sqlx::query("UPDATE products SET count_in_stock = count_in_stock + ?1 WHERE id = ?2")
        .bind(line.quantity)
        .bind(&line.product_id)
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        warn!(product_id = %line.product_id, "Restock skipped, product no longer exists");
    }
    Ok(())
}
