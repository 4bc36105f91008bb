//! # Repository Module
//!
//! Database repository implementations for the storefront.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  HTTP handler                                                           │
//! │       │                                                                 │
//! │       │  db.orders().create(&order, &reservations)                      │
//! │       ▼                                                                 │
//! │  OrderRepository ──► product::reserve ──► coupon::redeem                │
//! │       │                     (same transaction)                          │
//! │       ▼                                                                 │
//! │  SQLite Database                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Repositories hold no business rules. They load and store the core
//! types, and the conditional writes they perform re-check only the
//! predicate a concurrent writer could have invalidated.
//!
//! ## Available Repositories
//!
//! - [`product::ProductRepository`] - Catalog reads, stock decrement and restock
//! - [`coupon::CouponRepository`] - Coupons and the usage counter
//! - [`order::OrderRepository`] - Placement and the paid/delivered flags
//! - [`returns::ReturnRepository`] - Return requests and status writes

pub mod coupon;
pub mod order;
pub mod product;
pub mod returns;
