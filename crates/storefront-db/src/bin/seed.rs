//! # Seed Data Generator
//!
//! Populates the database with a small menswear catalog and a welcome
//! coupon for development.
//!
//! ## Usage
//! ```bash
//! cargo run -p storefront-db --bin seed
//!
//! # Specify database path
//! cargo run -p storefront-db --bin seed -- --db ./data/storefront.db
//! ```
//!
//! ## Generated Data
//! - Suits and blazers, tracked per size (36R - 46L)
//! - Ties and pocket squares, tracked as a single count
//! - `SAVE20`: 20% off orders of $50.00 or more, once per customer

use chrono::{Duration, Utc};
use std::env;
use storefront_core::coupon::{DiscountType, NewCoupon};
use storefront_core::{Money, Product, SizeStock};
use storefront_db::{Database, DbConfig};
use uuid::Uuid;

/// Sized garments: (name, price in dollars)
const TAILORED: &[(&str, i64)] = &[
    ("Navy Two-Piece Suit", 450),
    ("Charcoal Three-Piece Suit", 595),
    ("Black Tuxedo", 650),
    ("Grey Flannel Blazer", 295),
    ("Camel Sport Coat", 325),
    ("Linen Summer Suit", 395),
];

const SIZES: &[&str] = &["36R", "38R", "40R", "40L", "42R", "42L", "44R", "46L"];

/// Accessories: (name, price in cents)
const ACCESSORIES: &[(&str, i64)] = &[
    ("Silk Repp Tie", 6500),
    ("Grenadine Tie", 8500),
    ("Wool Knit Tie", 5500),
    ("Linen Pocket Square", 2500),
    ("Silk Pocket Square", 3500),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./storefront_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Storefront Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./storefront_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Storefront Seed Data Generator");
    println!("=================================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    println!();
    println!("Generating catalog...");

    let mut generated = 0;

    for (idx, (name, dollars)) in TAILORED.iter().enumerate() {
        let product = Product {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            price: Money::from_dollars(*dollars),
            count_in_stock: 0,
            sizes: SIZES
                .iter()
                .enumerate()
                .map(|(size_idx, size)| SizeStock {
                    size: size.to_string(),
                    // A few sizes start sold out so stock errors are easy to try.
                    quantity: ((idx * 7 + size_idx * 3) % 6) as i64,
                })
                .collect(),
        };
        insert(&db, &product, &mut generated).await;
    }

    for (idx, (name, cents)) in ACCESSORIES.iter().enumerate() {
        let product = Product {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            price: Money::from_cents(*cents),
            count_in_stock: 10 + (idx as i64) * 5,
            sizes: Vec::new(),
        };
        insert(&db, &product, &mut generated).await;
    }

    println!("✓ Generated {} products", generated);

    let now = Utc::now();
    let welcome = NewCoupon {
        code: "SAVE20".to_string(),
        description: Some("20% off your first order over $50".to_string()),
        discount_type: DiscountType::Percentage,
        discount_value: 20,
        minimum_purchase_amount: Money::from_dollars(50),
        valid_from: now,
        valid_until: now + Duration::days(90),
        usage_limit_total: Some(500),
        usage_limit_per_user: Some(1),
        is_active: true,
    }
    .into_coupon(Uuid::new_v4().to_string())?;
    db.coupons().insert(&welcome).await?;

    println!("✓ Created coupon {}", welcome.code);
    println!();
    println!("✓ Seed complete!");

    Ok(())
}

async fn insert(db: &Database, product: &Product, generated: &mut usize) {
    if let Err(e) = db.products().insert(product).await {
        eprintln!("Failed to insert {}: {}", product.name, e);
        return;
    }
    *generated += 1;
}
