//! Storefront API configuration.
//!
//! Layered with the `config` crate:
//!
//! ```text
//! built-in defaults  →  storefront.toml (optional)  →  STOREFRONT__* env
//! ```
//!
//! Nested keys use `__` in the environment, so
//! `STOREFRONT__PRICING__TAX_RATE_BPS=825` sets `pricing.tax_rate_bps`.

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use storefront_core::coupon::CouponUsagePolicy;
use storefront_core::placement::PlacementValidator;
use storefront_core::pricing::PricingPolicy;
use storefront_core::returns::ReturnPolicy;
use storefront_core::{Money, TaxRate};
use storefront_db::DbConfig;

const CONFIG_FILE: &str = "storefront";
const ENV_PREFIX: &str = "STOREFRONT";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Address the HTTP server listens on.
    pub bind_addr: String,

    /// SQLite database file.
    pub database_path: String,

    pub database_max_connections: u32,

    /// Client totals within this many cents of the server's are not
    /// reported as discrepancies.
    pub totals_epsilon_cents: i64,

    pub pricing: PricingSettings,
    pub returns: ReturnSettings,
    pub coupons: CouponSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricingSettings {
    pub tax_rate_bps: u32,
    pub shipping_fee_cents: i64,
    pub free_shipping_threshold_cents: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReturnSettings {
    pub window_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CouponSettings {
    pub usage_policy: CouponUsagePolicy,
}

impl Settings {
    /// Loads defaults, then `storefront.toml` if present, then the
    /// environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::build(None)
    }

    /// Like [`Settings::load`] with an inline TOML layer between the file
    /// and the environment.
    pub fn load_with(toml: &str) -> Result<Self, ConfigError> {
        Self::build(Some(toml))
    }

    fn build(inline: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("bind_addr", "0.0.0.0:8080")?
            .set_default("database_path", "storefront.db")?
            .set_default("database_max_connections", 5)?
            .set_default("totals_epsilon_cents", 1)?
            .set_default("pricing.tax_rate_bps", 1500)?
            .set_default("pricing.shipping_fee_cents", 1000)?
            .set_default("pricing.free_shipping_threshold_cents", 10_000)?
            .set_default("returns.window_days", storefront_core::RETURN_WINDOW_DAYS)?
            .set_default("coupons.usage_policy", "attempted")?
            .add_source(File::with_name(CONFIG_FILE).required(false));

        if let Some(toml) = inline {
            builder = builder.add_source(File::from_str(toml, FileFormat::Toml));
        }

        builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn pricing_policy(&self) -> PricingPolicy {
        PricingPolicy {
            tax_rate: TaxRate::from_bps(self.pricing.tax_rate_bps),
            shipping_fee: Money::from_cents(self.pricing.shipping_fee_cents),
            free_shipping_threshold: Money::from_cents(self.pricing.free_shipping_threshold_cents),
        }
    }

    pub fn placement_validator(&self) -> PlacementValidator {
        PlacementValidator {
            policy: self.pricing_policy(),
            epsilon: Money::from_cents(self.totals_epsilon_cents),
        }
    }

    pub fn return_policy(&self) -> ReturnPolicy {
        ReturnPolicy {
            window_days: self.returns.window_days,
            coupon_usage: self.coupons.usage_policy,
        }
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database_path).max_connections(self.database_max_connections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::load_with("").unwrap();
        assert_eq!(settings.pricing_policy(), PricingPolicy::default());
        assert_eq!(settings.return_policy(), ReturnPolicy::default());
        assert_eq!(settings.placement_validator().epsilon, Money::from_cents(1));
    }

    #[test]
    fn test_inline_overrides() {
        let settings = Settings::load_with(
            r#"
            totals_epsilon_cents = 0

            [pricing]
            tax_rate_bps = 825
            free_shipping_threshold_cents = 5000

            [coupons]
            usage_policy = "fulfilled"
            "#,
        )
        .unwrap();

        let pricing = settings.pricing_policy();
        assert_eq!(pricing.tax_rate, TaxRate::from_bps(825));
        assert_eq!(pricing.free_shipping_threshold, Money::from_dollars(50));
        assert_eq!(pricing.shipping_fee, Money::from_dollars(10));
        assert_eq!(
            settings.return_policy().coupon_usage,
            CouponUsagePolicy::Fulfilled
        );
        assert_eq!(settings.placement_validator().epsilon, Money::zero());
    }
}
