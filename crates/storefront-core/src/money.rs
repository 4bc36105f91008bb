//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In JavaScript/floating point:                                          │
//! │    0.15 * 33.33 = 4.9995000000000005  ❌ preview and server drift      │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents + one rounding per derived component       │
//! │    3333 cents × 1500 bps = 4_999_500 / 10_000 = 499.95 → 500 cents     │
//! │    Rounded once, half away from zero, in i128.                         │
//! │    Sums of rounded components are exact, never re-rounded.             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use storefront_core::money::Money;
//!
//! let price = Money::from_cents(10_000); // $100.00
//! let line = price * 2;                  // $200.00
//! let total = line + Money::from_cents(2_500);
//! assert_eq!(total.cents(), 22_500);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

use crate::types::{Percent, TaxRate};

/// Basis points in one whole (100%).
const BPS_DENOMINATOR: i128 = 10_000;

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in cents.
///
/// ## Design Decisions
/// - **i64 (signed)**: differences (client vs server totals) may be negative
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **Serialized as integer cents** on every wire and in every column
///
/// ## Where Money Flows
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  CartLine.unit_price ──► line total ──► items_price                    │
/// │                                             │                           │
/// │  Coupon ──► discount_amount ────────────────┤                           │
/// │                                             ▼                           │
/// │                 discounted_items_price ──► shipping, tax ──► total      │
/// │                                                                         │
/// │  OrderItem.unit_price (frozen) ──► return_amount ──► Refund             │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ```rust
    /// use storefront_core::money::Money;
    ///
    /// let price = Money::from_cents(1099); // $10.99
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from whole dollars.
    ///
    /// Surcharge tables are written in whole dollars.
    #[inline]
    pub const fn from_dollars(dollars: i64) -> Self {
        Money(dollars * 100)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit (dollars) portion.
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit (cents) portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Clamps negative values to zero.
    ///
    /// ```rust
    /// use storefront_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(-1).non_negative(), Money::zero());
    /// assert_eq!(Money::from_cents(250).non_negative().cents(), 250);
    /// ```
    #[inline]
    pub const fn non_negative(self) -> Self {
        if self.0 < 0 {
            Money(0)
        } else {
            self
        }
    }

    /// Multiplies money by a quantity.
    ///
    /// ```rust
    /// use storefront_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(299);
    /// assert_eq!(unit_price.multiply_quantity(3).cents(), 897);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Calculates tax on this amount, rounded half away from zero.
    ///
    /// ## Rounding
    /// ```text
    /// ┌─────────────────────────────────────────────────────────────────────┐
    /// │  ROUND HALF AWAY FROM ZERO                                          │
    /// │                                                                     │
    /// │   499.50 cents →  500       -499.50 cents → -500                    │
    /// │   499.49 cents →  499       -499.49 cents → -499                    │
    /// │                                                                     │
    /// │  This is what a customer sees on a receipt formatted to two         │
    /// │  decimals. Banker's rounding is deliberately NOT used.              │
    /// └─────────────────────────────────────────────────────────────────────┘
    /// ```
    ///
    /// ```rust
    /// use storefront_core::money::Money;
    /// use storefront_core::types::TaxRate;
    ///
    /// let tax = Money::from_cents(3333).calculate_tax(TaxRate::from_bps(1500));
    /// assert_eq!(tax.cents(), 500); // 499.95 → 500
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        Money(mul_bps_rounded(self.0, rate.bps()))
    }

    /// Returns `percent` of this amount, rounded half away from zero.
    ///
    /// ```rust
    /// use storefront_core::money::Money;
    /// use storefront_core::types::Percent;
    ///
    /// let subtotal = Money::from_cents(12_500);
    /// assert_eq!(subtotal.percentage(Percent::from_bps(2000)).cents(), 2_500);
    /// ```
    pub fn percentage(&self, percent: Percent) -> Money {
        Money(mul_bps_rounded(self.0, percent.bps()))
    }

    /// Whether two amounts are within `epsilon` of each other. Total over
    /// the whole `i64` range.
    ///
    /// ```rust
    /// use storefront_core::money::Money;
    ///
    /// let cent = Money::from_cents(1);
    /// assert!(Money::from_cents(12_500).within(Money::from_cents(12_501), cent));
    /// assert!(!Money::from_cents(12_500).within(Money::from_cents(i64::MIN), cent));
    /// ```
    #[inline]
    pub fn within(&self, other: Money, epsilon: Money) -> bool {
        self.0.abs_diff(other.0) <= epsilon.0.unsigned_abs()
    }

    /// `self - other`, or `None` on overflow.
    #[inline]
    pub const fn checked_sub(self, other: Money) -> Option<Money> {
        match self.0.checked_sub(other.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }
}

/// `amount * bps / 10_000`, rounded half away from zero, computed in i128.
fn mul_bps_rounded(amount: i64, bps: u32) -> i64 {
    let product = amount as i128 * bps as i128;
    let half = BPS_DENOMINATOR / 2;
    let rounded = if product >= 0 {
        (product + half) / BPS_DENOMINATOR
    } else {
        (product - half) / BPS_DENOMINATOR
    };
    rounded as i64
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display shows dollars with two decimals, e.g. `$125.00`.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(
            f,
            "{}${}.{:02}",
            sign,
            self.dollars().abs(),
            self.cents_part()
        )
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.dollars(), 10);
        assert_eq!(money.cents_part(), 99);
    }

    #[test]
    fn test_from_dollars() {
        assert_eq!(Money::from_dollars(25).cents(), 2500);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_cents(12_500)), "$125.00");
        assert_eq!(format!("{}", Money::from_cents(1)), "$0.01");
        assert_eq!(format!("{}", Money::from_cents(-550)), "-$5.50");
        assert_eq!(format!("{}", Money::zero()), "$0.00");
    }

    #[test]
    fn test_arithmetic_and_sum() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((a * 3).cents(), 3000);

        let total: Money = [a, b, b].iter().sum();
        assert_eq!(total.cents(), 2000);
    }

    #[test]
    fn test_tax_rounds_half_away_from_zero() {
        let rate = TaxRate::from_bps(1500);
        // 10.00 × 15% = 1.50 exactly
        assert_eq!(Money::from_cents(1000).calculate_tax(rate).cents(), 150);
        // 33.33 × 15% = 4.9995 → 5.00
        assert_eq!(Money::from_cents(3333).calculate_tax(rate).cents(), 500);
        // 0.03 × 15% = 0.0045 → 0.00
        assert_eq!(Money::from_cents(3).calculate_tax(rate).cents(), 0);
        // 0.10 × 15% = 0.015 → 0.02 (half goes up, not to even)
        assert_eq!(Money::from_cents(10).calculate_tax(rate).cents(), 2);
        // negatives mirror positives
        assert_eq!(Money::from_cents(-10).calculate_tax(rate).cents(), -2);
    }

    #[test]
    fn test_percentage() {
        let subtotal = Money::from_cents(4999);
        // 49.99 × 12.5% = 6.24875 → 6.25
        assert_eq!(subtotal.percentage(Percent::from_bps(1250)).cents(), 625);
        assert_eq!(subtotal.percentage(Percent::from_bps(10_000)), subtotal);
    }

    #[test]
    fn test_non_negative_and_within() {
        assert_eq!(Money::from_cents(-5).non_negative(), Money::zero());
        assert!(Money::from_cents(100).within(Money::from_cents(101), Money::from_cents(1)));
        assert!(!Money::from_cents(100).within(Money::from_cents(102), Money::from_cents(1)));
    }

    #[test]
    fn test_within_extreme_values() {
        let cent = Money::from_cents(1);
        let total = Money::from_cents(12_500);
        assert!(!total.within(Money::from_cents(i64::MIN), cent));
        assert!(!total.within(Money::from_cents(i64::MAX), cent));
        assert!(!Money::from_cents(i64::MIN).within(Money::from_cents(i64::MAX), cent));
        assert!(Money::from_cents(i64::MIN).within(Money::from_cents(i64::MIN), Money::zero()));
        assert!(total.within(Money::from_cents(12_499), Money::from_cents(i64::MIN)));
    }

    #[test]
    fn test_checked_sub() {
        assert_eq!(
            Money::from_cents(500).checked_sub(Money::from_cents(700)),
            Some(Money::from_cents(-200))
        );
        assert_eq!(Money::from_cents(-2).checked_sub(Money::from_cents(i64::MAX)), None);
    }

    #[test]
    fn test_zero_and_checks() {
        let zero = Money::zero();
        assert!(zero.is_zero());
        assert!(!zero.is_positive());
        assert!(!zero.is_negative());

        assert!(Money::from_cents(100).is_positive());
        assert!(Money::from_cents(-100).is_negative());
    }
}
