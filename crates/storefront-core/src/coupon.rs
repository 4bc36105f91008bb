//! # Coupon Validator
//!
//! Decides whether a coupon applies to a cart subtotal and how much it takes off.
//!
//! ## Rejection Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  raw code ──► MALFORMED_CODE      4-15 chars of [A-Z0-9_-] uppercased   │
//! │     │                                                                   │
//! │  lookup ───► NOT_FOUND                                                  │
//! │     │                                                                   │
//! │  coupon ───► EXPIRED              now ∉ [valid_from, valid_until]       │
//! │         ───► INACTIVE             is_active = false                     │
//! │         ───► USAGE_LIMIT_EXCEEDED times_used ≥ usage_limit_total        │
//! │         ───► BELOW_MINIMUM        subtotal < minimum_purchase           │
//! │         ───► PER_USER_LIMIT_EXCEEDED                                    │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  AppliedCoupon { discount_type, discount_value, discount_amount }       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The first failing check wins, so an out-of-window coupon always reports
//! `EXPIRED` no matter what else is wrong with it.
//!
//! ## Discount
//! - percentage: `subtotal × value / 100`, rounded half away from zero
//! - fixed amount: `min(value, subtotal)`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::error::{CoreResult, ValidationError};
use crate::money::Money;
use crate::types::Percent;
use crate::validation::normalize_coupon_code;

// =============================================================================
// Discount Type
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// `discount_value` is a whole percent in (0, 100].
    Percentage,
    /// `discount_value` is cents.
    FixedAmount,
}

/// Upper bound of a percentage `discount_value`.
pub const MAX_PERCENT: i64 = 100;

// =============================================================================
// Coupon Usage Policy
// =============================================================================

/// Whether a coupon use is given back when its order is fully refunded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponUsagePolicy {
    /// A use counts once the order is placed. Never restored.
    #[default]
    Attempted,
    /// A use counts only if the sale sticks. A refund covering every unit
    /// of the order restores one use.
    Fulfilled,
}

// =============================================================================
// Coupon
// =============================================================================

/// A named discount rule as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub id: String,
    /// Unique, uppercase.
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub minimum_purchase_amount: Money,
    #[ts(as = "String")]
    pub valid_from: DateTime<Utc>,
    #[ts(as = "String")]
    pub valid_until: DateTime<Utc>,
    pub usage_limit_total: Option<i64>,
    pub usage_limit_per_user: Option<i64>,
    pub times_used: i64,
    pub is_active: bool,
}

impl Coupon {
    /// Whether `now` falls inside the validity window (inclusive).
    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        self.valid_from <= now && now <= self.valid_until
    }

    /// Discount this coupon takes off `subtotal`. Never more than the subtotal.
    pub fn discount_for(&self, subtotal: Money) -> Money {
        let subtotal = subtotal.non_negative();
        let discount = match self.discount_type {
            DiscountType::Percentage => {
                let percent = self.discount_value.clamp(0, MAX_PERCENT) as u32;
                subtotal.percentage(Percent::from_whole(percent))
            }
            DiscountType::FixedAmount => Money::from_cents(self.discount_value.max(0)),
        };
        discount.min(subtotal)
    }

    /// Runs every eligibility rule in order.
    ///
    /// `user_redemptions` is how many of the user's paid orders already used
    /// this coupon; `None` skips the per-user check (anonymous preview).
    pub fn check(
        &self,
        subtotal: Money,
        now: DateTime<Utc>,
        user_redemptions: Option<i64>,
    ) -> Result<AppliedCoupon, CouponRejection> {
        if !self.is_within_window(now) {
            return Err(CouponRejection::Expired);
        }

        if !self.is_active {
            return Err(CouponRejection::Inactive);
        }

        if let Some(limit) = self.usage_limit_total {
            if self.times_used >= limit {
                return Err(CouponRejection::UsageLimitExceeded);
            }
        }

        if subtotal < self.minimum_purchase_amount {
            return Err(CouponRejection::BelowMinimum {
                minimum: self.minimum_purchase_amount,
            });
        }

        if let (Some(limit), Some(used)) = (self.usage_limit_per_user, user_redemptions) {
            if used >= limit {
                return Err(CouponRejection::PerUserLimitExceeded);
            }
        }

        Ok(AppliedCoupon {
            coupon_id: self.id.clone(),
            code: self.code.clone(),
            discount_type: self.discount_type,
            discount_value: self.discount_value,
            discount_amount: self.discount_for(subtotal),
        })
    }
}

// =============================================================================
// Applied Coupon
// =============================================================================

/// A validated discount, frozen onto quotes and orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AppliedCoupon {
    pub coupon_id: String,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub discount_amount: Money,
}

// =============================================================================
// Rejection
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponRejection {
    #[error("coupon code is malformed")]
    MalformedCode,
    #[error("coupon not found")]
    NotFound,
    #[error("coupon is expired or not yet valid")]
    Expired,
    #[error("coupon is inactive")]
    Inactive,
    #[error("coupon usage limit reached")]
    UsageLimitExceeded,
    #[error("order subtotal is below the coupon minimum of {minimum}")]
    BelowMinimum { minimum: Money },
    #[error("you have already used this coupon the maximum number of times")]
    PerUserLimitExceeded,
}

impl CouponRejection {
    pub fn code(&self) -> &'static str {
        match self {
            CouponRejection::MalformedCode => "MALFORMED_CODE",
            CouponRejection::NotFound => "NOT_FOUND",
            CouponRejection::Expired => "EXPIRED",
            CouponRejection::Inactive => "INACTIVE",
            CouponRejection::UsageLimitExceeded => "USAGE_LIMIT_EXCEEDED",
            CouponRejection::BelowMinimum { .. } => "BELOW_MINIMUM",
            CouponRejection::PerUserLimitExceeded => "PER_USER_LIMIT_EXCEEDED",
        }
    }
}

// =============================================================================
// Validator Entry Points
// =============================================================================

/// Normalizes a raw code, mapping format failures to `MALFORMED_CODE`.
pub fn parse_code(raw: &str) -> Result<String, CouponRejection> {
    normalize_coupon_code(raw).map_err(|_| CouponRejection::MalformedCode)
}

/// Validates a looked-up coupon. `None` means the lookup found nothing.
pub fn validate(
    coupon: Option<&Coupon>,
    subtotal: Money,
    now: DateTime<Utc>,
    user_redemptions: Option<i64>,
) -> Result<AppliedCoupon, CouponRejection> {
    coupon
        .ok_or(CouponRejection::NotFound)?
        .check(subtotal, now, user_redemptions)
}

// =============================================================================
// Administrative Creation
// =============================================================================

/// Fields an administrator submits to create a coupon.
#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NewCoupon {
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    #[serde(default)]
    pub minimum_purchase_amount: Money,
    #[ts(as = "String")]
    pub valid_from: DateTime<Utc>,
    #[ts(as = "String")]
    pub valid_until: DateTime<Utc>,
    #[serde(default)]
    pub usage_limit_total: Option<i64>,
    #[serde(default)]
    pub usage_limit_per_user: Option<i64>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl NewCoupon {
    /// Validates the draft and builds a fresh coupon with `times_used = 0`.
    /// Code uniqueness is enforced by storage.
    pub fn into_coupon(self, id: String) -> CoreResult<Coupon> {
        let coupon = Coupon {
            id,
            code: normalize_coupon_code(&self.code)?,
            description: self.description,
            discount_type: self.discount_type,
            discount_value: self.discount_value,
            minimum_purchase_amount: self.minimum_purchase_amount,
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            usage_limit_total: self.usage_limit_total,
            usage_limit_per_user: self.usage_limit_per_user,
            times_used: 0,
            is_active: self.is_active,
        };
        coupon.check_fields()?;
        Ok(coupon)
    }
}

// =============================================================================
// Administrative Edit
// =============================================================================

/// A partial edit. Absent fields keep their stored value; `null` clears a
/// nullable field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CouponPatch {
    pub code: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<i64>,
    pub minimum_purchase_amount: Option<Money>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "nullable")]
    pub usage_limit_total: Option<Option<i64>>,
    #[serde(deserialize_with = "nullable")]
    pub usage_limit_per_user: Option<Option<i64>>,
    /// Lets an administrator reset or adjust the counter.
    pub times_used: Option<i64>,
    pub is_active: Option<bool>,
}

/// Present-but-null becomes `Some(None)`; absent stays `None` via `default`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl CouponPatch {
    /// Merges the edit onto `coupon` and re-validates the result.
    pub fn apply(self, coupon: &Coupon) -> CoreResult<Coupon> {
        let code = match self.code {
            Some(raw) => normalize_coupon_code(&raw)?,
            None => coupon.code.clone(),
        };

        let edited = Coupon {
            id: coupon.id.clone(),
            code,
            description: self.description.unwrap_or_else(|| coupon.description.clone()),
            discount_type: self.discount_type.unwrap_or(coupon.discount_type),
            discount_value: self.discount_value.unwrap_or(coupon.discount_value),
            minimum_purchase_amount: self
                .minimum_purchase_amount
                .unwrap_or(coupon.minimum_purchase_amount),
            valid_from: self.valid_from.unwrap_or(coupon.valid_from),
            valid_until: self.valid_until.unwrap_or(coupon.valid_until),
            usage_limit_total: self.usage_limit_total.unwrap_or(coupon.usage_limit_total),
            usage_limit_per_user: self
                .usage_limit_per_user
                .unwrap_or(coupon.usage_limit_per_user),
            times_used: self.times_used.unwrap_or(coupon.times_used),
            is_active: self.is_active.unwrap_or(coupon.is_active),
        };
        edited.check_fields()?;
        Ok(edited)
    }
}

impl Coupon {
    /// Field rules shared by creation and edits.
    fn check_fields(&self) -> CoreResult<()> {
        if self.valid_from > self.valid_until {
            return Err(ValidationError::InvalidFormat {
                field: "validUntil".to_string(),
                reason: "must not be before validFrom".to_string(),
            }
            .into());
        }

        match self.discount_type {
            DiscountType::Percentage if !(1..=MAX_PERCENT).contains(&self.discount_value) => {
                return Err(ValidationError::OutOfRange {
                    field: "discountValue".to_string(),
                    min: 1,
                    max: MAX_PERCENT,
                }
                .into());
            }
            DiscountType::FixedAmount if self.discount_value <= 0 => {
                return Err(ValidationError::MustBePositive {
                    field: "discountValue".to_string(),
                }
                .into());
            }
            _ => {}
        }

        crate::validation::validate_price_cents(
            "minimumPurchaseAmount",
            self.minimum_purchase_amount.cents(),
        )?;

        for (field, limit) in [
            ("usageLimitTotal", self.usage_limit_total),
            ("usageLimitPerUser", self.usage_limit_per_user),
        ] {
            if matches!(limit, Some(n) if n <= 0) {
                return Err(ValidationError::MustBePositive {
                    field: field.to_string(),
                }
                .into());
            }
        }

        if self.times_used < 0 {
            return Err(ValidationError::OutOfRange {
                field: "timesUsed".to_string(),
                min: 0,
                max: i64::MAX,
            }
            .into());
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
