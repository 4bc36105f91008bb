//! # Error Types
//!
//! Domain-specific error types for storefront-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  storefront-core errors (this file + owning modules)                    │
//! │  ├── CoreError               - Every domain failure                     │
//! │  ├── ValidationError         - Input validation failures                │
//! │  ├── CouponRejection         - coupon.rs                                │
//! │  ├── StockViolation          - stock.rs                                 │
//! │  ├── ReturnEligibilityError  - returns.rs                               │
//! │  └── TransitionError         - returns.rs                               │
//! │                                                                         │
//! │  storefront-db errors (separate crate)                                  │
//! │  └── DbError                 - Database operation failures              │
//! │                                                                         │
//! │  HTTP errors (in app)                                                   │
//! │  └── ApiError                - What the client sees { code, message }   │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ApiError → HTTP status + body      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Classification
//! Every [`CoreError`] reports an [`ErrorKind`]. The HTTP layer maps the kind
//! to a status code; the machine-readable `code()` goes into the body.
//!
//! | Kind        | Meaning                                         | HTTP |
//! |-------------|-------------------------------------------------|------|
//! | Validation  | malformed input                                 | 400  |
//! | Eligibility | business rule said no (expired, window closed)  | 400  |
//! | NotFound    | referenced entity does not exist                | 404  |
//! | Forbidden   | actor may not perform the action                | 403  |
//! | Conflict    | lost a race, caller must re-fetch and retry     | 409  |
//! | Transition  | state change not in the table (integration bug) | 422  |
//! | Integrity   | stored snapshot is inconsistent                 | 500  |

use thiserror::Error;

use crate::coupon::CouponRejection;
use crate::returns::{ReturnEligibilityError, ReturnStatus, TransitionError};
use crate::stock::StockViolation;

// =============================================================================
// Error Kind
// =============================================================================

/// Coarse classification used by callers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Eligibility,
    NotFound,
    Forbidden,
    Conflict,
    Transition,
    Integrity,
}

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// Nothing in the core retries; every variant is surfaced to the caller.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Input failed a format or range check.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Coupon code was rejected.
    #[error("Coupon rejected: {0}")]
    Coupon(#[from] CouponRejection),

    /// One or more cart lines cannot be satisfied from inventory.
    ///
    /// ## User Workflow
    /// ```text
    /// Place order (2 × Navy Suit, size 40R)
    ///      │
    ///      ▼
    /// Check stock: 40R available=1
    ///      │
    ///      ▼
    /// OutOfStock([{ product: "navy-suit", size: "40R", available: 1, requested: 2 }])
    ///      │
    ///      ▼
    /// Client shows: "Only 1 Navy Suit (40R) left"
    /// ```
    #[error("Stock check failed: {}", join_violations(.0))]
    OutOfStock(Vec<StockViolation>),

    /// The order cannot be returned (not paid, not delivered, window closed).
    #[error("Return not allowed: {0}")]
    ReturnEligibility(#[from] ReturnEligibilityError),

    /// A return status change is not in the transition table.
    #[error("Invalid transition: {0}")]
    Transition(#[from] TransitionError),

    /// The return is no longer in the status the caller expected.
    #[error("Return {return_id} is {actual}, expected {expected}")]
    StatusConflict {
        return_id: String,
        expected: ReturnStatus,
        actual: ReturnStatus,
    },

    /// Stock was taken by a concurrent order between check and decrement.
    #[error("Stock for product {product_id} changed concurrently")]
    StockConflict {
        product_id: String,
        size: Option<String>,
    },

    /// An order lifecycle flag was already set.
    #[error("Order {order_id} is already {state}")]
    OrderStateConflict { order_id: String, state: String },

    /// Entity lookup failed.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Actor lacks the role for this action.
    #[error("Not permitted: {action}")]
    Forbidden { action: String },

    /// A persisted snapshot contradicts itself.
    #[error("Integrity violation: {reason}")]
    Integrity { reason: String },
}

impl CoreError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::Coupon(rejection) => match rejection {
                CouponRejection::MalformedCode => ErrorKind::Validation,
                CouponRejection::NotFound => ErrorKind::NotFound,
                _ => ErrorKind::Eligibility,
            },
            CoreError::OutOfStock(_) => ErrorKind::Eligibility,
            CoreError::ReturnEligibility(_) => ErrorKind::Eligibility,
            CoreError::Transition(_) => ErrorKind::Transition,
            CoreError::StatusConflict { .. }
            | CoreError::StockConflict { .. }
            | CoreError::OrderStateConflict { .. } => ErrorKind::Conflict,
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::Forbidden { .. } => ErrorKind::Forbidden,
            CoreError::Integrity { .. } => ErrorKind::Integrity,
        }
    }

    /// Machine-readable reason code (SCREAMING_SNAKE).
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation(err) => err.code(),
            CoreError::Coupon(rejection) => rejection.code(),
            CoreError::OutOfStock(violations) => violations
                .first()
                .map(StockViolation::code)
                .unwrap_or("OUT_OF_STOCK"),
            CoreError::ReturnEligibility(err) => err.code(),
            CoreError::Transition(_) => "INVALID_TRANSITION",
            CoreError::StatusConflict { .. } => "STATUS_CONFLICT",
            CoreError::StockConflict { .. } => "STOCK_CONFLICT",
            CoreError::OrderStateConflict { .. } => "ORDER_STATE_CONFLICT",
            CoreError::NotFound { .. } => "NOT_FOUND",
            CoreError::Forbidden { .. } => "FORBIDDEN",
            CoreError::Integrity { .. } => "INTEGRITY_ERROR",
        }
    }

    /// Shorthand for a [`CoreError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity,
            id: id.into(),
        }
    }
}

fn join_violations(violations: &[StockViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when request input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid date window, bad code).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Duplicate value (e.g., duplicate coupon code).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },

    /// Reference to something that is not part of the parent record.
    #[error("{field} '{value}' does not belong to this record")]
    UnknownReference { field: String, value: String },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::Required { .. } => "REQUIRED_FIELD",
            ValidationError::OutOfRange { .. } => "OUT_OF_RANGE",
            ValidationError::MustBePositive { .. } => "MUST_BE_POSITIVE",
            ValidationError::InvalidFormat { .. } => "INVALID_FORMAT",
            ValidationError::NotAllowed { .. } => "NOT_ALLOWED",
            ValidationError::Duplicate { .. } => "DUPLICATE",
            ValidationError::UnknownReference { .. } => "UNKNOWN_REFERENCE",
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::OutOfStock(vec![StockViolation::OutOfStock {
            product_id: "navy-suit".to_string(),
            size: Some("40R".to_string()),
            available: 1,
            requested: 2,
        }]);
        assert_eq!(
            err.to_string(),
            "Stock check failed: navy-suit (size 40R): available 1, requested 2"
        );
        assert_eq!(err.code(), "OUT_OF_STOCK");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "city".to_string(),
        };
        assert_eq!(err.to_string(), "city is required");
        assert_eq!(err.code(), "REQUIRED_FIELD");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "address".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            CoreError::from(CouponRejection::MalformedCode).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            CoreError::from(CouponRejection::NotFound).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            CoreError::from(CouponRejection::Expired).kind(),
            ErrorKind::Eligibility
        );
        assert_eq!(
            CoreError::from(ReturnEligibilityError::WindowClosed { days: 30 }).kind(),
            ErrorKind::Eligibility
        );

        let transition = CoreError::from(TransitionError::NotAllowed {
            from: ReturnStatus::Pending,
            to: ReturnStatus::Refunded,
        });
        assert_eq!(transition.kind(), ErrorKind::Transition);
        assert_eq!(transition.code(), "INVALID_TRANSITION");

        let conflict = CoreError::StatusConflict {
            return_id: "r1".to_string(),
            expected: ReturnStatus::Approved,
            actual: ReturnStatus::Refunded,
        };
        assert_eq!(conflict.kind(), ErrorKind::Conflict);
    }
}
