//! # Return Request State Machine
//!
//! The lifecycle of a return, from the customer's request to a terminal state.
//!
//! ## States
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   pending ──approve──► approved ──receive──► received ──inspect──┐      │
//! │      │                    │  │                                   ▼      │
//! │      │ reject             │  └──────────refund──────┐       inspecting  │
//! │      ▼                    │                         ▼            │      │
//! │   rejected ■              │                     refunded ◄─refund┘      │
//! │                           │                         │                   │
//! │   cancelled ■ ◄──cancel───┴──(also from pending)    └─finalize─► completed ■
//! │                                                                         │
//! │   ■ = terminal. Quality checks are recorded in received / inspecting    │
//! │       without changing state.                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//! - Only administrators drive transitions. Customers may open a return on
//!   their own order and cancel it while it is `pending` or `approved`.
//! - Anything not in the table fails with [`TransitionError`], which is
//!   distinct from eligibility errors: it means the caller is wrong.
//! - Every transition appends a [`StatusChange`] to the history.
//! - Side effects are returned as [`SideEffect`] values; this module
//!   performs none of them.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::coupon::CouponUsagePolicy;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::order::Order;
use crate::refund::{self, RefundInput, RefundMethod, RefundRecord};
use crate::types::Actor;
use crate::RETURN_WINDOW_DAYS;

// =============================================================================
// Enums
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum ReturnStatus {
    Pending,
    Approved,
    Rejected,
    Received,
    Inspecting,
    Refunded,
    Completed,
    Cancelled,
}

impl ReturnStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ReturnStatus::Pending => "pending",
            ReturnStatus::Approved => "approved",
            ReturnStatus::Rejected => "rejected",
            ReturnStatus::Received => "received",
            ReturnStatus::Inspecting => "inspecting",
            ReturnStatus::Refunded => "refunded",
            ReturnStatus::Completed => "completed",
            ReturnStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_ascii_lowercase();
        [
            ReturnStatus::Pending,
            ReturnStatus::Approved,
            ReturnStatus::Rejected,
            ReturnStatus::Received,
            ReturnStatus::Inspecting,
            ReturnStatus::Refunded,
            ReturnStatus::Completed,
            ReturnStatus::Cancelled,
        ]
        .into_iter()
        .find(|s| s.as_str() == raw)
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReturnStatus::Rejected | ReturnStatus::Completed | ReturnStatus::Cancelled
        )
    }

    /// Whether units on this return still count against the ordered quantity.
    pub const fn holds_quantity(&self) -> bool {
        !matches!(self, ReturnStatus::Rejected | ReturnStatus::Cancelled)
    }
}

impl fmt::Display for ReturnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ItemCondition {
    #[default]
    New,
    LikeNew,
    Good,
    Fair,
    Poor,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReturnMethod {
    #[default]
    Mail,
    StoreReturn,
    Pickup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum QualityRating {
    Excellent,
    Good,
    Acceptable,
    Poor,
    Damaged,
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReturnEligibilityError {
    #[error("order has not been paid")]
    NotPaid,
    #[error("order has not been delivered")]
    NotDelivered,
    #[error("the {days}-day return window has closed")]
    WindowClosed { days: i64 },
    #[error(
        "cannot return {requested} of order item {order_item_id}: \
         ordered {ordered}, already returned {already_returned}"
    )]
    QuantityExceeded {
        order_item_id: String,
        ordered: i64,
        already_returned: i64,
        requested: i64,
    },
}

impl ReturnEligibilityError {
    pub fn code(&self) -> &'static str {
        match self {
            ReturnEligibilityError::NotPaid => "ORDER_NOT_PAID",
            ReturnEligibilityError::NotDelivered => "ORDER_NOT_DELIVERED",
            ReturnEligibilityError::WindowClosed { .. } => "RETURN_WINDOW_CLOSED",
            ReturnEligibilityError::QuantityExceeded { .. } => "RETURN_QUANTITY_EXCEEDED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot move a return from {from} to {to}")]
    NotAllowed {
        from: ReturnStatus,
        to: ReturnStatus,
    },
    #[error("quality checks are not accepted while a return is {status}")]
    QualityCheckNotAllowed { status: ReturnStatus },
}

// =============================================================================
// Records
// =============================================================================

/// One line being sent back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ReturnItem {
    pub order_item_id: String,
    pub product_id: String,
    pub name: String,
    pub return_qty: i64,
    pub condition: ItemCondition,
    pub return_reason: String,
}

/// Audit entry for a status change or a quality check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    /// `None` for the creation entry.
    pub from: Option<ReturnStatus>,
    pub to: ReturnStatus,
    pub actor: String,
    #[ts(as = "String")]
    pub at: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct QualityItem {
    pub order_item_id: String,
    pub condition: ItemCondition,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Admin submission for `PUT /returns/:id/quality-check`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct QualityCheckInput {
    pub quality_rating: QualityRating,
    #[serde(default)]
    pub quality_notes: Option<String>,
    #[serde(default)]
    pub quality_items: Vec<QualityItem>,
    #[serde(default = "default_restockable")]
    pub restockable: bool,
}

fn default_restockable() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct QualityCheck {
    pub rating: QualityRating,
    pub notes: Option<String>,
    pub items: Vec<QualityItem>,
    pub restockable: bool,
    pub checked_by: String,
    #[ts(as = "String")]
    pub checked_at: DateTime<Utc>,
}

// =============================================================================
// Side Effects
// =============================================================================

/// Work the caller must carry out after a transition is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum SideEffect {
    GenerateShippingInstructions {
        return_number: String,
        method: ReturnMethod,
    },
    NotifyCustomer {
        user_id: String,
        reason: String,
    },
    RecordRefund {
        amount: Money,
        method: RefundMethod,
    },
    RestockItems {
        items: Vec<RestockLine>,
    },
    RestoreCouponUsage {
        coupon_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RestockLine {
    pub product_id: String,
    pub size: Option<String>,
    pub quantity: i64,
}

// =============================================================================
// Policy & Events
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnPolicy {
    pub window_days: i64,
    pub coupon_usage: CouponUsagePolicy,
}

impl Default for ReturnPolicy {
    fn default() -> Self {
        ReturnPolicy {
            window_days: RETURN_WINDOW_DAYS,
            coupon_usage: CouponUsagePolicy::default(),
        }
    }
}

impl ReturnPolicy {
    /// Whether `order` can take a return at `now`.
    pub fn check_eligibility(
        &self,
        order: &Order,
        now: DateTime<Utc>,
    ) -> Result<(), ReturnEligibilityError> {
        if !order.is_paid {
            return Err(ReturnEligibilityError::NotPaid);
        }
        let delivered_at = match (order.is_delivered, order.delivered_at) {
            (true, Some(at)) => at,
            _ => return Err(ReturnEligibilityError::NotDelivered),
        };
        if now - delivered_at > Duration::days(self.window_days) {
            return Err(ReturnEligibilityError::WindowClosed {
                days: self.window_days,
            });
        }
        Ok(())
    }
}

/// An admin or customer action on a return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnEvent {
    Approve,
    Reject { reason: String },
    MarkReceived,
    StartInspection,
    ProcessRefund(RefundInput),
    Finalize,
    Cancel,
}

impl ReturnEvent {
    /// The state this event moves to.
    pub const fn target(&self) -> ReturnStatus {
        match self {
            ReturnEvent::Approve => ReturnStatus::Approved,
            ReturnEvent::Reject { .. } => ReturnStatus::Rejected,
            ReturnEvent::MarkReceived => ReturnStatus::Received,
            ReturnEvent::StartInspection => ReturnStatus::Inspecting,
            ReturnEvent::ProcessRefund(_) => ReturnStatus::Refunded,
            ReturnEvent::Finalize => ReturnStatus::Completed,
            ReturnEvent::Cancel => ReturnStatus::Cancelled,
        }
    }

    /// Maps a requested target status to its event. Refunds reached this way
    /// use the computed amount and default method.
    pub fn for_target(status: ReturnStatus, notes: Option<&str>) -> Option<Self> {
        let event = match status {
            ReturnStatus::Approved => ReturnEvent::Approve,
            ReturnStatus::Rejected => ReturnEvent::Reject {
                reason: notes.unwrap_or_default().to_string(),
            },
            ReturnStatus::Received => ReturnEvent::MarkReceived,
            ReturnStatus::Inspecting => ReturnEvent::StartInspection,
            ReturnStatus::Refunded => ReturnEvent::ProcessRefund(RefundInput::default()),
            ReturnStatus::Completed => ReturnEvent::Finalize,
            ReturnStatus::Cancelled => ReturnEvent::Cancel,
            ReturnStatus::Pending => return None,
        };
        Some(event)
    }

    fn allowed_from(&self, from: ReturnStatus) -> bool {
        use ReturnStatus::*;
        matches!(
            (from, self),
            (Pending, ReturnEvent::Approve)
                | (Pending, ReturnEvent::Reject { .. })
                | (Approved, ReturnEvent::MarkReceived)
                | (Received, ReturnEvent::StartInspection)
                | (Approved | Inspecting, ReturnEvent::ProcessRefund(_))
                | (Refunded, ReturnEvent::Finalize)
                | (Pending | Approved, ReturnEvent::Cancel)
        )
    }
}

/// Everything a transition reads besides the return itself.
#[derive(Debug, Clone, Copy)]
pub struct TransitionContext<'a> {
    pub actor: &'a Actor,
    pub order: &'a Order,
    /// Other returns on the same order.
    pub sibling_returns: &'a [ReturnRequest],
    pub policy: &'a ReturnPolicy,
    pub now: DateTime<Utc>,
}

// =============================================================================
// Return Request
// =============================================================================

/// `POST /returns` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NewReturn {
    pub order_id: String,
    pub return_items: Vec<NewReturnItem>,
    #[serde(default)]
    pub return_method: ReturnMethod,
    #[serde(default)]
    pub customer_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NewReturnItem {
    pub order_item_id: String,
    pub return_qty: i64,
    #[serde(default)]
    pub condition: ItemCondition,
    #[serde(default)]
    pub return_reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ReturnRequest {
    pub id: String,
    /// Human-readable, e.g. `RET000042`.
    pub return_number: String,
    pub order_id: String,
    pub user_id: String,
    pub return_items: Vec<ReturnItem>,
    pub status: ReturnStatus,
    pub return_method: ReturnMethod,
    pub customer_notes: Option<String>,
    pub return_amount: Money,
    pub quality_check: Option<QualityCheck>,
    pub refund: Option<RefundRecord>,
    pub history: Vec<StatusChange>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Formats a sequence number as a return number.
pub fn format_return_number(sequence: i64) -> String {
    format!("RET{sequence:06}")
}

impl ReturnRequest {
    /// Opens a `pending` return against `order`.
    ///
    /// `sibling_returns` are the order's existing returns; their
    /// non-rejected, non-cancelled quantities count against each line.
    pub fn open(
        id: String,
        return_number: String,
        input: NewReturn,
        ctx: TransitionContext<'_>,
    ) -> CoreResult<ReturnRequest> {
        let TransitionContext {
            actor,
            order,
            sibling_returns,
            policy,
            now,
        } = ctx;

        if actor.user_id != order.user_id && !actor.is_admin() {
            return Err(CoreError::Forbidden {
                action: format!("return items from order {}", order.id),
            });
        }

        policy.check_eligibility(order, now)?;

        if input.return_items.is_empty() {
            return Err(ValidationError::Required {
                field: "returnItems".to_string(),
            }
            .into());
        }

        let mut items: Vec<ReturnItem> = Vec::with_capacity(input.return_items.len());
        for requested in input.return_items {
            if requested.return_qty <= 0 {
                return Err(ValidationError::MustBePositive {
                    field: "returnQty".to_string(),
                }
                .into());
            }
            crate::validation::validate_required("returnReason", &requested.return_reason)?;

            if items.iter().any(|i| i.order_item_id == requested.order_item_id) {
                return Err(ValidationError::Duplicate {
                    field: "orderItemId".to_string(),
                    value: requested.order_item_id,
                }
                .into());
            }

            let line = order.item(&requested.order_item_id).ok_or_else(|| {
                ValidationError::UnknownReference {
                    field: "orderItemId".to_string(),
                    value: requested.order_item_id.clone(),
                }
            })?;

            let already_returned = returned_quantity(sibling_returns, &line.id);
            if already_returned + requested.return_qty > line.quantity {
                return Err(ReturnEligibilityError::QuantityExceeded {
                    order_item_id: line.id.clone(),
                    ordered: line.quantity,
                    already_returned,
                    requested: requested.return_qty,
                }
                .into());
            }

            items.push(ReturnItem {
                order_item_id: line.id.clone(),
                product_id: line.product_id.clone(),
                name: line.name.clone(),
                return_qty: requested.return_qty,
                condition: requested.condition,
                return_reason: requested.return_reason,
            });
        }

        let return_amount = refund::return_amount(order, &items)?;

        Ok(ReturnRequest {
            id,
            return_number,
            order_id: order.id.clone(),
            user_id: order.user_id.clone(),
            return_items: items,
            status: ReturnStatus::Pending,
            return_method: input.return_method,
            history: vec![StatusChange {
                from: None,
                to: ReturnStatus::Pending,
                actor: actor.user_id.clone(),
                at: now,
                notes: input.customer_notes.clone(),
            }],
            customer_notes: input.customer_notes,
            return_amount,
            quality_check: None,
            refund: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Fails with a conflict when `expected` is given and differs.
    pub fn ensure_status(&self, expected: Option<ReturnStatus>) -> CoreResult<()> {
        match expected {
            Some(expected) if expected != self.status => Err(CoreError::StatusConflict {
                return_id: self.id.clone(),
                expected,
                actual: self.status,
            }),
            _ => Ok(()),
        }
    }

    /// Owner or admin.
    pub fn ensure_visible_to(&self, actor: &Actor) -> CoreResult<()> {
        if actor.is_admin() || actor.user_id == self.user_id {
            Ok(())
        } else {
            Err(CoreError::Forbidden {
                action: format!("view return {}", self.id),
            })
        }
    }

    /// Applies `event`, returning the side effects to perform.
    ///
    /// On error the return is left untouched.
    pub fn apply(
        &mut self,
        event: ReturnEvent,
        notes: Option<String>,
        ctx: TransitionContext<'_>,
    ) -> CoreResult<Vec<SideEffect>> {
        let from = self.status;
        let to = event.target();

        match &event {
            ReturnEvent::Cancel => {
                if !ctx.actor.is_admin() && ctx.actor.user_id != self.user_id {
                    return Err(CoreError::Forbidden {
                        action: "cancel this return".to_string(),
                    });
                }
            }
            _ => {
                if !ctx.actor.is_admin() {
                    return Err(CoreError::Forbidden {
                        action: format!("move a return to {to}"),
                    });
                }
            }
        }

        if !event.allowed_from(from) {
            return Err(TransitionError::NotAllowed { from, to }.into());
        }

        let mut effects = Vec::new();
        let mut refund_record = None;

        match event {
            ReturnEvent::Approve => effects.push(SideEffect::GenerateShippingInstructions {
                return_number: self.return_number.clone(),
                method: self.return_method,
            }),
            ReturnEvent::Reject { reason } => {
                let reason = if reason.trim().is_empty() {
                    notes.clone().unwrap_or_default()
                } else {
                    reason
                };
                crate::validation::validate_required("reason", &reason)?;
                effects.push(SideEffect::NotifyCustomer {
                    user_id: self.user_id.clone(),
                    reason,
                });
            }
            ReturnEvent::ProcessRefund(input) => {
                let computed = refund::return_amount(ctx.order, &self.return_items)?;
                let record = input.settle(computed, &ctx.actor.user_id, ctx.now)?;
                effects.push(SideEffect::RecordRefund {
                    amount: record.amount,
                    method: record.method,
                });
                if let Some(restore) = self.coupon_restoration(&ctx) {
                    effects.push(restore);
                }
                refund_record = Some(record);
            }
            ReturnEvent::Finalize => {
                if self.quality_check.as_ref().is_some_and(|qc| qc.restockable) {
                    effects.push(SideEffect::RestockItems {
                        items: self.restock_lines(ctx.order),
                    });
                }
            }
            ReturnEvent::MarkReceived | ReturnEvent::StartInspection | ReturnEvent::Cancel => {}
        }

        if let Some(record) = refund_record {
            self.refund = Some(record);
        }
        self.status = to;
        self.updated_at = ctx.now;
        self.history.push(StatusChange {
            from: Some(from),
            to,
            actor: ctx.actor.user_id.clone(),
            at: ctx.now,
            notes,
        });

        Ok(effects)
    }

    /// Records an inspection result without changing state.
    pub fn record_quality_check(
        &mut self,
        input: QualityCheckInput,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        if !actor.is_admin() {
            return Err(CoreError::Forbidden {
                action: "record a quality check".to_string(),
            });
        }

        if !matches!(self.status, ReturnStatus::Received | ReturnStatus::Inspecting) {
            return Err(TransitionError::QualityCheckNotAllowed {
                status: self.status,
            }
            .into());
        }

        for item in &input.quality_items {
            if !self
                .return_items
                .iter()
                .any(|r| r.order_item_id == item.order_item_id)
            {
                return Err(ValidationError::UnknownReference {
                    field: "qualityItems.orderItemId".to_string(),
                    value: item.order_item_id.clone(),
                }
                .into());
            }
        }

        let summary = match &input.quality_notes {
            Some(notes) => format!("quality check: {:?}, {}", input.quality_rating, notes),
            None => format!("quality check: {:?}", input.quality_rating),
        };

        self.quality_check = Some(QualityCheck {
            rating: input.quality_rating,
            notes: input.quality_notes,
            items: input.quality_items,
            restockable: input.restockable,
            checked_by: actor.user_id.clone(),
            checked_at: now,
        });
        self.updated_at = now;
        self.history.push(StatusChange {
            from: Some(self.status),
            to: self.status,
            actor: actor.user_id.clone(),
            at: now,
            notes: Some(summary),
        });
        Ok(())
    }

    /// Units on this return for one order line.
    pub fn quantity_for(&self, order_item_id: &str) -> i64 {
        self.return_items
            .iter()
            .filter(|i| i.order_item_id == order_item_id)
            .map(|i| i.return_qty)
            .sum()
    }

    fn restock_lines(&self, order: &Order) -> Vec<RestockLine> {
        self.return_items
            .iter()
            .map(|item| RestockLine {
                product_id: item.product_id.clone(),
                size: order
                    .item(&item.order_item_id)
                    .and_then(|line| line.selected_size.clone()),
                quantity: item.return_qty,
            })
            .collect()
    }

    /// Under the fulfilled policy, the order's coupon use comes back once
    /// every unit of the order has been refunded.
    fn coupon_restoration(&self, ctx: &TransitionContext<'_>) -> Option<SideEffect> {
        if ctx.policy.coupon_usage != CouponUsagePolicy::Fulfilled {
            return None;
        }
        let coupon = ctx.order.applied_coupon.as_ref()?;

        let refunded_elsewhere: i64 = ctx
            .sibling_returns
            .iter()
            .filter(|r| r.id != self.id && r.refund.is_some())
            .flat_map(|r| r.return_items.iter().map(|i| i.return_qty))
            .sum();
        let this: i64 = self.return_items.iter().map(|i| i.return_qty).sum();

        (refunded_elsewhere + this >= ctx.order.total_units()).then(|| {
            SideEffect::RestoreCouponUsage {
                coupon_id: coupon.coupon_id.clone(),
            }
        })
    }
}

/// Units of `order_item_id` held by returns that still count.
pub fn returned_quantity(returns: &[ReturnRequest], order_item_id: &str) -> i64 {
    returns
        .iter()
        .filter(|r| r.status.holds_quantity())
        .map(|r| r.quantity_for(order_item_id))
        .sum()
}

// =============================================================================
// Unit Tests
// =============================================================================
