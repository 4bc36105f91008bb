//! Return request lifecycle.
//!
//! ## Opening
//! `POST /returns` hands the eligibility and quantity checks to the
//! repository's `open`, which runs them against the sibling returns inside
//! the insert's write-locked transaction.
//!
//! ## Transition Flow
//! ```text
//! PUT /returns/:id/{status,refund,quality-check,cancel}
//!      │
//!      ├── load return, its order, sibling returns
//!      ├── ensure_status(expectedStatus)        409 if stale
//!      ├── ReturnRequest::apply(event)          pure, yields side effects
//!      ├── save_transition(WHERE status=from)   409 if lost race;
//!      │        └── restock / coupon release in the same transaction
//!      └── remaining effects are logged for the notification and payment
//!          collaborators
//! ```

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{orders, require_admin};
use crate::error::ApiResult;
use crate::extract::{ApiJson, CurrentActor};
use crate::SharedState;
use storefront_core::order::Order;
use storefront_core::refund::RefundInput;
use storefront_core::returns::{
    NewReturn, QualityCheckInput, ReturnEvent, ReturnRequest, ReturnStatus, SideEffect,
    TransitionContext, TransitionError,
};
use storefront_core::{Actor, CoreError, ValidationError};

// =============================================================================
// Bodies
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub status: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub expected_status: Option<ReturnStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    #[serde(flatten)]
    pub refund: RefundInput,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub expected_status: Option<ReturnStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityCheckRequest {
    #[serde(flatten)]
    pub check: QualityCheckInput,
    #[serde(default)]
    pub expected_status: Option<ReturnStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CancelRequest {
    pub notes: Option<String>,
    pub expected_status: Option<ReturnStatus>,
}

/// `GET /returns?status=pending`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReturnFilter {
    pub status: Option<String>,
}

/// A return after a transition, with what the transition asked for.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnUpdate {
    #[serde(flatten)]
    pub return_request: ReturnRequest,
    pub side_effects: Vec<SideEffect>,
}

// =============================================================================
// Handlers
// =============================================================================

/// `POST /returns`
pub async fn create_return(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    ApiJson(request): ApiJson<NewReturn>,
) -> ApiResult<(StatusCode, Json<ReturnRequest>)> {
    let order = orders::load(&state, &request.order_id).await?;
    order.ensure_visible_to(&actor)?;

    let now = Utc::now();
    let ret = state
        .db
        .returns()
        .open(&order.id, |siblings, number| {
            let ctx = TransitionContext {
                actor: &actor,
                order: &order,
                sibling_returns: siblings,
                policy: &state.returns,
                now,
            };
            ReturnRequest::open(Uuid::new_v4().to_string(), number, request, ctx)
        })
        .await?;

    Ok((StatusCode::CREATED, Json(ret)))
}

/// `GET /returns/:id`
pub async fn get_return(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> ApiResult<Json<ReturnRequest>> {
    let ret = load(&state, &id).await?;
    ret.ensure_visible_to(&actor)?;
    Ok(Json(ret))
}

/// `GET /orders/:id/returns`
pub async fn list_for_order(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    Path(order_id): Path<String>,
) -> ApiResult<Json<Vec<ReturnRequest>>> {
    let order = orders::load(&state, &order_id).await?;
    order.ensure_visible_to(&actor)?;
    Ok(Json(state.db.returns().list_for_order(&order_id).await?))
}

/// `GET /returns/mine`
pub async fn my_returns(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
) -> ApiResult<Json<Vec<ReturnRequest>>> {
    Ok(Json(state.db.returns().list_for_user(&actor.user_id).await?))
}

/// `GET /returns`. Admin only, optionally filtered by status.
pub async fn list_returns(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    Query(filter): Query<ReturnFilter>,
) -> ApiResult<Json<Vec<ReturnRequest>>> {
    require_admin(&actor, "list all returns")?;

    let status = filter.status.as_deref().map(parse_status).transpose()?;
    Ok(Json(state.db.returns().list_all(status).await?))
}

/// `PUT /returns/:id/status`. Admin transitions by target status.
pub async fn update_status(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<StatusUpdate>,
) -> ApiResult<Json<ReturnUpdate>> {
    let target = parse_status(&body.status)?;

    transition(&state, &actor, &id, body.expected_status, body.notes, |ret, notes| {
        ReturnEvent::for_target(target, notes).ok_or(TransitionError::NotAllowed {
            from: ret.status,
            to: target,
        })
    })
    .await
}

/// `PUT /returns/:id/refund`
pub async fn process_refund(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<RefundRequest>,
) -> ApiResult<Json<ReturnUpdate>> {
    let refund = body.refund;
    transition(&state, &actor, &id, body.expected_status, body.notes, move |_, _| {
        Ok(ReturnEvent::ProcessRefund(refund))
    })
    .await
}

/// `PUT /returns/:id/cancel`. Owner or admin.
pub async fn cancel_return(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<CancelRequest>,
) -> ApiResult<Json<ReturnUpdate>> {
    transition(&state, &actor, &id, body.expected_status, body.notes, |_, _| {
        Ok(ReturnEvent::Cancel)
    })
    .await
}

/// `PUT /returns/:id/quality-check`. Records the inspection; the status
/// does not change.
pub async fn quality_check(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<QualityCheckRequest>,
) -> ApiResult<Json<ReturnRequest>> {
    let mut ret = load(&state, &id).await?;
    ret.ensure_status(body.expected_status)?;

    let from = ret.status;
    ret.record_quality_check(body.check, &actor, Utc::now())?;
    state.db.returns().save_transition(&ret, from, &[]).await?;

    info!(return_number = %ret.return_number, by = %actor.user_id, "Quality check recorded");
    Ok(Json(ret))
}

// =============================================================================
// Shared
// =============================================================================

fn parse_status(raw: &str) -> Result<ReturnStatus, ValidationError> {
    ReturnStatus::parse(raw).ok_or_else(|| ValidationError::InvalidFormat {
        field: "status".to_string(),
        reason: format!("unknown return status '{raw}'"),
    })
}

async fn load(state: &SharedState, id: &str) -> ApiResult<ReturnRequest> {
    state
        .db
        .returns()
        .get(id)
        .await?
        .ok_or_else(|| CoreError::not_found("return", id).into())
}

/// Loads the return, builds the event, applies it and persists the result
/// guarded by the status it was loaded in.
async fn transition<F>(
    state: &SharedState,
    actor: &Actor,
    id: &str,
    expected: Option<ReturnStatus>,
    notes: Option<String>,
    event: F,
) -> ApiResult<Json<ReturnUpdate>>
where
    F: FnOnce(&ReturnRequest, Option<&str>) -> Result<ReturnEvent, TransitionError>,
{
    let mut ret = load(state, id).await?;
    ret.ensure_visible_to(actor)?;
    ret.ensure_status(expected)?;

    let order: Order = orders::load(state, &ret.order_id).await?;
    let siblings: Vec<ReturnRequest> = state
        .db
        .returns()
        .list_for_order(&ret.order_id)
        .await?
        .into_iter()
        .filter(|r| r.id != ret.id)
        .collect();

    let event = event(&ret, notes.as_deref()).map_err(CoreError::from)?;
    let from = ret.status;
    let ctx = TransitionContext {
        actor,
        order: &order,
        sibling_returns: &siblings,
        policy: &state.returns,
        now: Utc::now(),
    };
    let effects = ret.apply(event, notes, ctx)?;

    state.db.returns().save_transition(&ret, from, &effects).await?;
    dispatch(&ret, &effects);

    Ok(Json(ReturnUpdate {
        return_request: ret,
        side_effects: effects,
    }))
}

/// Hands off the effects storage does not perform.
fn dispatch(ret: &ReturnRequest, effects: &[SideEffect]) {
    for effect in effects {
        match effect {
            SideEffect::GenerateShippingInstructions { return_number, method } => {
                info!(return_number = %return_number, method = ?method, "Shipping instructions requested");
            }
            SideEffect::NotifyCustomer { user_id, reason } => {
                info!(return_number = %ret.return_number, user_id = %user_id, reason = %reason, "Customer notification queued");
            }
            SideEffect::RecordRefund { amount, method } => {
                info!(return_number = %ret.return_number, amount = %amount, method = ?method, "Refund recorded");
            }
            SideEffect::RestockItems { items } => {
                info!(return_number = %ret.return_number, lines = items.len(), "Items restocked");
            }
            SideEffect::RestoreCouponUsage { coupon_id } => {
                info!(return_number = %ret.return_number, coupon_id = %coupon_id, "Coupon use restored");
            }
        }
    }
}
