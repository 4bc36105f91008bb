//! Coupon preview and administration.
//!
//! Everything except `POST /coupons/apply` is admin only. For percentage
//! coupons `discountValue` is a whole percent (`20` = 20%); for fixed-amount
//! coupons it is cents.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::require_admin;
use crate::error::ApiResult;
use crate::extract::{ApiJson, CurrentActor};
use crate::SharedState;
use storefront_core::coupon::{self, Coupon, CouponPatch, DiscountType, NewCoupon};
use storefront_core::{CoreError, Money};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyCouponRequest {
    pub coupon_code: String,
    pub cart_total: Money,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponPreview {
    pub coupon_code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub discount_amount: Money,
}

/// `POST /coupons/apply`. Anonymous callers skip the per-user limit.
pub async fn apply_coupon(
    State(state): State<SharedState>,
    actor: Option<CurrentActor>,
    ApiJson(request): ApiJson<ApplyCouponRequest>,
) -> ApiResult<Json<CouponPreview>> {
    let code = coupon::parse_code(&request.coupon_code).map_err(CoreError::from)?;
    let found = state.db.coupons().find_by_code(&code).await?;

    let redemptions = match (&found, &actor) {
        (Some(c), Some(CurrentActor(actor))) => Some(
            state
                .db
                .coupons()
                .count_user_redemptions(&c.id, &actor.user_id)
                .await?,
        ),
        _ => None,
    };

    let applied = coupon::validate(found.as_ref(), request.cart_total, Utc::now(), redemptions)
        .map_err(CoreError::from)?;

    Ok(Json(CouponPreview {
        coupon_code: applied.code,
        discount_type: applied.discount_type,
        discount_value: applied.discount_value,
        discount_amount: applied.discount_amount,
    }))
}

/// `POST /coupons`. Admin only.
pub async fn create_coupon(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    ApiJson(draft): ApiJson<NewCoupon>,
) -> ApiResult<(StatusCode, Json<Coupon>)> {
    require_admin(&actor, "create coupons")?;

    let coupon = draft.into_coupon(Uuid::new_v4().to_string())?;
    state.db.coupons().insert(&coupon).await?;
    Ok((StatusCode::CREATED, Json(coupon)))
}

/// `GET /coupons`
pub async fn list_coupons(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
) -> ApiResult<Json<Vec<Coupon>>> {
    require_admin(&actor, "list coupons")?;
    Ok(Json(state.db.coupons().list().await?))
}

/// `GET /coupons/:id`
pub async fn get_coupon(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> ApiResult<Json<Coupon>> {
    require_admin(&actor, "view coupons")?;
    Ok(Json(load(&state, &id).await?))
}

/// `PUT /coupons/:id`. Fields left out of the body keep their value.
pub async fn update_coupon(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<CouponPatch>,
) -> ApiResult<Json<Coupon>> {
    require_admin(&actor, "edit coupons")?;

    let existing = load(&state, &id).await?;
    let write_usage = patch.times_used.is_some();
    let edited = patch.apply(&existing)?;
    let stored = state.db.coupons().update(&edited, write_usage).await?;

    info!(code = %stored.code, by = %actor.user_id, "Coupon edited");
    Ok(Json(stored))
}

/// `DELETE /coupons/:id`
pub async fn delete_coupon(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    require_admin(&actor, "delete coupons")?;

    state.db.coupons().delete(&id).await?;
    info!(id = %id, by = %actor.user_id, "Coupon removed");
    Ok(StatusCode::NO_CONTENT)
}

async fn load(state: &SharedState, id: &str) -> ApiResult<Coupon> {
    state
        .db
        .coupons()
        .get(id)
        .await?
        .ok_or_else(|| CoreError::not_found("coupon", id).into())
}
