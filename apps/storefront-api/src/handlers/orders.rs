//! Order placement and lifecycle.
//!
//! ## Placement
//! ```text
//! POST /orders
//!      │
//!      ├── look up coupon + the caller's paid redemptions
//!      ├── load catalog snapshot for every line
//!      ├── PlacementValidator::validate   (pure: stock, coupon, totals)
//!      │        └── discrepancies → warn! (server values win)
//!      └── OrderRepository::create        (one transaction: stock,
//!                                          coupon use, order rows)
//! ```

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::require_admin;
use crate::error::ApiResult;
use crate::extract::{ApiJson, CurrentActor};
use crate::SharedState;
use storefront_core::order::Order;
use storefront_core::placement::{OrderRequest, TotalsDiscrepancy};
use storefront_core::CoreError;

/// `POST /orders` response: the stored order plus any client totals the
/// server overrode.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedOrder {
    #[serde(flatten)]
    pub order: Order,
    pub discrepancies: Vec<TotalsDiscrepancy>,
}

pub async fn place_order(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    ApiJson(request): ApiJson<OrderRequest>,
) -> ApiResult<(StatusCode, Json<PlacedOrder>)> {
    let now = Utc::now();

    let coupon = match request.coupon_code().map_err(CoreError::from)? {
        Some(code) => state.db.coupons().find_by_code(&code).await?,
        None => None,
    };
    let redemptions = match &coupon {
        Some(c) => Some(
            state
                .db
                .coupons()
                .count_user_redemptions(&c.id, &actor.user_id)
                .await?,
        ),
        None => None,
    };

    let products = state
        .db
        .products()
        .get_many(request.order_items.iter().map(|l| l.product_id.as_str()).collect::<Vec<&str>>())
        .await?;

    let plan = state
        .placement
        .validate(&request, &products, coupon.as_ref(), redemptions, now)?;

    for d in &plan.discrepancies {
        warn!(
            user_id = %actor.user_id,
            field = %d.field,
            client = %d.client,
            server = %d.server,
            "Client totals disagree with server"
        );
    }

    let order = plan.to_order(Uuid::new_v4().to_string(), actor.user_id.clone(), now);
    state.db.orders().create(&order, &plan.reservations).await?;

    Ok((
        StatusCode::CREATED,
        Json(PlacedOrder {
            order,
            discrepancies: plan.discrepancies,
        }),
    ))
}

pub async fn get_order(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> ApiResult<Json<Order>> {
    let order = load(&state, &id).await?;
    order.ensure_visible_to(&actor)?;
    Ok(Json(order))
}

/// Owner or admin.
pub async fn pay_order(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> ApiResult<Json<Order>> {
    let order = load(&state, &id).await?;
    order.ensure_visible_to(&actor)?;

    let order = state.db.orders().mark_paid(&id, Utc::now()).await?;
    info!(id = %id, by = %actor.user_id, "Payment recorded");
    Ok(Json(order))
}

/// Admin only.
pub async fn deliver_order(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> ApiResult<Json<Order>> {
    require_admin(&actor, "mark orders delivered")?;

    let order = state.db.orders().mark_delivered(&id, Utc::now()).await?;
    Ok(Json(order))
}

/// `GET /orders/mine`
pub async fn my_orders(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
) -> ApiResult<Json<Vec<Order>>> {
    Ok(Json(state.db.orders().list_for_user(&actor.user_id).await?))
}

/// `GET /orders`. Admin only.
pub async fn list_orders(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
) -> ApiResult<Json<Vec<Order>>> {
    require_admin(&actor, "list all orders")?;
    Ok(Json(state.db.orders().list_all().await?))
}

pub(crate) async fn load(state: &SharedState, id: &str) -> ApiResult<Order> {
    state
        .db
        .orders()
        .get(id)
        .await?
        .ok_or_else(|| CoreError::not_found("order", id).into())
}
