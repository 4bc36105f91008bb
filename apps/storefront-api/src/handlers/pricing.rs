//! Cart price preview.
//!
//! Uses the same engine as placement, with catalog prices swapped in, so a
//! quote and the order placed from it agree to the cent.

use axum::extract::State;
use axum::Json;
use chrono::Utc;

use crate::error::ApiResult;
use crate::extract::{ApiJson, CurrentActor};
use crate::SharedState;
use storefront_core::cart::{Cart, CartLine};
use storefront_core::coupon;
use storefront_core::pricing::Quote;
use storefront_core::validation::validate_line_count;
use storefront_core::CoreError;

/// `POST /pricing/quote`. An unusable coupon is reported in the quote, not
/// as an error.
pub async fn quote(
    State(state): State<SharedState>,
    actor: Option<CurrentActor>,
    ApiJson(cart): ApiJson<Cart>,
) -> ApiResult<Json<Quote>> {
    validate_line_count(cart.lines.len())?;
    for line in &cart.lines {
        line.validate()?;
    }

    let products = state
        .db
        .products()
        .get_many(cart.lines.iter().map(|l| l.product_id.as_str()).collect::<Vec<&str>>())
        .await?;

    let lines = cart
        .lines
        .iter()
        .map(|line| {
            products
                .iter()
                .find(|p| p.id == line.product_id)
                .map(|p| CartLine {
                    unit_price: p.price,
                    name: p.name.clone(),
                    ..line.clone()
                })
                .ok_or_else(|| CoreError::not_found("product", line.product_id.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let code = cart.coupon_code.as_deref().map(coupon::parse_code).transpose();
    let (code, malformed) = match code {
        Ok(code) => (code, None),
        Err(rejection) => (None, Some(rejection)),
    };

    let found = match &code {
        Some(code) => state.db.coupons().find_by_code(code).await?,
        None => None,
    };
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

    let repriced = Cart {
        lines,
        coupon_code: code,
    };
    let mut quote = state
        .pricing
        .quote(&repriced, found.as_ref(), Utc::now(), redemptions);

    if let Some(rejection) = malformed {
        quote.coupon_rejection = Some(rejection.code().to_string());
    }

    Ok(Json(quote))
}
