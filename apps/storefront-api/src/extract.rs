//! Request extractors.
//!
//! - [`Actor`] comes from the `X-User-Id` / `X-User-Role` headers set by
//!   the upstream auth proxy. Authentication itself happens there.
//! - [`ApiJson`] is `axum::Json` with rejections reported in the API's own
//!   error shape.

use axum::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::Json;

use crate::error::ApiError;
use storefront_core::{Actor, Role};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The caller's identity.
#[derive(Debug, Clone)]
pub struct CurrentActor(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthenticated("missing X-User-Id".to_string()))?;

        let role = match header(parts, USER_ROLE_HEADER).map(str::to_ascii_lowercase).as_deref() {
            None | Some("customer") => Role::Customer,
            Some("admin") => Role::Admin,
            Some(other) => {
                return Err(ApiError::Unauthenticated(format!(
                    "unknown role '{other}'"
                )))
            }
        };

        Ok(CurrentActor(Actor {
            user_id: user_id.to_string(),
            role,
        }))
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// JSON body extractor.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::InvalidBody(rejection.body_text()))?;
        Ok(ApiJson(value))
    }
}
