//! HTTP handlers, one module per resource.

pub mod coupons;
pub mod health;
pub mod orders;
pub mod pricing;
pub mod returns;

use storefront_core::{Actor, CoreError};

/// Fails with 403 unless `actor` is an admin.
pub(crate) fn require_admin(actor: &Actor, action: &str) -> Result<(), CoreError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(CoreError::Forbidden {
            action: action.to_string(),
        })
    }
}
