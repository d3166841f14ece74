//! Router assembly.

mod common;
mod resource;

pub use common::{common_routes, common_routes_with_ready};
pub use resource::resource_routes;

use crate::state::AppState;
use axum::Router;

/// Common routes at the root plus resource routes under the configured namespace.
pub fn app(state: AppState) -> Router {
    let namespace = state.options.namespace.trim_end_matches('/').to_string();
    let common = common_routes_with_ready(state.clone());
    let resources = resource_routes(state);
    if namespace.is_empty() {
        common.merge(resources)
    } else {
        common.nest(&namespace, resources)
    }
}
