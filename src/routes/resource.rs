//! Resource and relationship routes for every declared type.
//! Paths are parameterized; handlers resolve the resource type from the first segment.

use crate::handlers::resource::{
    create_resource, delete_resource, get_relationship, get_resource, list_resources, update_relationship,
    update_resource,
};
use crate::state::AppState;
use axum::{routing::get, Router};
use tower_http::limit::RequestBodyLimitLayer;

pub fn resource_routes(state: AppState) -> Router {
    let body_limit = state.options.body_limit;
    Router::new()
        .route("/:resource_type", get(list_resources).post(create_resource))
        .route(
            "/:resource_type/:id",
            get(get_resource).patch(update_resource).delete(delete_resource),
        )
        .route(
            "/:resource_type/:id/relationships/:relationship",
            get(get_relationship).patch(update_relationship),
        )
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}
