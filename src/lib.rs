//! JSON:API SDK: declared resource graph served over axum, with relationship-aware resource hooks.

pub mod config;
pub mod document;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod hooks;
pub mod migration;
pub mod naming;
pub mod request;
pub mod resource;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use config::{load_from_path, parse_graph, resolve, GraphConfig, JsonApiOptions, ResourceGraph};
pub use error::{AppError, ConfigError, HookError, ValidationFailure};
pub use hooks::{HookDiscovery, HookRegistry, ResourceHook, ResourceHookExecutor, ResourceHooks, ResourcePipeline};
pub use migration::ensure_tables;
pub use request::RequestContext;
pub use resource::{RelationshipData, Resource, ResourceKey};
pub use routes::{app, common_routes, common_routes_with_ready, resource_routes};
pub use service::ResourceService;
pub use state::AppState;
pub use store::{ensure_database_exists, InMemoryRepository, PgRepository, ResourceRepository};
