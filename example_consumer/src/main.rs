//! Demo server: todo items, people and tags with logging hooks.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Set `DATABASE_URL` to store in PostgreSQL; without it resources live in memory.
//! `GRAPH_PATH` overrides the resource graph (default `example_consumer/config/graph.json`).

use async_trait::async_trait;
use jsonapi_sdk::hooks::{AffectedRelationships, EntityDiff, HookSet};
use jsonapi_sdk::{
    app, ensure_database_exists, ensure_tables, load_from_path, resolve, AppState, HookDiscovery, HookError,
    HookRegistry, InMemoryRepository, JsonApiOptions, PgRepository, Resource, ResourceHook, ResourceHooks,
    ResourcePipeline, ResourceRepository,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Logs deletes and the relationship changes people pick up as a side effect of other writes.
struct PeopleHooks;

#[async_trait]
impl ResourceHooks for PeopleHooks {
    fn discovery(&self) -> HookDiscovery {
        HookDiscovery::new([
            ResourceHook::BeforeDelete,
            ResourceHook::BeforeImplicitUpdateRelationship,
            ResourceHook::AfterUpdate,
        ])
    }

    async fn before_delete(&self, resources: Vec<Resource>, _pipeline: ResourcePipeline) -> Result<Vec<Resource>, HookError> {
        tracing::info!(count = resources.len(), "deleting people");
        Ok(resources)
    }

    async fn before_implicit_update_relationship(
        &self,
        affected: &AffectedRelationships,
        pipeline: ResourcePipeline,
    ) -> Result<(), HookError> {
        for (relationship, entries) in affected.iter() {
            tracing::info!(
                relationship = %relationship.property,
                count = entries.len(),
                pipeline = ?pipeline,
                "people implicitly affected"
            );
        }
        Ok(())
    }

    async fn after_update(&self, resources: &[Resource], _pipeline: ResourcePipeline) -> Result<(), HookError> {
        tracing::info!(ids = ?resources.iter().filter_map(|r| r.id.as_deref()).collect::<Vec<_>>(), "people updated");
        Ok(())
    }
}

/// Rejects description edits on archived todo items (stored description starts with `[archived]`).
struct TodoItemHooks;

#[async_trait]
impl ResourceHooks for TodoItemHooks {
    fn discovery(&self) -> HookDiscovery {
        let hooks = HookSet::from([ResourceHook::BeforeUpdate]);
        HookDiscovery::new(hooks).with_database_values(hooks)
    }

    async fn before_update(&self, diff: EntityDiff, _pipeline: ResourcePipeline) -> Result<Vec<Resource>, HookError> {
        for (index, (_, stored)) in diff.pairs().enumerate() {
            let archived = stored
                .and_then(|s| s.attribute("description"))
                .and_then(|d| d.as_str())
                .map(|d| d.starts_with("[archived]"))
                .unwrap_or(false);
            let edits_description = diff
                .changed_attributes(index)
                .iter()
                .any(|change| change.attribute == "description");
            if archived && edits_description {
                return Err(HookError::rejected(
                    "todoItems",
                    ResourceHook::BeforeUpdate,
                    "archived todo items cannot be edited",
                ));
            }
        }
        Ok(diff.into_request_entities())
    }
}

/// Tag `0` is reserved and is never linked.
struct TagHooks;

#[async_trait]
impl ResourceHooks for TagHooks {
    fn discovery(&self) -> HookDiscovery {
        HookDiscovery::new([ResourceHook::BeforeUpdateRelationship])
    }

    async fn before_update_relationship(
        &self,
        ids: BTreeSet<String>,
        _affected: &AffectedRelationships,
        _pipeline: ResourcePipeline,
    ) -> Result<BTreeSet<String>, HookError> {
        Ok(ids.into_iter().filter(|id| id != "0").collect())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("jsonapi_sdk=info,example_consumer=info")),
        )
        .init();

    let graph_path = std::env::var("GRAPH_PATH").unwrap_or_else(|_| "example_consumer/config/graph.json".into());
    let graph = Arc::new(resolve(&load_from_path(&graph_path).await?)?);
    let options = JsonApiOptions::from_env();

    let repository: Arc<dyn ResourceRepository> = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            ensure_database_exists(&database_url).await?;
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(&database_url)
                .await?;
            ensure_tables(&pool, &graph).await?;
            Arc::new(PgRepository::new(pool, Arc::clone(&graph)))
        }
        Err(_) => {
            tracing::info!("DATABASE_URL not set, using in-memory storage");
            Arc::new(InMemoryRepository::new(Arc::clone(&graph)))
        }
    };

    let mut hooks = HookRegistry::with_options(&options);
    hooks.register("people", Arc::new(PeopleHooks));
    hooks.register("todoItems", Arc::new(TodoItemHooks));
    hooks.register("tags", Arc::new(TagHooks));

    let state = AppState::new(graph, Arc::new(hooks), repository, options);
    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    let port = listener.local_addr()?.port();
    tracing::info!("JSON:API demo listening on http://127.0.0.1:{}{}", port, state.options.namespace);
    axum::serve(listener, app(state)).await?;
    Ok(())
}
