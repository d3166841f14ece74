//! Resource hook contract. Every hook has a pass-through default; implement only what you need.

use crate::error::HookError;
use crate::hooks::{AffectedRelationships, EntityDiff, HookDiscovery, ResourcePipeline};
use crate::resource::Resource;
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Lifecycle hooks for one resource type.
///
/// Overriding a method is not enough for it to run: [`discovery`](Self::discovery) must list it.
/// The descriptor is read once when the handler is registered.
///
/// ```
/// use jsonapi_sdk::hooks::{HookDiscovery, ResourceHook, ResourceHooks, ResourcePipeline};
/// use jsonapi_sdk::{HookError, Resource};
///
/// struct LockedTodos;
///
/// #[async_trait::async_trait]
/// impl ResourceHooks for LockedTodos {
///     fn discovery(&self) -> HookDiscovery {
///         HookDiscovery::new([ResourceHook::BeforeDelete])
///     }
///
///     async fn before_delete(&self, _: Vec<Resource>, _: ResourcePipeline) -> Result<Vec<Resource>, HookError> {
///         Err(HookError::rejected("todoItems", ResourceHook::BeforeDelete, "todo items are locked"))
///     }
/// }
/// ```
#[async_trait]
pub trait ResourceHooks: Send + Sync {
    /// Which hooks this handler implements.
    fn discovery(&self) -> HookDiscovery;

    /// Returning fewer resources removes them from the write.
    async fn before_create(&self, resources: Vec<Resource>, _pipeline: ResourcePipeline) -> Result<Vec<Resource>, HookError> {
        Ok(resources)
    }

    async fn after_create(&self, _resources: &[Resource], _pipeline: ResourcePipeline) -> Result<(), HookError> {
        Ok(())
    }

    /// Returns the request resources to write; returning fewer removes them from the write.
    async fn before_update(&self, diff: EntityDiff, _pipeline: ResourcePipeline) -> Result<Vec<Resource>, HookError> {
        Ok(diff.into_request_entities())
    }

    async fn after_update(&self, _resources: &[Resource], _pipeline: ResourcePipeline) -> Result<(), HookError> {
        Ok(())
    }

    async fn before_delete(&self, resources: Vec<Resource>, _pipeline: ResourcePipeline) -> Result<Vec<Resource>, HookError> {
        Ok(resources)
    }

    /// `succeeded` is false when the storage layer reported nothing was deleted.
    async fn after_delete(&self, _resources: &[Resource], _pipeline: ResourcePipeline, _succeeded: bool) -> Result<(), HookError> {
        Ok(())
    }

    /// Resources of this type the client explicitly linked. Returns the ids allowed to stay linked.
    async fn before_update_relationship(
        &self,
        ids: BTreeSet<String>,
        _affected: &AffectedRelationships,
        _pipeline: ResourcePipeline,
    ) -> Result<BTreeSet<String>, HookError> {
        Ok(ids)
    }

    async fn after_update_relationship(&self, _affected: &AffectedRelationships, _pipeline: ResourcePipeline) -> Result<(), HookError> {
        Ok(())
    }

    /// Resources of this type whose relationships change as a side effect of the request.
    async fn before_implicit_update_relationship(
        &self,
        _affected: &AffectedRelationships,
        _pipeline: ResourcePipeline,
    ) -> Result<(), HookError> {
        Ok(())
    }

    async fn after_implicit_update_relationship(
        &self,
        _affected: &AffectedRelationships,
        _pipeline: ResourcePipeline,
    ) -> Result<(), HookError> {
        Ok(())
    }
}
