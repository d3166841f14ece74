//! ResourceService: validate, run before hooks, write through the repository, run after hooks.

use crate::config::{Relationship, ResourceGraph, ResourceType};
use crate::error::{AppError, HookError};
use crate::hooks::{HookRegistry, ResourceHook, ResourceHookExecutor, ResourcePipeline};
use crate::request::RequestContext;
use crate::resource::{RelationshipData, Resource};
use crate::service::RequestValidator;
use crate::store::ResourceRepository;
use std::sync::Arc;

/// Request pipeline for one declared graph. Cheap to clone; a fresh hook executor is built per call.
#[derive(Clone)]
pub struct ResourceService {
    graph: Arc<ResourceGraph>,
    hooks: Arc<HookRegistry>,
    repository: Arc<dyn ResourceRepository>,
}

impl ResourceService {
    pub fn new(graph: Arc<ResourceGraph>, hooks: Arc<HookRegistry>, repository: Arc<dyn ResourceRepository>) -> Self {
        ResourceService {
            graph,
            hooks,
            repository,
        }
    }

    pub fn graph(&self) -> &Arc<ResourceGraph> {
        &self.graph
    }

    pub fn repository(&self) -> &Arc<dyn ResourceRepository> {
        &self.repository
    }

    fn executor(&self) -> ResourceHookExecutor {
        ResourceHookExecutor::new(Arc::clone(&self.graph), Arc::clone(&self.hooks))
            .with_repository(Arc::clone(&self.repository))
    }

    fn resource_type(&self, type_name: &str) -> Result<Arc<ResourceType>, AppError> {
        self.graph
            .resource_context(type_name)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("resource type '{}'", type_name)))
    }

    /// Relationship by public name, falling back to the property name.
    fn relationship<'a>(&self, rt: &'a ResourceType, name: &str) -> Result<&'a Relationship, AppError> {
        rt.relationship_by_public_name(name)
            .or_else(|| rt.relationship(name))
            .ok_or_else(|| AppError::NotFound(format!("relationship '{}' on '{}'", name, rt.name)))
    }

    pub async fn list(&self, type_name: &str) -> Result<Vec<Resource>, AppError> {
        let rt = self.resource_type(type_name)?;
        self.repository.list(&rt).await
    }

    /// One resource with every relationship populated.
    pub async fn get(&self, type_name: &str, id: &str) -> Result<Resource, AppError> {
        let rt = self.resource_type(type_name)?;
        let include: Vec<&Relationship> = rt.relationships.iter().collect();
        self.repository
            .find_one(&rt, id, &include)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{}:{}", type_name, id)))
    }

    pub async fn create(&self, resource: Resource) -> Result<Resource, AppError> {
        let rt = self.resource_type(&resource.type_name)?;
        let request = RequestContext::primary(rt.name.as_str(), resource.id.clone());
        RequestValidator::validate_resources(std::slice::from_ref(&resource), &self.graph, &request)?;

        let mut executor = self.executor();
        let pipeline = ResourcePipeline::Post;
        let resource = single(executor.before_create(vec![resource], pipeline).await?, &rt, ResourceHook::BeforeCreate)?;
        let mut created = self.repository.create(&rt, &resource).await?;
        created.merge_missing(&resource);
        executor.after_create(std::slice::from_ref(&created), pipeline).await?;
        tracing::debug!(resource_type = %rt.name, id = ?created.id, "created resource");
        Ok(created)
    }

    /// PATCH semantics: only targeted fields are written, absent attributes are not held to required checks.
    pub async fn update(&self, type_name: &str, id: &str, mut resource: Resource) -> Result<Resource, AppError> {
        let rt = self.resource_type(type_name)?;
        if resource.type_name != rt.name {
            return Err(AppError::Conflict(format!(
                "resource type '{}' does not match endpoint type '{}'",
                resource.type_name, rt.name
            )));
        }
        match &resource.id {
            Some(body_id) if body_id != id => {
                return Err(AppError::Conflict(format!(
                    "resource id '{}' does not match endpoint id '{}'",
                    body_id, id
                )))
            }
            _ => resource.id = Some(id.to_string()),
        }
        let mut request = RequestContext::primary(rt.name.as_str(), Some(id.to_string()));
        for attribute in &rt.attributes {
            if !resource.attributes.contains_key(&attribute.property) {
                request.disable_required_validator(&attribute.property, &rt.name);
            }
        }
        RequestValidator::validate_resources(std::slice::from_ref(&resource), &self.graph, &request)?;

        let mut executor = self.executor();
        let pipeline = ResourcePipeline::Patch;
        let resource = single(executor.before_update(vec![resource], pipeline).await?, &rt, ResourceHook::BeforeUpdate)?;
        let mut updated = self
            .repository
            .update(&rt, &resource)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{}:{}", type_name, id)))?;
        updated.merge_missing(&resource);
        executor.after_update(std::slice::from_ref(&updated), pipeline).await?;
        Ok(updated)
    }

    /// Runs `AfterDelete` even when nothing was deleted (with `succeeded = false`), then reports not found.
    pub async fn delete(&self, type_name: &str, id: &str) -> Result<(), AppError> {
        let rt = self.resource_type(type_name)?;
        let mut executor = self.executor();
        let pipeline = ResourcePipeline::Delete;
        let resource = single(
            executor.before_delete(vec![Resource::new(rt.name.as_str(), id)], pipeline).await?,
            &rt,
            ResourceHook::BeforeDelete,
        )?;
        let id = resource.id.clone().unwrap_or_else(|| id.to_string());
        let succeeded = self.repository.delete(&rt, &id).await?;
        executor
            .after_delete(std::slice::from_ref(&resource), pipeline, succeeded)
            .await?;
        if succeeded {
            tracing::debug!(resource_type = %rt.name, id = %id, "deleted resource");
            Ok(())
        } else {
            Err(AppError::NotFound(format!("{}:{}", type_name, id)))
        }
    }

    pub async fn get_relationship(&self, type_name: &str, id: &str, relationship: &str) -> Result<RelationshipData, AppError> {
        let rt = self.resource_type(type_name)?;
        let rel = self.relationship(&rt, relationship)?;
        let mut found = self
            .repository
            .find_one(&rt, id, &[rel])
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{}:{}", type_name, id)))?;
        Ok(found
            .relationships
            .remove(&rel.property)
            .unwrap_or_else(|| RelationshipData::empty_for(rel.kind)))
    }

    /// Replace one relationship. Runs the update hooks for the `PatchRelationship` pipeline, so a
    /// relationship hook may veto part of the new value before it is written.
    pub async fn update_relationship(
        &self,
        type_name: &str,
        id: &str,
        relationship: &str,
        data: RelationshipData,
    ) -> Result<RelationshipData, AppError> {
        let rt = self.resource_type(type_name)?;
        let rel = self.relationship(&rt, relationship)?.clone();
        if rel.is_to_one() != matches!(data, RelationshipData::ToOne(_)) {
            return Err(AppError::BadRequest(format!(
                "relationship '{}' expects {} data",
                rel.public_name,
                if rel.is_to_one() { "to-one" } else { "to-many" }
            )));
        }
        let resource = Resource {
            relationships: [(rel.property.clone(), data)].into_iter().collect(),
            ..Resource::new(rt.name.as_str(), id)
        };

        let mut executor = self.executor();
        let pipeline = ResourcePipeline::PatchRelationship;
        let mut resource = single(executor.before_update(vec![resource], pipeline).await?, &rt, ResourceHook::BeforeUpdate)?;
        let data = resource
            .relationships
            .remove(&rel.property)
            .unwrap_or_else(|| RelationshipData::empty_for(rel.kind));
        if !self.repository.replace_relationship(&rt, id, &rel, &data).await? {
            return Err(AppError::NotFound(format!("{}:{}", type_name, id)));
        }
        resource.relationships.insert(rel.property.clone(), data.clone());
        executor.after_update(std::slice::from_ref(&resource), pipeline).await?;
        Ok(data)
    }
}

/// The one primary resource a before hook kept. A hook that filters it out rejects the request.
fn single(mut kept: Vec<Resource>, rt: &ResourceType, hook: ResourceHook) -> Result<Resource, AppError> {
    match kept.pop() {
        Some(resource) if kept.is_empty() => Ok(resource),
        Some(_) => Err(HookError::GraphConsistency(format!("{} returned more than one '{}' resource", hook, rt.name)).into()),
        None => Err(HookError::rejected(&rt.name, hook, "resource was filtered out").into()),
    }
}
