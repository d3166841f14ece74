//! Data-access layer: the repository contract the hook executor and request pipeline load and write through.

mod memory;
mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::{ensure_database_exists, PgRepository};

use crate::config::{Relationship, ResourceType};
use crate::error::AppError;
use crate::resource::{RelationshipData, Resource};
use async_trait::async_trait;

/// Storage for resources of every declared type.
///
/// Loaded resources carry all attributes. Relationships listed in `include` are populated with the full
/// related resources (attributes only); others are absent.
#[async_trait]
pub trait ResourceRepository: Send + Sync {
    /// Resources with the given ids, in `ids` order. Unknown ids are skipped.
    async fn find_by_ids(
        &self,
        resource_type: &ResourceType,
        ids: &[String],
        include: &[&Relationship],
    ) -> Result<Vec<Resource>, AppError>;

    /// Resources of `relationship.left` whose `relationship` points at any of `target_ids`,
    /// with that relationship populated.
    async fn find_referencing(&self, relationship: &Relationship, target_ids: &[String]) -> Result<Vec<Resource>, AppError>;

    async fn list(&self, resource_type: &ResourceType) -> Result<Vec<Resource>, AppError>;

    async fn find_one(
        &self,
        resource_type: &ResourceType,
        id: &str,
        include: &[&Relationship],
    ) -> Result<Option<Resource>, AppError> {
        let found = self.find_by_ids(resource_type, &[id.to_string()], include).await?;
        Ok(found.into_iter().next())
    }

    /// Insert attributes and targeted relationships. Generates an id when the resource has none.
    async fn create(&self, resource_type: &ResourceType, resource: &Resource) -> Result<Resource, AppError>;

    /// Write targeted attributes and relationships. `None` when the resource does not exist.
    async fn update(&self, resource_type: &ResourceType, resource: &Resource) -> Result<Option<Resource>, AppError>;

    /// False when nothing was deleted.
    async fn delete(&self, resource_type: &ResourceType, id: &str) -> Result<bool, AppError>;

    /// Replace the full value of one relationship. False when the owning resource does not exist.
    async fn replace_relationship(
        &self,
        resource_type: &ResourceType,
        id: &str,
        relationship: &Relationship,
        data: &RelationshipData,
    ) -> Result<bool, AppError>;

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}
