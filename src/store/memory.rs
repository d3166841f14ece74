//! In-memory repository. Links are stored the way a relational schema stores them (foreign-key
//! columns and join rows), so relationship side effects match the Postgres repository.

use super::ResourceRepository;
use crate::config::{ForeignKey, IdType, Relationship, RelationshipKind, ResourceGraph, ResourceType};
use crate::error::AppError;
use crate::resource::{RelationshipData, Resource};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Debug, Default)]
struct Row {
    id: String,
    attributes: Map<String, Value>,
    /// Foreign-key columns stored on this row.
    keys: HashMap<String, Option<String>>,
}

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<String, Vec<Row>>,
    /// Join table name -> rows (column -> id).
    joins: HashMap<String, Vec<HashMap<String, String>>>,
    sequences: HashMap<String, u64>,
}

impl Tables {
    fn row(&self, type_name: &str, id: &str) -> Option<&Row> {
        self.rows.get(type_name)?.iter().find(|r| r.id == id)
    }

    fn row_mut(&mut self, type_name: &str, id: &str) -> Option<&mut Row> {
        self.rows.get_mut(type_name)?.iter_mut().find(|r| r.id == id)
    }

    fn exists(&self, type_name: &str, id: &str) -> bool {
        self.row(type_name, id).is_some()
    }

    fn next_id(&mut self, resource_type: &ResourceType) -> String {
        match resource_type.id_type {
            IdType::Int => {
                let seq = self.sequences.entry(resource_type.name.clone()).or_insert(0);
                *seq += 1;
                seq.to_string()
            }
            IdType::Uuid | IdType::Text => uuid::Uuid::new_v4().to_string(),
        }
    }

    fn bump_sequence(&mut self, type_name: &str, id: &str) {
        if let Ok(n) = id.parse::<u64>() {
            let seq = self.sequences.entry(type_name.to_string()).or_insert(0);
            if n > *seq {
                *seq = n;
            }
        }
    }

    fn related_ids(&self, rel: &Relationship, id: &str) -> Vec<String> {
        match &rel.foreign_key {
            ForeignKey::Local(col) => self
                .row(&rel.left, id)
                .and_then(|r| r.keys.get(col).cloned().flatten())
                .into_iter()
                .collect(),
            ForeignKey::Remote(col) => self
                .rows
                .get(&rel.right)
                .map(|rows| {
                    rows.iter()
                        .filter(|r| r.keys.get(col).and_then(|v| v.as_deref()) == Some(id))
                        .map(|r| r.id.clone())
                        .collect()
                })
                .unwrap_or_default(),
            ForeignKey::Join {
                table,
                left_column,
                right_column,
            } => self
                .joins
                .get(table)
                .map(|rows| {
                    rows.iter()
                        .filter(|r| r.get(left_column).map(String::as_str) == Some(id))
                        .filter_map(|r| r.get(right_column).cloned())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    fn check_targets(&self, rel: &Relationship, data: &RelationshipData) -> Result<(), AppError> {
        match data.ids().into_iter().find(|t| !self.exists(&rel.right, t)) {
            Some(missing) => Err(AppError::NotFound(format!("{}:{}", rel.right, missing))),
            None => Ok(()),
        }
    }

    /// Replace the full value of `rel` for the row `id`. Targets must have been checked.
    fn write_relationship(&mut self, rel: &Relationship, id: &str, data: &RelationshipData) {
        let targets = data.ids();
        match &rel.foreign_key {
            ForeignKey::Local(col) => {
                if let Some(row) = self.row_mut(&rel.left, id) {
                    row.keys.insert(col.clone(), targets.into_iter().next());
                }
            }
            ForeignKey::Remote(col) => {
                if let Some(rows) = self.rows.get_mut(&rel.right) {
                    for row in rows.iter_mut() {
                        if targets.contains(&row.id) {
                            row.keys.insert(col.clone(), Some(id.to_string()));
                        } else if row.keys.get(col).and_then(|v| v.as_deref()) == Some(id) {
                            row.keys.insert(col.clone(), None);
                        }
                    }
                }
            }
            ForeignKey::Join {
                table,
                left_column,
                right_column,
            } => {
                let rows = self.joins.entry(table.clone()).or_default();
                rows.retain(|r| r.get(left_column).map(String::as_str) != Some(id));
                rows.extend(targets.into_iter().map(|t| {
                    HashMap::from([(left_column.clone(), id.to_string()), (right_column.clone(), t)])
                }));
            }
        }
    }

    fn read_shallow(&self, type_name: &str, id: &str) -> Option<Resource> {
        let row = self.row(type_name, id)?;
        let mut resource = Resource::new(type_name, row.id.clone());
        resource.attributes = row.attributes.clone();
        Some(resource)
    }

    fn read(&self, resource_type: &ResourceType, id: &str, include: &[&Relationship]) -> Option<Resource> {
        let mut resource = self.read_shallow(&resource_type.name, id)?;
        for rel in include {
            let related: Vec<Resource> = self
                .related_ids(rel, id)
                .iter()
                .filter_map(|rid| self.read_shallow(&rel.right, rid))
                .collect();
            let data = match rel.kind {
                RelationshipKind::HasOne => RelationshipData::ToOne(related.into_iter().next().map(Box::new)),
                RelationshipKind::HasMany | RelationshipKind::HasManyThrough => RelationshipData::ToMany(related),
            };
            resource.relationships.insert(rel.property.clone(), data);
        }
        Some(resource)
    }

    /// Null out or remove every stored link that points at the deleted row.
    fn unlink(&mut self, graph: &ResourceGraph, type_name: &str, id: &str) {
        for resource_type in &graph.resources {
            for rel in &resource_type.relationships {
                match &rel.foreign_key {
                    ForeignKey::Local(col) if rel.right == type_name => {
                        clear_key(self.rows.get_mut(&rel.left), col, id);
                    }
                    ForeignKey::Remote(col) if rel.left == type_name => {
                        clear_key(self.rows.get_mut(&rel.right), col, id);
                    }
                    ForeignKey::Join {
                        table,
                        left_column,
                        right_column,
                    } if rel.left == type_name || rel.right == type_name => {
                        let column = if rel.left == type_name { left_column } else { right_column };
                        if let Some(rows) = self.joins.get_mut(table) {
                            rows.retain(|r| r.get(column).map(String::as_str) != Some(id));
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

fn clear_key(rows: Option<&mut Vec<Row>>, col: &str, id: &str) {
    for row in rows.into_iter().flatten() {
        if row.keys.get(col).and_then(|v| v.as_deref()) == Some(id) {
            row.keys.insert(col.to_string(), None);
        }
    }
}

fn declared_attributes(resource_type: &ResourceType, resource: &Resource) -> Map<String, Value> {
    resource
        .attributes
        .iter()
        .filter(|(name, _)| resource_type.attribute(name).is_some())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn relationship_of<'a>(resource_type: &'a ResourceType, property: &str) -> Result<&'a Relationship, AppError> {
    resource_type
        .relationship(property)
        .ok_or_else(|| AppError::BadRequest(format!("'{}' has no relationship '{}'", resource_type.name, property)))
}

/// Repository holding every resource in process memory.
pub struct InMemoryRepository {
    graph: Arc<ResourceGraph>,
    tables: RwLock<Tables>,
}

impl InMemoryRepository {
    pub fn new(graph: Arc<ResourceGraph>) -> Self {
        InMemoryRepository {
            graph,
            tables: RwLock::new(Tables::default()),
        }
    }

    /// Create a resource, resolving its type from the graph.
    pub async fn insert(&self, resource: Resource) -> Result<Resource, AppError> {
        let resource_type = Arc::clone(self.graph.require(&resource.type_name)?);
        self.create(&resource_type, &resource).await
    }
}

#[async_trait]
impl ResourceRepository for InMemoryRepository {
    async fn find_by_ids(
        &self,
        resource_type: &ResourceType,
        ids: &[String],
        include: &[&Relationship],
    ) -> Result<Vec<Resource>, AppError> {
        let tables = self.tables.read().await;
        Ok(ids.iter().filter_map(|id| tables.read(resource_type, id, include)).collect())
    }

    async fn find_referencing(&self, relationship: &Relationship, target_ids: &[String]) -> Result<Vec<Resource>, AppError> {
        let owner = Arc::clone(self.graph.require(&relationship.left)?);
        let tables = self.tables.read().await;
        let candidates: Vec<String> = tables
            .rows
            .get(&owner.name)
            .map(|rows| rows.iter().map(|r| r.id.clone()).collect())
            .unwrap_or_default();
        Ok(candidates
            .iter()
            .filter(|id| {
                tables
                    .related_ids(relationship, id)
                    .iter()
                    .any(|rid| target_ids.contains(rid))
            })
            .filter_map(|id| tables.read(&owner, id, &[relationship]))
            .collect())
    }

    async fn list(&self, resource_type: &ResourceType) -> Result<Vec<Resource>, AppError> {
        let tables = self.tables.read().await;
        let ids: Vec<String> = tables
            .rows
            .get(&resource_type.name)
            .map(|rows| rows.iter().map(|r| r.id.clone()).collect())
            .unwrap_or_default();
        Ok(ids.iter().filter_map(|id| tables.read(resource_type, id, &[])).collect())
    }

    async fn create(&self, resource_type: &ResourceType, resource: &Resource) -> Result<Resource, AppError> {
        let mut tables = self.tables.write().await;
        for (property, data) in &resource.relationships {
            tables.check_targets(relationship_of(resource_type, property)?, data)?;
        }
        let id = match &resource.id {
            Some(id) => {
                if tables.exists(&resource_type.name, id) {
                    return Err(AppError::Conflict(format!("{}:{} already exists", resource_type.name, id)));
                }
                tables.bump_sequence(&resource_type.name, id);
                id.clone()
            }
            None => tables.next_id(resource_type),
        };
        let keys = resource_type
            .relationships
            .iter()
            .filter_map(|rel| match &rel.foreign_key {
                ForeignKey::Local(col) => Some((col.clone(), None)),
                _ => None,
            })
            .collect();
        tables.rows.entry(resource_type.name.clone()).or_default().push(Row {
            id: id.clone(),
            attributes: declared_attributes(resource_type, resource),
            keys,
        });
        for (property, data) in &resource.relationships {
            tables.write_relationship(relationship_of(resource_type, property)?, &id, data);
        }
        tracing::debug!(resource_type = %resource_type.name, id = %id, "created in memory");
        tables
            .read(resource_type, &id, &[])
            .ok_or_else(|| AppError::NotFound(format!("{}:{}", resource_type.name, id)))
    }

    async fn update(&self, resource_type: &ResourceType, resource: &Resource) -> Result<Option<Resource>, AppError> {
        let id = resource
            .id
            .clone()
            .ok_or_else(|| AppError::BadRequest("update requires an id".into()))?;
        let mut tables = self.tables.write().await;
        if !tables.exists(&resource_type.name, &id) {
            return Ok(None);
        }
        for (property, data) in &resource.relationships {
            tables.check_targets(relationship_of(resource_type, property)?, data)?;
        }
        let attributes = declared_attributes(resource_type, resource);
        if let Some(row) = tables.row_mut(&resource_type.name, &id) {
            row.attributes.extend(attributes);
        }
        for (property, data) in &resource.relationships {
            tables.write_relationship(relationship_of(resource_type, property)?, &id, data);
        }
        Ok(tables.read(resource_type, &id, &[]))
    }

    async fn delete(&self, resource_type: &ResourceType, id: &str) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        let Some(rows) = tables.rows.get_mut(&resource_type.name) else {
            return Ok(false);
        };
        let before = rows.len();
        rows.retain(|r| r.id != id);
        if rows.len() == before {
            return Ok(false);
        }
        tables.unlink(&self.graph, &resource_type.name, id);
        Ok(true)
    }

    async fn replace_relationship(
        &self,
        resource_type: &ResourceType,
        id: &str,
        relationship: &Relationship,
        data: &RelationshipData,
    ) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        if !tables.exists(&resource_type.name, id) {
            return Ok(false);
        }
        tables.check_targets(relationship, data)?;
        tables.write_relationship(relationship, id, data);
        Ok(true)
    }
}
