//! Resolved resource graph: config validated and flattened for runtime use.

use crate::config::ValidationRule;
use crate::error::HookError;
use crate::naming::NamingConvention;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Id type for parsing path/body ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdType {
    Uuid,
    Int,
    Text,
}

#[derive(Clone, Debug)]
pub struct Attribute {
    pub property: String,
    pub public_name: String,
    pub column: String,
    pub pg_type: Option<String>,
    pub nullable: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationshipKind {
    HasOne,
    HasMany,
    HasManyThrough,
}

/// Where the link between two resources is stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ForeignKey {
    /// Column on the declaring resource's table.
    Local(String),
    /// Column on the target resource's table.
    Remote(String),
    Join {
        table: String,
        left_column: String,
        right_column: String,
    },
}

/// Identity of a relationship: declaring type plus property name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationshipKey {
    pub left: String,
    pub property: String,
}

/// Directional edge from `left` (declaring type) to `right` (target type).
#[derive(Clone, Debug)]
pub struct Relationship {
    pub property: String,
    pub public_name: String,
    pub kind: RelationshipKind,
    pub left: String,
    pub right: String,
    pub foreign_key: ForeignKey,
    /// Property name of the navigation on `right` that points back at `left`.
    pub inverse: Option<String>,
}

impl Relationship {
    pub fn key(&self) -> RelationshipKey {
        RelationshipKey {
            left: self.left.clone(),
            property: self.property.clone(),
        }
    }

    pub fn is_to_one(&self) -> bool {
        self.kind == RelationshipKind::HasOne
    }
}

impl PartialEq for Relationship {
    fn eq(&self, other: &Self) -> bool {
        self.left == other.left && self.property == other.property
    }
}

impl Eq for Relationship {}

impl Hash for Relationship {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.left.hash(state);
        self.property.hash(state);
    }
}

#[derive(Clone, Debug)]
pub struct ResourceType {
    /// JSON:API type name.
    pub name: String,
    pub schema_name: String,
    pub table_name: String,
    pub id_column: String,
    pub id_type: IdType,
    pub attributes: Vec<Attribute>,
    pub relationships: Vec<Relationship>,
    pub validation: HashMap<String, ValidationRule>,
}

impl ResourceType {
    pub fn attribute(&self, property: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.property == property)
    }

    pub fn attribute_by_public_name(&self, public_name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.public_name == public_name)
    }

    pub fn relationship(&self, property: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.property == property)
    }

    pub fn relationship_by_public_name(&self, public_name: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.public_name == public_name)
    }

    /// Relationships of this type whose target is `right`.
    pub fn relationships_to<'a>(&'a self, right: &'a str) -> impl Iterator<Item = &'a Relationship> + 'a {
        self.relationships.iter().filter(move |r| r.right == right)
    }
}

/// Immutable metadata for every declared resource. Shared read-only via `Arc`.
#[derive(Clone, Debug)]
pub struct ResourceGraph {
    pub naming: NamingConvention,
    pub resources: Vec<Arc<ResourceType>>,
    pub by_name: HashMap<String, Arc<ResourceType>>,
}

impl ResourceGraph {
    pub fn new(naming: NamingConvention, resources: Vec<ResourceType>) -> Self {
        let resources: Vec<Arc<ResourceType>> = resources.into_iter().map(Arc::new).collect();
        let by_name = resources.iter().map(|r| (r.name.clone(), Arc::clone(r))).collect();
        ResourceGraph {
            naming,
            resources,
            by_name,
        }
    }

    pub fn resource_context(&self, name: &str) -> Option<&Arc<ResourceType>> {
        self.by_name.get(name)
    }

    /// Like [`resource_context`](Self::resource_context) but unknown types are a graph consistency error.
    pub fn require(&self, name: &str) -> Result<&Arc<ResourceType>, HookError> {
        self.by_name
            .get(name)
            .ok_or_else(|| HookError::GraphConsistency(format!("unknown resource type '{}'", name)))
    }

    pub fn attributes(&self, name: &str) -> &[Attribute] {
        self.by_name.get(name).map(|r| r.attributes.as_slice()).unwrap_or(&[])
    }

    pub fn relationships(&self, name: &str) -> &[Relationship] {
        self.by_name.get(name).map(|r| r.relationships.as_slice()).unwrap_or(&[])
    }

    pub fn relationship(&self, key: &RelationshipKey) -> Option<&Relationship> {
        self.by_name.get(&key.left)?.relationship(&key.property)
    }

    /// The navigation on `rel.right` that points back at `rel.left`, if declared.
    pub fn inverse_of(&self, rel: &Relationship) -> Option<&Relationship> {
        let inverse = rel.inverse.as_deref()?;
        self.by_name.get(&rel.right)?.relationship(inverse)
    }

    /// Every relationship in the graph whose target is `right`.
    pub fn relationships_targeting<'a>(&'a self, right: &'a str) -> impl Iterator<Item = &'a Relationship> + 'a {
        self.resources
            .iter()
            .flat_map(|r| r.relationships.iter())
            .filter(move |rel| rel.right == right)
    }
}
