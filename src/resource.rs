//! Dynamic resource form shared by the serializer, hooks, and repositories.

use crate::config::{RelationshipKind, ResourceType};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Logical identity of a resource: type name plus server id (or local id for unsaved resources).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub type_name: String,
    pub id: String,
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.type_name, self.id)
    }
}

/// Value of one relationship. A key present in [`Resource::relationships`] means the relationship is targeted.
#[derive(Clone, Debug, PartialEq)]
pub enum RelationshipData {
    ToOne(Option<Box<Resource>>),
    ToMany(Vec<Resource>),
}

impl RelationshipData {
    pub fn empty_for(kind: RelationshipKind) -> Self {
        match kind {
            RelationshipKind::HasOne => RelationshipData::ToOne(None),
            RelationshipKind::HasMany | RelationshipKind::HasManyThrough => RelationshipData::ToMany(Vec::new()),
        }
    }

    pub fn resources(&self) -> Vec<&Resource> {
        match self {
            RelationshipData::ToOne(r) => r.iter().map(|b| &**b).collect(),
            RelationshipData::ToMany(v) => v.iter().collect(),
        }
    }

    pub fn resources_mut(&mut self) -> Vec<&mut Resource> {
        match self {
            RelationshipData::ToOne(r) => r.iter_mut().map(|b| &mut **b).collect(),
            RelationshipData::ToMany(v) => v.iter_mut().collect(),
        }
    }

    pub fn keys(&self) -> Vec<ResourceKey> {
        self.resources().into_iter().map(Resource::key).collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.resources().into_iter().filter_map(|r| r.id.clone()).collect()
    }

    /// Drop related resources for which `keep` returns false.
    pub fn retain(&mut self, mut keep: impl FnMut(&Resource) -> bool) {
        match self {
            RelationshipData::ToOne(r) => {
                if r.as_deref().map(|x| !keep(x)).unwrap_or(false) {
                    *r = None;
                }
            }
            RelationshipData::ToMany(v) => v.retain(|x| keep(x)),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resource {
    pub type_name: String,
    pub id: Option<String>,
    /// Client- or server-generated identity for resources that have no id yet.
    pub local_id: Option<String>,
    /// Attribute values keyed by property name. Only targeted attributes are present.
    pub attributes: Map<String, Value>,
    /// Relationship values keyed by property name. Only targeted relationships are present.
    pub relationships: BTreeMap<String, RelationshipData>,
}

impl Resource {
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Resource {
            type_name: type_name.into(),
            id: Some(id.into()),
            ..Default::default()
        }
    }

    /// A resource that does not exist yet; gets a generated local id.
    pub fn transient(type_name: impl Into<String>) -> Self {
        Resource {
            type_name: type_name.into(),
            local_id: Some(uuid::Uuid::new_v4().to_string()),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn with_to_one(mut self, relationship: &str, related: Option<Resource>) -> Self {
        self.relationships
            .insert(relationship.to_string(), RelationshipData::ToOne(related.map(Box::new)));
        self
    }

    pub fn with_to_many(mut self, relationship: &str, related: Vec<Resource>) -> Self {
        self.relationships
            .insert(relationship.to_string(), RelationshipData::ToMany(related));
        self
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey {
            type_name: self.type_name.clone(),
            id: self
                .id
                .clone()
                .or_else(|| self.local_id.clone())
                .unwrap_or_default(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn related(&self, relationship: &str) -> Option<&RelationshipData> {
        self.relationships.get(relationship)
    }

    /// Type and identity only, without attributes or relationships.
    pub fn identifier(&self) -> Resource {
        Resource {
            type_name: self.type_name.clone(),
            id: self.id.clone(),
            local_id: self.local_id.clone(),
            ..Default::default()
        }
    }

    /// True when any has_one relationship value of this resource is the resource itself.
    pub fn is_self_referencing(&self, resource_type: &ResourceType) -> bool {
        let key = self.key();
        resource_type
            .relationships
            .iter()
            .filter(|r| r.is_to_one() && r.right == self.type_name)
            .filter_map(|r| self.relationships.get(&r.property))
            .any(|data| data.keys().contains(&key))
    }

    /// Copy attributes and relationships from `other` that this resource does not carry yet.
    pub fn merge_missing(&mut self, other: &Resource) {
        for (k, v) in &other.attributes {
            self.attributes.entry(k.clone()).or_insert_with(|| v.clone());
        }
        for (k, v) in &other.relationships {
            self.relationships.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
}
