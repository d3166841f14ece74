//! Affected-relationships index: relationship -> affected resources of one type and what reached them.

use crate::config::{Relationship, ResourceType};
use crate::error::HookError;
use crate::resource::{Resource, ResourceKey};
use std::collections::BTreeSet;
use std::sync::Arc;

/// One affected resource and the resources on the other side of the relationship that caused the effect.
#[derive(Clone, Debug, PartialEq)]
pub struct AffectedEntry {
    pub resource: Resource,
    pub triggered_by: Vec<Resource>,
}

/// Resources of one type affected through its relationships.
///
/// Every key is a relationship declared on that type; the relationship's target is the type on the
/// other side of the change.
#[derive(Clone, Debug)]
pub struct AffectedRelationships {
    resource_type: Arc<ResourceType>,
    entries: Vec<(Relationship, Vec<AffectedEntry>)>,
}

impl AffectedRelationships {
    pub fn new(resource_type: Arc<ResourceType>) -> Self {
        AffectedRelationships {
            resource_type,
            entries: Vec::new(),
        }
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type.name
    }

    /// Record `resource` as affected through `relationship`, reached from `trigger`.
    /// Repeated adds for the same resource merge their triggers.
    pub fn add(&mut self, relationship: &Relationship, resource: Resource, trigger: Option<Resource>) -> Result<(), HookError> {
        if relationship.left != self.resource_type.name || self.resource_type.relationship(&relationship.property).is_none() {
            return Err(HookError::GraphConsistency(format!(
                "relationship {}.{} is not declared on '{}'",
                relationship.left, relationship.property, self.resource_type.name
            )));
        }
        let idx = match self.entries.iter().position(|(r, _)| r == relationship) {
            Some(i) => i,
            None => {
                self.entries.push((relationship.clone(), Vec::new()));
                self.entries.len() - 1
            }
        };
        let list = &mut self.entries[idx].1;
        let key = resource.key();
        let entry = match list.iter().position(|e| e.resource.key() == key) {
            Some(i) => &mut list[i],
            None => {
                list.push(AffectedEntry {
                    resource,
                    triggered_by: Vec::new(),
                });
                let last = list.len() - 1;
                &mut list[last]
            }
        };
        if let Some(trigger) = trigger {
            let tkey = trigger.key();
            if !entry.triggered_by.iter().any(|t| t.key() == tkey) {
                entry.triggered_by.push(trigger);
            }
        }
        Ok(())
    }

    /// Entries whose relationship targets `related_type`.
    ///
    /// Errors when the owning type declares no relationship to `related_type` at all.
    pub fn get_by_relationship(&self, related_type: &str) -> Result<Vec<(&Relationship, &[AffectedEntry])>, HookError> {
        if self.resource_type.relationships_to(related_type).next().is_none() {
            return Err(HookError::GraphConsistency(format!(
                "'{}' has no relationship to '{}'",
                self.resource_type.name, related_type
            )));
        }
        Ok(self
            .entries
            .iter()
            .filter(|(r, _)| r.right == related_type)
            .map(|(r, list)| (r, list.as_slice()))
            .collect())
    }

    /// Entries for one relationship property.
    pub fn get(&self, property: &str) -> Option<&[AffectedEntry]> {
        self.entries
            .iter()
            .find(|(r, _)| r.property == property)
            .map(|(_, list)| list.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Relationship, &[AffectedEntry])> {
        self.entries.iter().map(|(r, list)| (r, list.as_slice()))
    }

    /// Every affected resource once, in first-seen order.
    pub fn resources(&self) -> Vec<&Resource> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for (_, list) in &self.entries {
            for e in list {
                if seen.insert(e.resource.key()) {
                    out.push(&e.resource);
                }
            }
        }
        out
    }

    pub fn keys(&self) -> BTreeSet<ResourceKey> {
        self.resources().into_iter().map(Resource::key).collect()
    }

    pub fn ids(&self) -> BTreeSet<String> {
        self.resources().into_iter().filter_map(|r| r.id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|(_, list)| list.is_empty())
    }

    /// Fold `other` (same type) into this index.
    pub fn merge(&mut self, other: AffectedRelationships) -> Result<(), HookError> {
        for (rel, list) in other.entries {
            for entry in list {
                if entry.triggered_by.is_empty() {
                    self.add(&rel, entry.resource, None)?;
                    continue;
                }
                for trigger in entry.triggered_by {
                    self.add(&rel, entry.resource.clone(), Some(trigger))?;
                }
            }
        }
        Ok(())
    }

    /// Drop affected resources for which `keep` returns false.
    pub fn retain(&mut self, mut keep: impl FnMut(&Resource) -> bool) {
        for (_, list) in &mut self.entries {
            list.retain(|e| keep(&e.resource));
        }
        self.entries.retain(|(_, list)| !list.is_empty());
    }

    /// Swap each affected resource for its stored counterpart when `lookup` has one.
    pub fn replace_resources(&mut self, mut lookup: impl FnMut(&ResourceKey) -> Option<Resource>) {
        for (_, list) in &mut self.entries {
            for e in list.iter_mut() {
                if let Some(stored) = lookup(&e.resource.key()) {
                    e.resource = stored;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ForeignKey, IdType, RelationshipKind};
    use std::collections::HashMap;

    fn person_type() -> Arc<ResourceType> {
        Arc::new(ResourceType {
            name: "people".into(),
            schema_name: "public".into(),
            table_name: "people".into(),
            id_column: "id".into(),
            id_type: IdType::Int,
            attributes: Vec::new(),
            relationships: vec![Relationship {
                property: "one_to_one_todo_item".into(),
                public_name: "one-to-one-todo-item".into(),
                kind: RelationshipKind::HasOne,
                left: "people".into(),
                right: "todoItems".into(),
                foreign_key: ForeignKey::Remote("to_one_person_id".into()),
                inverse: Some("to_one_person".into()),
            }],
            validation: HashMap::new(),
        })
    }

    #[test]
    fn add_merges_triggers_per_resource() {
        let rt = person_type();
        let rel = rt.relationships[0].clone();
        let mut affected = AffectedRelationships::new(rt);
        affected
            .add(&rel, Resource::new("people", "1"), Some(Resource::new("todoItems", "10")))
            .unwrap();
        affected
            .add(&rel, Resource::new("people", "1"), Some(Resource::new("todoItems", "11")))
            .unwrap();
        affected
            .add(&rel, Resource::new("people", "1"), Some(Resource::new("todoItems", "11")))
            .unwrap();
        let entries = affected.get("one_to_one_todo_item").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].triggered_by.len(), 2);
    }

    #[test]
    fn get_by_relationship_filters_by_target() {
        let rt = person_type();
        let rel = rt.relationships[0].clone();
        let mut affected = AffectedRelationships::new(rt);
        affected.add(&rel, Resource::new("people", "1"), None).unwrap();
        let found = affected.get_by_relationship("todoItems").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1[0].resource.id.as_deref(), Some("1"));
    }

    #[test]
    fn get_by_unknown_related_type_is_graph_error() {
        let affected = AffectedRelationships::new(person_type());
        assert!(matches!(
            affected.get_by_relationship("tags"),
            Err(HookError::GraphConsistency(_))
        ));
    }

    #[test]
    fn foreign_relationship_key_is_rejected() {
        let rt = person_type();
        let mut foreign = rt.relationships[0].clone();
        foreign.left = "todoItems".into();
        let mut affected = AffectedRelationships::new(rt);
        assert!(affected.add(&foreign, Resource::new("people", "1"), None).is_err());
    }

    #[test]
    fn retain_drops_empty_relationships() {
        let rt = person_type();
        let rel = rt.relationships[0].clone();
        let mut affected = AffectedRelationships::new(rt);
        affected.add(&rel, Resource::new("people", "1"), None).unwrap();
        affected.retain(|r| r.id.as_deref() != Some("1"));
        assert!(affected.is_empty());
        assert!(affected.get("one_to_one_todo_item").is_none());
    }
}
