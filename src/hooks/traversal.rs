//! Relationship diff engine: walks the request graph, loads stored state on demand, and classifies
//! related resources as explicitly or implicitly affected.

use crate::config::{Relationship, ResourceGraph};
use crate::error::HookError;
use crate::hooks::{AffectedRelationships, ResourcePipeline};
use crate::resource::{Resource, ResourceKey};
use crate::store::ResourceRepository;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// Copy of `r` without its relationships.
pub(crate) fn shallow(r: &Resource) -> Resource {
    Resource {
        relationships: BTreeMap::new(),
        ..r.clone()
    }
}

/// First occurrence of each identity, in input order.
pub(crate) fn unique(resources: &[Resource]) -> Vec<Resource> {
    let mut seen = HashSet::new();
    resources
        .iter()
        .filter(|r| seen.insert(r.key()))
        .cloned()
        .collect()
}

/// One parent -> child edge present in the request payload.
pub(crate) struct Link<'a> {
    pub relationship: &'a Relationship,
    pub parent: &'a Resource,
    pub child: &'a Resource,
}

/// Flattened request payload: every distinct resource (roots first) and every edge between them.
pub(crate) struct RequestTree<'a> {
    pub entities: Vec<(&'a Resource, bool)>,
    pub links: Vec<Link<'a>>,
}

impl<'a> RequestTree<'a> {
    /// Depth-first over targeted relationships, visiting each identity once.
    pub fn build(graph: &'a ResourceGraph, roots: &'a [Resource]) -> Result<Self, HookError> {
        let mut visited: HashSet<ResourceKey> = roots.iter().map(Resource::key).collect();
        let mut entities: Vec<(&'a Resource, bool)> = roots.iter().map(|r| (r, true)).collect();
        let mut links = Vec::new();
        let mut stack: Vec<&'a Resource> = roots.iter().rev().collect();

        while let Some(parent) = stack.pop() {
            let parent_type = graph.require(&parent.type_name)?;
            for (property, data) in &parent.relationships {
                let relationship = parent_type.relationship(property).ok_or_else(|| {
                    HookError::GraphConsistency(format!(
                        "'{}' has no relationship '{}'",
                        parent.type_name, property
                    ))
                })?;
                for child in data.resources() {
                    if child.type_name != relationship.right {
                        return Err(HookError::GraphConsistency(format!(
                            "{}.{} expects '{}', got '{}'",
                            relationship.left, relationship.property, relationship.right, child.type_name
                        )));
                    }
                    links.push(Link {
                        relationship,
                        parent,
                        child,
                    });
                    if visited.insert(child.key()) {
                        entities.push((child, false));
                        stack.push(child);
                    }
                }
            }
        }
        Ok(RequestTree { entities, links })
    }

    /// Entities whose stored relationships can be compared with the request.
    pub fn existing_parents(&self, pipeline: ResourcePipeline) -> impl Iterator<Item = &'a Resource> + '_ {
        self.entities
            .iter()
            .filter(move |(r, is_root)| r.id.is_some() && !(*is_root && !pipeline.targets_existing()))
            .map(|(r, _)| *r)
    }
}

/// Stored state loaded for one pass, keyed by identity.
#[derive(Debug, Default)]
pub(crate) struct DbSnapshot {
    by_key: HashMap<ResourceKey, Resource>,
}

impl DbSnapshot {
    pub fn get(&self, key: &ResourceKey) -> Option<&Resource> {
        self.by_key.get(key)
    }

    pub fn insert(&mut self, resource: Resource) {
        for data in resource.relationships.values() {
            for related in data.resources() {
                self.merge(shallow(related));
            }
        }
        self.merge(resource);
    }

    fn merge(&mut self, resource: Resource) {
        match self.by_key.get_mut(&resource.key()) {
            Some(existing) => existing.merge_missing(&resource),
            None => {
                self.by_key.insert(resource.key(), resource);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }
}

/// Ids and includes to load, per resource type. Executed as one repository call per type.
#[derive(Debug, Default)]
pub(crate) struct LoadPlan {
    by_type: BTreeMap<String, (BTreeSet<String>, BTreeSet<String>)>,
}

impl LoadPlan {
    pub fn add(&mut self, resource: &Resource, include: Option<&str>) {
        let Some(id) = &resource.id else { return };
        let (ids, includes) = self.by_type.entry(resource.type_name.clone()).or_default();
        ids.insert(id.clone());
        if let Some(include) = include {
            includes.insert(include.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }

    pub async fn load(
        self,
        graph: &ResourceGraph,
        repository: Option<&Arc<dyn ResourceRepository>>,
    ) -> Result<DbSnapshot, HookError> {
        let mut snapshot = DbSnapshot::default();
        if self.is_empty() {
            return Ok(snapshot);
        }
        let repository = repository.ok_or(HookError::MissingDependency("resource repository"))?;
        for (type_name, (ids, includes)) in self.by_type {
            let resource_type = graph.require(&type_name)?;
            let include: Vec<&Relationship> = includes
                .iter()
                .filter_map(|name| resource_type.relationship(name))
                .collect();
            let ids: Vec<String> = ids.into_iter().collect();
            tracing::debug!(resource_type = %type_name, count = ids.len(), includes = include.len(), "loading database values");
            let loaded = repository.find_by_ids(resource_type, &ids, &include).await?;
            for resource in loaded {
                snapshot.insert(resource);
            }
        }
        Ok(snapshot)
    }
}

/// Affected resources grouped by type, in first-seen order.
#[derive(Debug, Default)]
pub(crate) struct Effects {
    order: Vec<String>,
    by_type: HashMap<String, (BTreeSet<String>, Option<AffectedRelationships>)>,
}

impl Effects {
    fn slot(&mut self, graph: &ResourceGraph, type_name: &str) -> Result<&mut (BTreeSet<String>, Option<AffectedRelationships>), HookError> {
        if !self.by_type.contains_key(type_name) {
            graph.require(type_name)?;
            self.order.push(type_name.to_string());
            self.by_type.insert(type_name.to_string(), (BTreeSet::new(), None));
        }
        self.by_type
            .get_mut(type_name)
            .ok_or_else(|| HookError::GraphConsistency(format!("unknown resource type '{}'", type_name)))
    }

    /// Record `resource` (declaring `relationship`) as affected, reached from `trigger`.
    pub fn add(
        &mut self,
        graph: &ResourceGraph,
        relationship: &Relationship,
        resource: Resource,
        trigger: Option<Resource>,
    ) -> Result<(), HookError> {
        let resource_type = Arc::clone(graph.require(&relationship.left)?);
        let slot = self.slot(graph, &relationship.left)?;
        if let Some(id) = &resource.id {
            slot.0.insert(id.clone());
        }
        slot.1
            .get_or_insert_with(|| AffectedRelationships::new(resource_type))
            .add(relationship, resource, trigger)
    }

    /// Record only the id of a resource reached through a relationship without a declared inverse.
    pub fn add_id(&mut self, graph: &ResourceGraph, resource: &Resource) -> Result<(), HookError> {
        let slot = self.slot(graph, &resource.type_name)?;
        if let Some(id) = &resource.id {
            slot.0.insert(id.clone());
        }
        Ok(())
    }

    pub fn merge(&mut self, graph: &ResourceGraph, other: Effects) -> Result<(), HookError> {
        let mut other = other;
        for type_name in other.order {
            let Some((ids, affected)) = other.by_type.remove(&type_name) else { continue };
            let resource_type = Arc::clone(graph.require(&type_name)?);
            let slot = self.slot(graph, &type_name)?;
            slot.0.extend(ids);
            if let Some(affected) = affected {
                slot.1
                    .get_or_insert_with(|| AffectedRelationships::new(resource_type))
                    .merge(affected)?;
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// (type, ids, affected) in first-seen order; `affected` is empty when no inverse was declared.
    pub fn into_ordered(mut self, graph: &ResourceGraph) -> Result<Vec<(String, BTreeSet<String>, AffectedRelationships)>, HookError> {
        let mut out = Vec::with_capacity(self.order.len());
        for type_name in self.order {
            let Some((ids, affected)) = self.by_type.remove(&type_name) else { continue };
            let affected = match affected {
                Some(a) => a,
                None => AffectedRelationships::new(Arc::clone(graph.require(&type_name)?)),
            };
            out.push((type_name, ids, affected));
        }
        Ok(out)
    }
}

/// Resources the client explicitly linked, keyed on their side by the inverse navigation.
pub(crate) fn explicit_effects(graph: &ResourceGraph, tree: &RequestTree<'_>) -> Result<Effects, HookError> {
    let mut effects = Effects::default();
    for link in &tree.links {
        match graph.inverse_of(link.relationship) {
            Some(inverse) => effects.add(graph, inverse, shallow(link.child), Some(shallow(link.parent)))?,
            None => {
                tracing::warn!(
                    relationship = %format!("{}.{}", link.relationship.left, link.relationship.property),
                    "no inverse navigation declared; affected relationship detail dropped"
                );
                effects.add_id(graph, link.child)?;
            }
        }
    }
    Ok(effects)
}

/// Plan the loads an implicit-effect computation needs. `wants` says whether a type has implicit hooks.
pub(crate) fn plan_implicit_loads(
    graph: &ResourceGraph,
    tree: &RequestTree<'_>,
    pipeline: ResourcePipeline,
    wants: &(dyn Fn(&str) -> bool + Sync),
    plan: &mut LoadPlan,
) {
    for parent in tree.existing_parents(pipeline) {
        let Some(parent_type) = graph.resource_context(&parent.type_name) else { continue };
        for property in parent.relationships.keys() {
            let Some(rel) = parent_type.relationship(property) else { continue };
            if wants(&rel.right) && graph.inverse_of(rel).is_some() {
                plan.add(parent, Some(property.as_str()));
            }
        }
    }
    for link in &tree.links {
        let Some(inverse) = graph.inverse_of(link.relationship) else { continue };
        if inverse.is_to_one() && wants(&link.relationship.left) {
            plan.add(link.child, Some(inverse.property.as_str()));
        }
    }
}

/// Resources whose links change as a side effect of a create or update:
/// - previously linked resources the request drops (keyed by the inverse navigation on their side);
/// - previous owners of a resource that can only have one owner and is now linked elsewhere.
///
/// Both need the inverse navigation. Relationships without one are logged and skipped.
pub(crate) fn implicit_write_effects(
    graph: &ResourceGraph,
    tree: &RequestTree<'_>,
    snapshot: &DbSnapshot,
    pipeline: ResourcePipeline,
    wants: &(dyn Fn(&str) -> bool + Sync),
) -> Result<Effects, HookError> {
    let mut effects = Effects::default();
    let mut untracked: BTreeSet<(&str, &str)> = BTreeSet::new();

    for parent in tree.existing_parents(pipeline) {
        let parent_type = graph.require(&parent.type_name)?;
        let stored = snapshot.get(&parent.key());
        for (property, requested) in &parent.relationships {
            let Some(rel) = parent_type.relationship(property) else { continue };
            if !wants(&rel.right) {
                continue;
            }
            let Some(inverse) = graph.inverse_of(rel) else {
                untracked.insert((rel.left.as_str(), rel.property.as_str()));
                continue;
            };
            let Some(previous) = stored.and_then(|s| s.related(property)) else { continue };
            let kept = requested.keys();
            for old in previous.resources() {
                if !kept.contains(&old.key()) {
                    let state = snapshot.get(&old.key()).map(shallow).unwrap_or_else(|| shallow(old));
                    effects.add(graph, inverse, state, Some(shallow(parent)))?;
                }
            }
        }
    }

    let linked: HashSet<(ResourceKey, ResourceKey)> = tree
        .links
        .iter()
        .map(|l| (l.parent.key(), l.child.key()))
        .collect();
    for link in &tree.links {
        let Some(inverse) = graph.inverse_of(link.relationship) else {
            if wants(&link.relationship.left) {
                untracked.insert((link.relationship.left.as_str(), link.relationship.property.as_str()));
            }
            continue;
        };
        if !inverse.is_to_one() || !wants(&link.relationship.left) {
            continue;
        }
        let Some(stored_child) = snapshot.get(&link.child.key()) else { continue };
        let Some(previous) = stored_child.related(&inverse.property) else { continue };
        for owner in previous.resources() {
            let owner_key = owner.key();
            if linked.contains(&(owner_key.clone(), link.child.key())) {
                continue;
            }
            let state = snapshot.get(&owner_key).map(shallow).unwrap_or_else(|| shallow(owner));
            effects.add(graph, link.relationship, state, Some(shallow(link.child)))?;
        }
    }

    for (left, property) in untracked {
        tracing::warn!(
            relationship = %format!("{}.{}", left, property),
            "no inverse navigation declared; implicit relationship changes are not reported"
        );
    }
    Ok(effects)
}

/// Resources that point at any of `deleted` through some relationship, whether or not the request
/// mentions it. Keyed by that relationship on the referencing side.
pub(crate) async fn implicit_delete_effects(
    graph: &ResourceGraph,
    repository: Option<&Arc<dyn ResourceRepository>>,
    deleted: &[Resource],
    wants: &(dyn Fn(&str) -> bool + Sync),
) -> Result<Effects, HookError> {
    let mut effects = Effects::default();
    let Some(first) = deleted.first() else {
        return Ok(effects);
    };
    let deleted_keys: HashMap<ResourceKey, &Resource> = deleted.iter().map(|r| (r.key(), r)).collect();
    let ids: Vec<String> = deleted.iter().filter_map(|r| r.id.clone()).collect();
    let relationships: Vec<&Relationship> = graph
        .relationships_targeting(&first.type_name)
        .filter(|rel| wants(&rel.left))
        .collect();
    if relationships.is_empty() || ids.is_empty() {
        return Ok(effects);
    }
    let repository = repository.ok_or(HookError::MissingDependency("resource repository"))?;

    for rel in relationships {
        let referencing = repository.find_referencing(rel, &ids).await?;
        tracing::debug!(
            relationship = %format!("{}.{}", rel.left, rel.property),
            count = referencing.len(),
            "resources referencing deleted resources"
        );
        for resource in referencing {
            if deleted_keys.contains_key(&resource.key()) {
                continue;
            }
            let targets: Vec<Resource> = resource
                .related(&rel.property)
                .map(|d| d.resources().into_iter().cloned().collect())
                .unwrap_or_default();
            for target in targets {
                if let Some(deleted) = deleted_keys.get(&target.key()) {
                    effects.add(graph, rel, resource.clone(), Some(shallow(deleted)))?;
                }
            }
        }
    }
    Ok(effects)
}

/// Remove links to `type_name` resources whose id is in `vetoed`, at any depth.
pub(crate) fn detach(resources: &mut [Resource], type_name: &str, vetoed: &BTreeSet<String>) {
    for resource in resources.iter_mut() {
        detach_one(resource, type_name, vetoed, 0);
    }
}

const MAX_DEPTH: usize = 64;

fn detach_one(resource: &mut Resource, type_name: &str, vetoed: &BTreeSet<String>, depth: usize) {
    if depth > MAX_DEPTH {
        return;
    }
    for data in resource.relationships.values_mut() {
        data.retain(|r| !(r.type_name == type_name && r.id.as_ref().map(|id| vetoed.contains(id)).unwrap_or(false)));
        for child in data.resources_mut() {
            detach_one(child, type_name, vetoed, depth + 1);
        }
    }
}
