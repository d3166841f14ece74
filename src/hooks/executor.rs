//! Resource hook executor: runs every hook one mutation triggers, in order, each (type, hook) at most once.

use crate::config::ResourceGraph;
use crate::error::HookError;
use crate::hooks::traversal::{
    detach, explicit_effects, implicit_delete_effects, implicit_write_effects, plan_implicit_loads, shallow,
    unique, DbSnapshot, LoadPlan, RequestTree,
};
use crate::hooks::{AffectedRelationships, EntityDiff, HookRegistry, ResourceHook, ResourcePipeline};
use crate::resource::Resource;
use crate::store::ResourceRepository;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Progress of one hook pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassState {
    NotStarted,
    ResolvingPrimary,
    DiffingRelationships,
    InvokingParentHooks,
    InvokingChildImplicitHooks,
    Completed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    fn before_hook(self) -> ResourceHook {
        match self {
            Operation::Create => ResourceHook::BeforeCreate,
            Operation::Update => ResourceHook::BeforeUpdate,
            Operation::Delete => ResourceHook::BeforeDelete,
        }
    }
}

/// Per-request hook executor. Cheap to build: holds shared graph and registry plus the pass state.
///
/// A `before_*` call records the implicit effects it found; the matching `after_*` call fires
/// `AfterImplicitUpdateRelationship` for them, so use one executor for both halves of an operation.
pub struct ResourceHookExecutor {
    graph: Arc<ResourceGraph>,
    registry: Arc<HookRegistry>,
    repository: Option<Arc<dyn ResourceRepository>>,
    state: PassState,
    pending_implicit: Vec<AffectedRelationships>,
}

impl ResourceHookExecutor {
    pub fn new(graph: Arc<ResourceGraph>, registry: Arc<HookRegistry>) -> Self {
        ResourceHookExecutor {
            graph,
            registry,
            repository: None,
            state: PassState::NotStarted,
            pending_implicit: Vec::new(),
        }
    }

    /// Data-access layer used to load database values. Without it, any pass that needs stored
    /// state fails with [`HookError::MissingDependency`].
    pub fn with_repository(mut self, repository: Arc<dyn ResourceRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    pub async fn before_create(&mut self, resources: Vec<Resource>, pipeline: ResourcePipeline) -> Result<Vec<Resource>, HookError> {
        self.before(Operation::Create, resources, pipeline).await
    }

    pub async fn before_update(&mut self, resources: Vec<Resource>, pipeline: ResourcePipeline) -> Result<Vec<Resource>, HookError> {
        self.before(Operation::Update, resources, pipeline).await
    }

    pub async fn before_delete(&mut self, resources: Vec<Resource>, pipeline: ResourcePipeline) -> Result<Vec<Resource>, HookError> {
        self.before(Operation::Delete, resources, pipeline).await
    }

    pub async fn after_create(&mut self, resources: &[Resource], pipeline: ResourcePipeline) -> Result<(), HookError> {
        self.after(Operation::Create, resources, pipeline, true).await
    }

    pub async fn after_update(&mut self, resources: &[Resource], pipeline: ResourcePipeline) -> Result<(), HookError> {
        self.after(Operation::Update, resources, pipeline, true).await
    }

    /// Implicit after-hooks only fire when `succeeded` is true.
    pub async fn after_delete(&mut self, resources: &[Resource], pipeline: ResourcePipeline, succeeded: bool) -> Result<(), HookError> {
        self.after(Operation::Delete, resources, pipeline, succeeded).await
    }

    fn transition(&mut self, next: PassState) {
        tracing::trace!(from = ?self.state, to = ?next, "hook pass state");
        self.state = next;
    }

    async fn before(
        &mut self,
        op: Operation,
        resources: Vec<Resource>,
        pipeline: ResourcePipeline,
    ) -> Result<Vec<Resource>, HookError> {
        self.pending_implicit.clear();
        self.transition(PassState::ResolvingPrimary);
        if resources.is_empty() {
            self.transition(PassState::Completed);
            return Ok(resources);
        }
        let graph = Arc::clone(&self.graph);
        let registry = Arc::clone(&self.registry);
        let primary_type = primary_type_of(&graph, &resources)?;
        let primary = unique(&resources);
        let primary_hook = op.before_hook();
        let root = registry.discover(&primary_type);
        let wants = |type_name: &str| {
            let d = registry.discover(type_name);
            d.is_enabled(ResourceHook::BeforeImplicitUpdateRelationship)
                || d.is_enabled(ResourceHook::AfterImplicitUpdateRelationship)
        };

        self.transition(PassState::DiffingRelationships);
        let snapshot = {
            let tree = RequestTree::build(&graph, &primary)?;
            let mut plan = LoadPlan::default();
            if op != Operation::Create && root.loads_database_values(primary_hook) {
                for r in &primary {
                    plan.add(r, None);
                }
            }
            if op != Operation::Delete {
                plan_implicit_loads(&graph, &tree, pipeline, &wants, &mut plan);
                for link in &tree.links {
                    if registry
                        .discover(&link.child.type_name)
                        .loads_database_values(ResourceHook::BeforeUpdateRelationship)
                    {
                        plan.add(link.child, None);
                    }
                }
            }
            plan.load(&graph, self.repository.as_ref()).await?
        };
        tracing::debug!(
            resource_type = %primary_type,
            count = primary.len(),
            loaded = snapshot.len(),
            "diffed request against database"
        );

        self.transition(PassState::InvokingParentHooks);
        let mut survivors = match registry.handler_for(&primary_type, primary_hook) {
            Some(handler) => {
                log_invocation(&primary_type, primary_hook, primary.len());
                let loads = root.loads_database_values(primary_hook);
                let returned = match op {
                    Operation::Create => handler.before_create(primary.clone(), pipeline).await?,
                    Operation::Update => {
                        let diff = if loads {
                            EntityDiff::from_lookup(primary.clone(), |r| snapshot.get(&r.key()).map(shallow))
                        } else {
                            EntityDiff::new(primary.clone(), None)?
                        };
                        handler.before_update(diff, pipeline).await?
                    }
                    Operation::Delete => {
                        let input = if loads {
                            primary
                                .iter()
                                .map(|r| snapshot.get(&r.key()).cloned().unwrap_or_else(|| r.clone()))
                                .collect()
                        } else {
                            primary.clone()
                        };
                        handler.before_delete(input, pipeline).await?
                    }
                };
                reassign(&primary, returned)
            }
            None => primary,
        };

        if op != Operation::Delete {
            let explicit = {
                let tree = RequestTree::build(&graph, &survivors)?;
                explicit_effects(&graph, &tree)?
            };
            for (type_name, ids, mut affected) in explicit.into_ordered(&graph)? {
                let hook = ResourceHook::BeforeUpdateRelationship;
                let Some(handler) = registry.handler_for(&type_name, hook) else { continue };
                if ids.is_empty() {
                    continue;
                }
                if registry.discover(&type_name).loads_database_values(hook) {
                    affected.replace_resources(|key| snapshot.get(key).map(shallow));
                }
                log_invocation(&type_name, hook, ids.len());
                let allowed = handler.before_update_relationship(ids.clone(), &affected, pipeline).await?;
                let vetoed: BTreeSet<String> = ids.difference(&allowed).cloned().collect();
                if !vetoed.is_empty() {
                    tracing::debug!(resource_type = %type_name, count = vetoed.len(), "detaching vetoed relationship links");
                    detach(&mut survivors, &type_name, &vetoed);
                }
            }
        }

        self.transition(PassState::InvokingChildImplicitHooks);
        let implicit = match op {
            Operation::Delete => implicit_delete_effects(&graph, self.repository.as_ref(), &survivors, &wants).await?,
            _ => {
                let tree = RequestTree::build(&graph, &survivors)?;
                implicit_write_effects(&graph, &tree, &snapshot, pipeline, &wants)?
            }
        };
        for (type_name, _, affected) in implicit.into_ordered(&graph)? {
            if affected.is_empty() {
                continue;
            }
            let hook = ResourceHook::BeforeImplicitUpdateRelationship;
            if let Some(handler) = registry.handler_for(&type_name, hook) {
                log_invocation(&type_name, hook, affected.resources().len());
                handler.before_implicit_update_relationship(&affected, pipeline).await?;
            }
            if registry
                .discover(&type_name)
                .is_enabled(ResourceHook::AfterImplicitUpdateRelationship)
            {
                self.pending_implicit.push(affected);
            }
        }

        self.transition(PassState::Completed);
        Ok(survivors)
    }

    async fn after(
        &mut self,
        op: Operation,
        resources: &[Resource],
        pipeline: ResourcePipeline,
        succeeded: bool,
    ) -> Result<(), HookError> {
        self.transition(PassState::ResolvingPrimary);
        let pending = std::mem::take(&mut self.pending_implicit);
        if resources.is_empty() {
            self.transition(PassState::Completed);
            return Ok(());
        }
        let graph = Arc::clone(&self.graph);
        let registry = Arc::clone(&self.registry);
        let primary_type = primary_type_of(&graph, resources)?;
        let primary = unique(resources);

        self.transition(PassState::InvokingParentHooks);
        let hook = match op {
            Operation::Create => ResourceHook::AfterCreate,
            Operation::Update => ResourceHook::AfterUpdate,
            Operation::Delete => ResourceHook::AfterDelete,
        };
        if let Some(handler) = registry.handler_for(&primary_type, hook) {
            log_invocation(&primary_type, hook, primary.len());
            match op {
                Operation::Create => handler.after_create(&primary, pipeline).await?,
                Operation::Update => handler.after_update(&primary, pipeline).await?,
                Operation::Delete => handler.after_delete(&primary, pipeline, succeeded).await?,
            }
        }

        if op != Operation::Delete {
            let explicit = {
                let tree = RequestTree::build(&graph, &primary)?;
                explicit_effects(&graph, &tree)?
            };
            for (type_name, _, affected) in explicit.into_ordered(&graph)? {
                let hook = ResourceHook::AfterUpdateRelationship;
                if affected.is_empty() {
                    continue;
                }
                if let Some(handler) = registry.handler_for(&type_name, hook) {
                    log_invocation(&type_name, hook, affected.resources().len());
                    handler.after_update_relationship(&affected, pipeline).await?;
                }
            }
        }

        self.transition(PassState::InvokingChildImplicitHooks);
        if succeeded {
            for affected in pending {
                let hook = ResourceHook::AfterImplicitUpdateRelationship;
                if let Some(handler) = registry.handler_for(affected.resource_type(), hook) {
                    log_invocation(affected.resource_type(), hook, affected.resources().len());
                    handler.after_implicit_update_relationship(&affected, pipeline).await?;
                }
            }
        }

        self.transition(PassState::Completed);
        Ok(())
    }
}

fn log_invocation(resource_type: &str, hook: ResourceHook, count: usize) {
    tracing::debug!(resource_type = %resource_type, hook = %hook, count, "invoking resource hook");
}

/// The single resource type of a primary set.
fn primary_type_of(graph: &ResourceGraph, resources: &[Resource]) -> Result<String, HookError> {
    let type_name = resources
        .first()
        .map(|r| r.type_name.clone())
        .unwrap_or_default();
    if let Some(other) = resources.iter().find(|r| r.type_name != type_name) {
        return Err(HookError::GraphConsistency(format!(
            "primary resources mix types '{}' and '{}'",
            type_name, other.type_name
        )));
    }
    graph.require(&type_name)?;
    Ok(type_name)
}

/// Primary resources the hook kept, in request order, replaced by the hook's version.
fn reassign(primary: &[Resource], returned: Vec<Resource>) -> Vec<Resource> {
    let mut by_key: HashMap<_, Resource> = HashMap::with_capacity(returned.len());
    for r in returned {
        by_key.entry(r.key()).or_insert(r);
    }
    primary.iter().filter_map(|r| by_key.remove(&r.key())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reassign_keeps_request_order_and_drops_filtered() {
        let primary = vec![
            Resource::new("todoItems", "1"),
            Resource::new("todoItems", "2"),
            Resource::new("todoItems", "3"),
        ];
        let returned = vec![
            Resource::new("todoItems", "3"),
            Resource::new("todoItems", "1").with_attribute("description", "changed"),
            Resource::new("todoItems", "1"),
        ];
        let kept = reassign(&primary, returned);
        let ids: Vec<_> = kept.iter().filter_map(|r| r.id.as_deref()).collect();
        assert_eq!(ids, vec!["1", "3"]);
        assert!(kept[0].attribute("description").is_some());
    }

    #[test]
    fn mixed_primary_types_are_rejected() {
        let graph = ResourceGraph::new(Default::default(), Vec::new());
        let err = primary_type_of(&graph, &[Resource::new("a", "1"), Resource::new("b", "1")]).unwrap_err();
        assert!(matches!(err, HookError::GraphConsistency(_)));
    }
}
