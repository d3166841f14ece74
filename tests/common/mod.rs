//! Shared fixtures: a todo/people/tags graph and hook handlers that record every call.

#![allow(dead_code)]

use async_trait::async_trait;
use jsonapi_sdk::config::{parse_graph, resolve, ResourceGraph};
use jsonapi_sdk::hooks::{AffectedRelationships, EntityDiff, HookSet};
use jsonapi_sdk::{
    HookDiscovery, HookError, HookRegistry, InMemoryRepository, Resource, ResourceHook, ResourceHooks, ResourcePipeline,
};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

pub const GRAPH: &str = r#"{
    "resources": [
        {
            "name": "todoItems",
            "table": "todo_items",
            "attributes": [{ "name": "description" }, { "name": "ordinal", "pg_type": "bigint" }],
            "relationships": [
                { "name": "owner", "kind": "has_one", "target": "people", "foreign_key": "owner_id", "inverse": "todo_items" },
                { "name": "assignee", "kind": "has_one", "target": "people", "foreign_key": "assignee_id" },
                { "name": "one_to_one_person", "kind": "has_one", "target": "people",
                  "foreign_key": "one_to_one_person_id", "inverse": "one_to_one_todo_item" },
                { "name": "tags", "kind": "has_many_through", "target": "tags",
                  "through": { "table": "todo_item_tags", "left_column": "todo_item_id", "right_column": "tag_id" },
                  "inverse": "todo_items" }
            ],
            "validation": { "description": { "required": true } }
        },
        {
            "name": "people",
            "table": "people",
            "attributes": [{ "name": "first_name" }, { "name": "last_name" }],
            "relationships": [
                { "name": "todo_items", "kind": "has_many", "target": "todoItems", "foreign_key": "owner_id", "inverse": "owner" },
                { "name": "one_to_one_todo_item", "kind": "has_one", "target": "todoItems",
                  "foreign_key": "one_to_one_person_id", "foreign_key_on": "remote", "inverse": "one_to_one_person" },
                { "name": "mentor", "kind": "has_one", "target": "people", "foreign_key": "mentor_id" }
            ],
            "validation": { "last_name": { "required": true } }
        },
        {
            "name": "tags",
            "table": "tags",
            "attributes": [{ "name": "name" }],
            "relationships": [
                { "name": "todo_items", "kind": "has_many_through", "target": "todoItems",
                  "through": { "table": "todo_item_tags", "left_column": "tag_id", "right_column": "todo_item_id" },
                  "inverse": "tags" }
            ]
        }
    ]
}"#;

pub fn graph() -> Arc<ResourceGraph> {
    Arc::new(resolve(&parse_graph(GRAPH).unwrap()).unwrap())
}

/// One recorded hook invocation.
#[derive(Clone, Debug)]
pub enum Call {
    BeforeCreate(Vec<Resource>),
    AfterCreate(Vec<Resource>),
    BeforeUpdate(EntityDiff),
    AfterUpdate(Vec<Resource>),
    BeforeDelete(Vec<Resource>),
    AfterDelete(Vec<Resource>, bool),
    BeforeUpdateRelationship(BTreeSet<String>, AffectedRelationships),
    AfterUpdateRelationship(AffectedRelationships),
    BeforeImplicitUpdateRelationship(AffectedRelationships),
    AfterImplicitUpdateRelationship(AffectedRelationships),
}

impl Call {
    pub fn hook(&self) -> ResourceHook {
        match self {
            Call::BeforeCreate(_) => ResourceHook::BeforeCreate,
            Call::AfterCreate(_) => ResourceHook::AfterCreate,
            Call::BeforeUpdate(_) => ResourceHook::BeforeUpdate,
            Call::AfterUpdate(_) => ResourceHook::AfterUpdate,
            Call::BeforeDelete(_) => ResourceHook::BeforeDelete,
            Call::AfterDelete(..) => ResourceHook::AfterDelete,
            Call::BeforeUpdateRelationship(..) => ResourceHook::BeforeUpdateRelationship,
            Call::AfterUpdateRelationship(_) => ResourceHook::AfterUpdateRelationship,
            Call::BeforeImplicitUpdateRelationship(_) => ResourceHook::BeforeImplicitUpdateRelationship,
            Call::AfterImplicitUpdateRelationship(_) => ResourceHook::AfterImplicitUpdateRelationship,
        }
    }
}

/// Calls from every recorder sharing it, in invocation order.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<(String, ResourcePipeline, Call)>>>);

impl Journal {
    fn push(&self, resource_type: &str, pipeline: ResourcePipeline, call: Call) {
        self.0.lock().unwrap().push((resource_type.to_string(), pipeline, call));
    }

    pub fn calls(&self, resource_type: &str) -> Vec<Call> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _, _)| t == resource_type)
            .map(|(_, _, c)| c.clone())
            .collect()
    }

    /// (type, hook) of every call, in order.
    pub fn sequence(&self) -> Vec<(String, ResourceHook)> {
        self.0.lock().unwrap().iter().map(|(t, _, c)| (t.clone(), c.hook())).collect()
    }

    pub fn pipelines(&self) -> Vec<ResourcePipeline> {
        self.0.lock().unwrap().iter().map(|(_, p, _)| *p).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().unwrap().is_empty()
    }
}

/// Hook handler that records every call and otherwise passes everything through.
pub struct Recorder {
    resource_type: String,
    journal: Journal,
    discovery: HookDiscovery,
    veto: BTreeSet<String>,
    reject: Option<ResourceHook>,
    filter_all: bool,
}

impl Recorder {
    /// Every hook enabled, every hook receiving database values.
    pub fn new(resource_type: &str, journal: &Journal) -> Self {
        Recorder {
            resource_type: resource_type.to_string(),
            journal: journal.clone(),
            discovery: HookDiscovery::new(HookSet::all()).with_database_values(HookSet::all()),
            veto: BTreeSet::new(),
            reject: None,
            filter_all: false,
        }
    }

    pub fn with_discovery(mut self, discovery: HookDiscovery) -> Self {
        self.discovery = discovery;
        self
    }

    /// `before_update_relationship` refuses these ids.
    pub fn vetoing(mut self, ids: &[&str]) -> Self {
        self.veto = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn rejecting(mut self, hook: ResourceHook) -> Self {
        self.reject = Some(hook);
        self
    }

    /// Before hooks on primary resources return nothing.
    pub fn filtering_everything(mut self) -> Self {
        self.filter_all = true;
        self
    }

    fn record(&self, pipeline: ResourcePipeline, call: Call) -> Result<(), HookError> {
        let hook = call.hook();
        self.journal.push(&self.resource_type, pipeline, call);
        if self.reject == Some(hook) {
            return Err(HookError::rejected(&self.resource_type, hook, "rejected by test handler"));
        }
        Ok(())
    }

    fn kept(&self, resources: Vec<Resource>) -> Vec<Resource> {
        if self.filter_all {
            Vec::new()
        } else {
            resources
        }
    }
}

#[async_trait]
impl ResourceHooks for Recorder {
    fn discovery(&self) -> HookDiscovery {
        self.discovery
    }

    async fn before_create(&self, resources: Vec<Resource>, pipeline: ResourcePipeline) -> Result<Vec<Resource>, HookError> {
        self.record(pipeline, Call::BeforeCreate(resources.clone()))?;
        Ok(self.kept(resources))
    }

    async fn after_create(&self, resources: &[Resource], pipeline: ResourcePipeline) -> Result<(), HookError> {
        self.record(pipeline, Call::AfterCreate(resources.to_vec()))
    }

    async fn before_update(&self, diff: EntityDiff, pipeline: ResourcePipeline) -> Result<Vec<Resource>, HookError> {
        self.record(pipeline, Call::BeforeUpdate(diff.clone()))?;
        Ok(self.kept(diff.into_request_entities()))
    }

    async fn after_update(&self, resources: &[Resource], pipeline: ResourcePipeline) -> Result<(), HookError> {
        self.record(pipeline, Call::AfterUpdate(resources.to_vec()))
    }

    async fn before_delete(&self, resources: Vec<Resource>, pipeline: ResourcePipeline) -> Result<Vec<Resource>, HookError> {
        self.record(pipeline, Call::BeforeDelete(resources.clone()))?;
        Ok(self.kept(resources))
    }

    async fn after_delete(&self, resources: &[Resource], pipeline: ResourcePipeline, succeeded: bool) -> Result<(), HookError> {
        self.record(pipeline, Call::AfterDelete(resources.to_vec(), succeeded))
    }

    async fn before_update_relationship(
        &self,
        ids: BTreeSet<String>,
        affected: &AffectedRelationships,
        pipeline: ResourcePipeline,
    ) -> Result<BTreeSet<String>, HookError> {
        self.record(pipeline, Call::BeforeUpdateRelationship(ids.clone(), affected.clone()))?;
        Ok(ids.difference(&self.veto).cloned().collect())
    }

    async fn after_update_relationship(&self, affected: &AffectedRelationships, pipeline: ResourcePipeline) -> Result<(), HookError> {
        self.record(pipeline, Call::AfterUpdateRelationship(affected.clone()))
    }

    async fn before_implicit_update_relationship(
        &self,
        affected: &AffectedRelationships,
        pipeline: ResourcePipeline,
    ) -> Result<(), HookError> {
        self.record(pipeline, Call::BeforeImplicitUpdateRelationship(affected.clone()))
    }

    async fn after_implicit_update_relationship(
        &self,
        affected: &AffectedRelationships,
        pipeline: ResourcePipeline,
    ) -> Result<(), HookError> {
        self.record(pipeline, Call::AfterImplicitUpdateRelationship(affected.clone()))
    }
}

pub fn registry(recorders: Vec<Recorder>) -> Arc<HookRegistry> {
    let mut registry = HookRegistry::new();
    for recorder in recorders {
        let resource_type = recorder.resource_type.clone();
        registry.register(&resource_type, Arc::new(recorder));
    }
    Arc::new(registry)
}

/// People 1 ("Target") and 2 ("Previous"); todo item 1 linked one-to-one to person 2 and owned by
/// person 1; todo item 2 linked one-to-one to person 1; tags 1 and 2.
pub async fn seeded(graph: &Arc<ResourceGraph>) -> Arc<InMemoryRepository> {
    let repo = InMemoryRepository::new(Arc::clone(graph));
    repo.insert(Resource::new("people", "1").with_attribute("last_name", "Target")).await.unwrap();
    repo.insert(Resource::new("people", "2").with_attribute("last_name", "Previous")).await.unwrap();
    repo.insert(
        Resource::new("todoItems", "1")
            .with_attribute("description", "stored")
            .with_to_one("one_to_one_person", Some(Resource::new("people", "2")))
            .with_to_one("owner", Some(Resource::new("people", "1"))),
    )
    .await
    .unwrap();
    repo.insert(
        Resource::new("todoItems", "2")
            .with_attribute("description", "other")
            .with_to_one("one_to_one_person", Some(Resource::new("people", "1"))),
    )
    .await
    .unwrap();
    repo.insert(Resource::new("tags", "1").with_attribute("name", "home")).await.unwrap();
    repo.insert(Resource::new("tags", "2").with_attribute("name", "work")).await.unwrap();
    Arc::new(repo)
}

pub fn ids(resources: &[&Resource]) -> Vec<String> {
    resources.iter().filter_map(|r| r.id.clone()).collect()
}
