//! Hook executor passes against an in-memory repository.

mod common;

use common::{graph, ids, registry, seeded, Call, Journal, Recorder};
use jsonapi_sdk::hooks::{HookSet, PassState};
use jsonapi_sdk::{
    HookDiscovery, HookError, RelationshipData, Resource, ResourceHook, ResourceHookExecutor, ResourcePipeline,
    ResourceRepository,
};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Todo item 1 now linked one-to-one to person 1 (it was linked to person 2; person 1 was linked to todo item 2).
fn relink_request() -> Resource {
    Resource::new("todoItems", "1")
        .with_attribute("description", "changed")
        .with_to_one("one_to_one_person", Some(Resource::new("people", "1")))
}

#[tokio::test]
async fn before_update_reports_explicit_and_implicit_effects() {
    let graph = graph();
    let repo = seeded(&graph).await;
    let journal = Journal::default();
    let hooks = registry(vec![Recorder::new("todoItems", &journal), Recorder::new("people", &journal)]);
    let mut executor = ResourceHookExecutor::new(Arc::clone(&graph), hooks).with_repository(repo);

    let kept = executor
        .before_update(vec![relink_request()], ResourcePipeline::Patch)
        .await
        .unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(executor.state(), PassState::Completed);

    let todo_calls = journal.calls("todoItems");
    assert_eq!(todo_calls.len(), 2);
    let Call::BeforeUpdate(diff) = &todo_calls[0] else { panic!("expected BeforeUpdate, got {:?}", todo_calls[0]) };
    let stored: Vec<_> = diff.pairs().map(|(_, s)| s.and_then(|s| s.attribute("description")).cloned()).collect();
    assert_eq!(stored, vec![Some(json!("stored"))]);
    assert_eq!(diff.changed_attributes(0)[0].attribute, "description");

    let Call::BeforeImplicitUpdateRelationship(todo_implicit) = &todo_calls[1] else { panic!("expected implicit hook") };
    let by_people = todo_implicit.get_by_relationship("people").unwrap();
    assert_eq!(by_people.len(), 1);
    assert_eq!(by_people[0].0.property, "one_to_one_person");
    let affected: Vec<&Resource> = by_people[0].1.iter().map(|e| &e.resource).collect();
    assert_eq!(ids(&affected), vec!["2"]);
    assert_eq!(affected[0].attribute("description"), Some(&json!("other")));

    let people_calls = journal.calls("people");
    assert_eq!(people_calls.len(), 2);
    let Call::BeforeUpdateRelationship(rel_ids, explicit) = &people_calls[0] else { panic!("expected BeforeUpdateRelationship") };
    assert_eq!(rel_ids, &BTreeSet::from(["1".to_string()]));
    let entries = explicit.get("one_to_one_todo_item").unwrap();
    assert_eq!(entries[0].resource.attribute("last_name"), Some(&json!("Target")));
    assert_eq!(entries[0].triggered_by[0].id.as_deref(), Some("1"));

    let Call::BeforeImplicitUpdateRelationship(people_implicit) = &people_calls[1] else { panic!("expected implicit hook") };
    assert_eq!(people_implicit.ids(), BTreeSet::from(["2".to_string()]));
    let previous = people_implicit.get("one_to_one_todo_item").unwrap();
    assert_eq!(previous[0].resource.attribute("last_name"), Some(&json!("Previous")));
}

#[tokio::test]
async fn clearing_a_relationship_only_affects_the_previous_target() {
    let graph = graph();
    let repo = seeded(&graph).await;
    let journal = Journal::default();
    let hooks = registry(vec![Recorder::new("todoItems", &journal), Recorder::new("people", &journal)]);
    let mut executor = ResourceHookExecutor::new(Arc::clone(&graph), hooks).with_repository(repo);

    let request = Resource::new("todoItems", "1").with_to_one("one_to_one_person", None);
    executor.before_update(vec![request], ResourcePipeline::Patch).await.unwrap();

    assert_eq!(
        journal.sequence(),
        vec![
            ("todoItems".to_string(), ResourceHook::BeforeUpdate),
            ("people".to_string(), ResourceHook::BeforeImplicitUpdateRelationship),
        ]
    );
    let Call::BeforeImplicitUpdateRelationship(affected) = &journal.calls("people")[0] else { panic!() };
    assert_eq!(affected.ids(), BTreeSet::from(["2".to_string()]));
}

#[tokio::test]
async fn without_parent_hook_children_still_see_their_effects() {
    let graph = graph();
    let repo = seeded(&graph).await;
    let journal = Journal::default();
    let hooks = registry(vec![Recorder::new("people", &journal)]);
    let mut executor = ResourceHookExecutor::new(Arc::clone(&graph), hooks).with_repository(repo);

    executor.before_update(vec![relink_request()], ResourcePipeline::Patch).await.unwrap();

    assert!(journal.calls("todoItems").is_empty());
    let hooks: Vec<ResourceHook> = journal.calls("people").iter().map(Call::hook).collect();
    assert_eq!(
        hooks,
        vec![ResourceHook::BeforeUpdateRelationship, ResourceHook::BeforeImplicitUpdateRelationship]
    );
}

#[tokio::test]
async fn without_child_hook_parent_sees_previous_owner() {
    let graph = graph();
    let repo = seeded(&graph).await;
    let journal = Journal::default();
    let hooks = registry(vec![Recorder::new("todoItems", &journal)]);
    let mut executor = ResourceHookExecutor::new(Arc::clone(&graph), hooks).with_repository(repo);

    executor.before_update(vec![relink_request()], ResourcePipeline::Patch).await.unwrap();

    let calls = journal.calls("todoItems");
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].hook(), ResourceHook::BeforeUpdate);
    let Call::BeforeImplicitUpdateRelationship(affected) = &calls[1] else { panic!() };
    assert_eq!(affected.ids(), BTreeSet::from(["2".to_string()]));
}

#[tokio::test]
async fn implicit_hooks_can_be_switched_off() {
    let graph = graph();
    let repo = seeded(&graph).await;
    let journal = Journal::default();
    let no_implicit = HookDiscovery::new(HookSet::all())
        .with_database_values(HookSet::all())
        .without_implicit_hooks();
    let hooks = registry(vec![
        Recorder::new("todoItems", &journal).with_discovery(no_implicit),
        Recorder::new("people", &journal).with_discovery(no_implicit),
    ]);
    let mut executor = ResourceHookExecutor::new(Arc::clone(&graph), hooks).with_repository(repo);

    executor.before_update(vec![relink_request()], ResourcePipeline::Patch).await.unwrap();

    assert_eq!(
        journal.sequence(),
        vec![
            ("todoItems".to_string(), ResourceHook::BeforeUpdate),
            ("people".to_string(), ResourceHook::BeforeUpdateRelationship),
        ]
    );
}

#[tokio::test]
async fn request_values_are_passed_when_database_values_are_off() {
    let graph = graph();
    let journal = Journal::default();
    let hooks = registry(vec![Recorder::new("todoItems", &journal).with_discovery(HookDiscovery::new([
        ResourceHook::BeforeUpdate,
        ResourceHook::BeforeUpdateRelationship,
    ]))]);
    let mut executor = ResourceHookExecutor::new(Arc::clone(&graph), hooks);

    let request = Resource::new("todoItems", "1").with_attribute("description", "changed");
    executor.before_update(vec![request], ResourcePipeline::Patch).await.unwrap();

    let Call::BeforeUpdate(diff) = &journal.calls("todoItems")[0] else { panic!() };
    assert!(diff.database_entities().is_none());
}

#[tokio::test]
async fn loading_database_values_without_repository_is_a_missing_dependency() {
    let graph = graph();
    let journal = Journal::default();
    let hooks = registry(vec![Recorder::new("todoItems", &journal)]);
    let mut executor = ResourceHookExecutor::new(Arc::clone(&graph), hooks);

    let err = executor
        .before_update(vec![relink_request()], ResourcePipeline::Patch)
        .await
        .unwrap_err();
    assert!(matches!(err, HookError::MissingDependency(_)));
    assert!(journal.is_empty());
}

#[tokio::test]
async fn duplicate_primary_resources_reach_hooks_once() {
    let graph = graph();
    let repo = seeded(&graph).await;
    let journal = Journal::default();
    let hooks = registry(vec![Recorder::new("todoItems", &journal)]);
    let mut executor = ResourceHookExecutor::new(Arc::clone(&graph), hooks).with_repository(repo);

    let request = Resource::new("todoItems", "2").with_attribute("description", "twice");
    let kept = executor
        .before_update(vec![request.clone(), request], ResourcePipeline::Patch)
        .await
        .unwrap();
    assert_eq!(kept.len(), 1);
    let Call::BeforeUpdate(diff) = &journal.calls("todoItems")[0] else { panic!() };
    assert_eq!(diff.len(), 1);
}

#[tokio::test]
async fn vetoed_links_are_detached_before_implicit_effects() {
    let graph = graph();
    let repo = seeded(&graph).await;
    let journal = Journal::default();
    let hooks = registry(vec![
        Recorder::new("todoItems", &journal),
        Recorder::new("tags", &journal).vetoing(&["2"]),
    ]);
    let mut executor = ResourceHookExecutor::new(Arc::clone(&graph), hooks).with_repository(repo);

    let request = Resource::new("todoItems", "1")
        .with_to_many("tags", vec![Resource::new("tags", "1"), Resource::new("tags", "2")]);
    let kept = executor.before_update(vec![request], ResourcePipeline::Patch).await.unwrap();

    assert_eq!(kept[0].related("tags").unwrap().ids(), vec!["1".to_string()]);
    let Call::BeforeUpdateRelationship(offered, _) = &journal.calls("tags")[0] else { panic!() };
    assert_eq!(offered.len(), 2);
}

#[tokio::test]
async fn rejection_aborts_the_pass() {
    let graph = graph();
    let repo = seeded(&graph).await;
    let journal = Journal::default();
    let hooks = registry(vec![
        Recorder::new("todoItems", &journal).rejecting(ResourceHook::BeforeUpdate),
        Recorder::new("people", &journal),
    ]);
    let mut executor = ResourceHookExecutor::new(Arc::clone(&graph), hooks).with_repository(repo);

    let err = executor
        .before_update(vec![relink_request()], ResourcePipeline::Patch)
        .await
        .unwrap_err();
    assert!(matches!(err, HookError::Rejected { hook: ResourceHook::BeforeUpdate, .. }));
    assert!(journal.calls("people").is_empty());
}

#[tokio::test]
async fn after_pass_fires_primary_then_explicit_then_implicit() {
    let graph = graph();
    let repo = seeded(&graph).await;
    let journal = Journal::default();
    let hooks = registry(vec![Recorder::new("todoItems", &journal), Recorder::new("people", &journal)]);
    let mut executor = ResourceHookExecutor::new(Arc::clone(&graph), hooks).with_repository(repo);

    let kept = executor
        .before_update(vec![relink_request()], ResourcePipeline::Patch)
        .await
        .unwrap();
    executor.after_update(&kept, ResourcePipeline::Patch).await.unwrap();

    let after: Vec<(String, ResourceHook)> = journal.sequence().into_iter().skip(4).collect();
    assert_eq!(
        after,
        vec![
            ("todoItems".to_string(), ResourceHook::AfterUpdate),
            ("people".to_string(), ResourceHook::AfterUpdateRelationship),
            ("people".to_string(), ResourceHook::AfterImplicitUpdateRelationship),
            ("todoItems".to_string(), ResourceHook::AfterImplicitUpdateRelationship),
        ]
    );
}

#[tokio::test]
async fn delete_reaches_every_referencing_resource() {
    let graph = graph();
    let repo = seeded(&graph).await;
    let people = Arc::clone(graph.resource_context("people").unwrap());
    let journal = Journal::default();
    let hooks = registry(vec![Recorder::new("todoItems", &journal), Recorder::new("people", &journal)]);
    let mut executor = ResourceHookExecutor::new(Arc::clone(&graph), hooks).with_repository(repo.clone());

    let kept = executor
        .before_delete(vec![Resource::new("people", "1")], ResourcePipeline::Delete)
        .await
        .unwrap();
    let Call::BeforeDelete(loaded) = &journal.calls("people")[0] else { panic!() };
    assert_eq!(loaded[0].attribute("last_name"), Some(&json!("Target")));

    let Call::BeforeImplicitUpdateRelationship(affected) = &journal.calls("todoItems")[0] else { panic!() };
    let mut properties: Vec<&str> = affected.iter().map(|(rel, _)| rel.property.as_str()).collect();
    properties.sort();
    assert_eq!(properties, vec!["one_to_one_person", "owner"]);
    assert_eq!(affected.ids(), BTreeSet::from(["1".to_string(), "2".to_string()]));

    let succeeded = repo.delete(&people, "1").await.unwrap();
    executor.after_delete(&kept, ResourcePipeline::Delete, succeeded).await.unwrap();
    let sequence = journal.sequence();
    assert_eq!(sequence[sequence.len() - 2], ("people".to_string(), ResourceHook::AfterDelete));
    assert_eq!(
        sequence[sequence.len() - 1],
        ("todoItems".to_string(), ResourceHook::AfterImplicitUpdateRelationship)
    );
}

#[tokio::test]
async fn failed_delete_skips_implicit_after_hooks() {
    let graph = graph();
    let repo = seeded(&graph).await;
    let journal = Journal::default();
    let hooks = registry(vec![Recorder::new("todoItems", &journal), Recorder::new("people", &journal)]);
    let mut executor = ResourceHookExecutor::new(Arc::clone(&graph), hooks).with_repository(repo);

    let kept = executor
        .before_delete(vec![Resource::new("people", "1")], ResourcePipeline::Delete)
        .await
        .unwrap();
    executor.after_delete(&kept, ResourcePipeline::Delete, false).await.unwrap();

    let Some(Call::AfterDelete(_, succeeded)) = journal.calls("people").last().cloned() else { panic!() };
    assert!(!succeeded);
    assert!(!journal
        .sequence()
        .contains(&("todoItems".to_string(), ResourceHook::AfterImplicitUpdateRelationship)));
}

#[tokio::test]
async fn create_has_no_stored_state_to_compare() {
    let graph = graph();
    let repo = seeded(&graph).await;
    let journal = Journal::default();
    let hooks = registry(vec![Recorder::new("todoItems", &journal), Recorder::new("people", &journal)]);
    let mut executor = ResourceHookExecutor::new(Arc::clone(&graph), hooks).with_repository(repo);

    let request = Resource::transient("todoItems")
        .with_attribute("description", "new")
        .with_to_one("one_to_one_person", Some(Resource::new("people", "1")));
    executor.before_create(vec![request], ResourcePipeline::Post).await.unwrap();

    assert_eq!(
        journal.sequence(),
        vec![
            ("todoItems".to_string(), ResourceHook::BeforeCreate),
            ("people".to_string(), ResourceHook::BeforeUpdateRelationship),
            ("todoItems".to_string(), ResourceHook::BeforeImplicitUpdateRelationship),
        ]
    );
    assert!(journal.pipelines().iter().all(|p| *p == ResourcePipeline::Post));
}

#[tokio::test]
async fn relationship_data_stays_untouched_without_hooks() {
    let graph = graph();
    let hooks = registry(Vec::new());
    let mut executor = ResourceHookExecutor::new(Arc::clone(&graph), hooks);
    let request = relink_request();
    let kept = executor
        .before_update(vec![request.clone()], ResourcePipeline::Patch)
        .await
        .unwrap();
    assert_eq!(kept, vec![request]);
    assert!(matches!(kept[0].related("one_to_one_person"), Some(RelationshipData::ToOne(Some(_)))));
}

#[tokio::test]
async fn moving_an_owner_reports_the_previous_owner_with_stored_state() {
    let graph = graph();
    let repo = seeded(&graph).await;
    let journal = Journal::default();
    let hooks = registry(vec![Recorder::new("people", &journal)]);
    let mut executor = ResourceHookExecutor::new(Arc::clone(&graph), hooks).with_repository(repo);

    let request = Resource::new("todoItems", "1").with_to_one("owner", Some(Resource::new("people", "2")));
    executor.before_update(vec![request], ResourcePipeline::Patch).await.unwrap();

    let calls = journal.calls("people");
    assert_eq!(calls.len(), 2);
    let Call::BeforeUpdateRelationship(rel_ids, explicit) = &calls[0] else { panic!("expected BeforeUpdateRelationship") };
    assert_eq!(rel_ids, &BTreeSet::from(["2".to_string()]));
    assert_eq!(explicit.get("todo_items").unwrap()[0].resource.attribute("last_name"), Some(&json!("Previous")));

    let Call::BeforeImplicitUpdateRelationship(implicit) = &calls[1] else { panic!("expected implicit hook") };
    assert_eq!(implicit.ids(), BTreeSet::from(["1".to_string()]));
    let previous = implicit.get("todo_items").unwrap();
    assert_eq!(previous[0].resource.attribute("last_name"), Some(&json!("Target")));
    assert_eq!(previous[0].triggered_by[0].id.as_deref(), Some("1"));
}

#[tokio::test]
async fn relinking_without_an_inverse_fires_no_implicit_hooks() {
    let graph = graph();
    let repo = seeded(&graph).await;
    let todo_items = graph.resource_context("todoItems").unwrap();
    let assignee = todo_items.relationship("assignee").unwrap();
    let first = RelationshipData::ToOne(Some(Box::new(Resource::new("people", "1"))));
    assert!(repo.replace_relationship(todo_items, "1", assignee, &first).await.unwrap());

    let journal = Journal::default();
    let hooks = registry(vec![Recorder::new("people", &journal)]);
    let mut executor = ResourceHookExecutor::new(Arc::clone(&graph), hooks).with_repository(repo);

    let request = Resource::new("todoItems", "1").with_to_one("assignee", Some(Resource::new("people", "2")));
    executor.before_update(vec![request.clone()], ResourcePipeline::Patch).await.unwrap();
    executor.after_update(&[request], ResourcePipeline::Patch).await.unwrap();

    assert_eq!(
        journal.sequence(),
        vec![("people".to_string(), ResourceHook::BeforeUpdateRelationship)]
    );
    let Call::BeforeUpdateRelationship(rel_ids, explicit) = &journal.calls("people")[0] else { panic!() };
    assert_eq!(rel_ids, &BTreeSet::from(["2".to_string()]));
    assert!(explicit.is_empty());
}
