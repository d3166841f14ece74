//! Hook discovery: which hooks each resource type implements, declared once at registration.

use crate::config::JsonApiOptions;
use crate::hooks::{HookSet, ResourceHook, ResourceHooks};
use std::collections::HashMap;
use std::sync::Arc;

/// Capability descriptor of one resource type's hook handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HookDiscovery {
    pub enabled: HookSet,
    /// Hooks that receive database state instead of request state. `None` defers to [`JsonApiOptions::load_database_values`].
    pub database_values: Option<HookSet>,
    /// When false, implicit relationship hooks never fire for this type even if listed in `enabled`.
    pub allow_implicit: bool,
}

impl Default for HookDiscovery {
    fn default() -> Self {
        HookDiscovery {
            enabled: HookSet::empty(),
            database_values: None,
            allow_implicit: true,
        }
    }
}

impl HookDiscovery {
    pub fn new(enabled: impl Into<HookSet>) -> Self {
        HookDiscovery {
            enabled: enabled.into(),
            ..Default::default()
        }
    }

    /// No hooks at all.
    pub fn none() -> Self {
        HookDiscovery::default()
    }

    pub fn with_database_values(mut self, hooks: impl Into<HookSet>) -> Self {
        self.database_values = Some(hooks.into());
        self
    }

    pub fn without_implicit_hooks(mut self) -> Self {
        self.allow_implicit = false;
        self
    }

    pub fn is_enabled(&self, hook: ResourceHook) -> bool {
        self.enabled.contains(hook) && (self.allow_implicit || !hook.is_implicit())
    }

    pub fn loads_database_values(&self, hook: ResourceHook) -> bool {
        self.is_enabled(hook) && self.database_values.map(|s| s.contains(hook)).unwrap_or(false)
    }

    pub fn has_any(&self) -> bool {
        self.enabled.iter().any(|h| self.is_enabled(h))
    }

    fn with_default_database_values(mut self, load_by_default: bool) -> Self {
        if self.database_values.is_none() {
            self.database_values = Some(if load_by_default { self.enabled } else { HookSet::empty() });
        }
        self
    }
}

struct RegisteredHooks {
    handler: Arc<dyn ResourceHooks>,
    discovery: HookDiscovery,
}

/// Hook handlers by resource type. Built at startup, read-only afterwards.
#[derive(Default)]
pub struct HookRegistry {
    entries: HashMap<String, RegisteredHooks>,
    load_database_values: bool,
}

impl HookRegistry {
    pub fn new() -> Self {
        HookRegistry::default()
    }

    pub fn with_options(options: &JsonApiOptions) -> Self {
        HookRegistry {
            entries: HashMap::new(),
            load_database_values: options.load_database_values,
        }
    }

    /// Register a handler using the capabilities it declares.
    pub fn register(&mut self, resource_type: &str, handler: Arc<dyn ResourceHooks>) {
        let discovery = handler.discovery();
        self.register_with(resource_type, handler, discovery);
    }

    /// Register a handler with an explicit capability descriptor.
    pub fn register_with(&mut self, resource_type: &str, handler: Arc<dyn ResourceHooks>, discovery: HookDiscovery) {
        let discovery = discovery.with_default_database_values(self.load_database_values);
        tracing::debug!(
            resource_type = %resource_type,
            hooks = ?discovery.enabled.iter().collect::<Vec<_>>(),
            allow_implicit = discovery.allow_implicit,
            "registered resource hooks"
        );
        self.entries
            .insert(resource_type.to_string(), RegisteredHooks { handler, discovery });
    }

    /// Capabilities of `resource_type`; unregistered types have none. Never fails.
    pub fn discover(&self, resource_type: &str) -> HookDiscovery {
        self.entries
            .get(resource_type)
            .map(|e| e.discovery)
            .unwrap_or_else(|| HookDiscovery::none().with_default_database_values(false))
    }

    /// Handler for `resource_type` when it has `hook` enabled.
    pub fn handler_for(&self, resource_type: &str, hook: ResourceHook) -> Option<&Arc<dyn ResourceHooks>> {
        let entry = self.entries.get(resource_type)?;
        entry.discovery.is_enabled(hook).then_some(&entry.handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait::async_trait]
    impl ResourceHooks for Noop {
        fn discovery(&self) -> HookDiscovery {
            HookDiscovery::new([ResourceHook::BeforeUpdate, ResourceHook::BeforeImplicitUpdateRelationship])
        }
    }

    #[test]
    fn unregistered_type_discovers_nothing() {
        let registry = HookRegistry::new();
        let d = registry.discover("people");
        assert!(!d.has_any());
        assert!(registry.handler_for("people", ResourceHook::BeforeUpdate).is_none());
    }

    #[test]
    fn implicit_hooks_can_be_opted_out() {
        let d = HookDiscovery::new([ResourceHook::BeforeImplicitUpdateRelationship]).without_implicit_hooks();
        assert!(!d.is_enabled(ResourceHook::BeforeImplicitUpdateRelationship));
        assert!(!d.has_any());
    }

    #[test]
    fn database_values_default_follows_options() {
        let options = JsonApiOptions {
            load_database_values: true,
            ..Default::default()
        };
        let mut registry = HookRegistry::with_options(&options);
        registry.register("todoItems", Arc::new(Noop));
        let d = registry.discover("todoItems");
        assert!(d.loads_database_values(ResourceHook::BeforeUpdate));
        assert!(!d.loads_database_values(ResourceHook::AfterUpdate));

        let mut registry = HookRegistry::new();
        registry.register("todoItems", Arc::new(Noop));
        assert!(!registry.discover("todoItems").loads_database_values(ResourceHook::BeforeUpdate));
    }

    #[test]
    fn explicit_database_values_override_options() {
        let options = JsonApiOptions {
            load_database_values: true,
            ..Default::default()
        };
        let mut registry = HookRegistry::with_options(&options);
        registry.register_with(
            "people",
            Arc::new(Noop),
            HookDiscovery::new([ResourceHook::BeforeUpdate]).with_database_values(HookSet::empty()),
        );
        assert!(!registry.discover("people").loads_database_values(ResourceHook::BeforeUpdate));
    }
}
