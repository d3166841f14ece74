//! Hook kinds and the pipelines that trigger them.

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceHook {
    BeforeCreate,
    AfterCreate,
    BeforeUpdate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
    BeforeUpdateRelationship,
    AfterUpdateRelationship,
    BeforeImplicitUpdateRelationship,
    AfterImplicitUpdateRelationship,
}

impl ResourceHook {
    pub const ALL: [ResourceHook; 10] = [
        ResourceHook::BeforeCreate,
        ResourceHook::AfterCreate,
        ResourceHook::BeforeUpdate,
        ResourceHook::AfterUpdate,
        ResourceHook::BeforeDelete,
        ResourceHook::AfterDelete,
        ResourceHook::BeforeUpdateRelationship,
        ResourceHook::AfterUpdateRelationship,
        ResourceHook::BeforeImplicitUpdateRelationship,
        ResourceHook::AfterImplicitUpdateRelationship,
    ];

    pub fn is_implicit(&self) -> bool {
        matches!(
            self,
            ResourceHook::BeforeImplicitUpdateRelationship | ResourceHook::AfterImplicitUpdateRelationship
        )
    }

    fn bit(&self) -> u16 {
        1 << (*self as u16)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceHook::BeforeCreate => "before_create",
            ResourceHook::AfterCreate => "after_create",
            ResourceHook::BeforeUpdate => "before_update",
            ResourceHook::AfterUpdate => "after_update",
            ResourceHook::BeforeDelete => "before_delete",
            ResourceHook::AfterDelete => "after_delete",
            ResourceHook::BeforeUpdateRelationship => "before_update_relationship",
            ResourceHook::AfterUpdateRelationship => "after_update_relationship",
            ResourceHook::BeforeImplicitUpdateRelationship => "before_implicit_update_relationship",
            ResourceHook::AfterImplicitUpdateRelationship => "after_implicit_update_relationship",
        }
    }
}

impl fmt::Display for ResourceHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compact set of hook kinds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HookSet(u16);

impl HookSet {
    pub const fn empty() -> Self {
        HookSet(0)
    }

    pub fn all() -> Self {
        ResourceHook::ALL.iter().copied().collect()
    }

    pub fn insert(&mut self, hook: ResourceHook) {
        self.0 |= hook.bit();
    }

    pub fn remove(&mut self, hook: ResourceHook) {
        self.0 &= !hook.bit();
    }

    pub fn contains(&self, hook: ResourceHook) -> bool {
        self.0 & hook.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = ResourceHook> + '_ {
        ResourceHook::ALL.iter().copied().filter(move |h| self.contains(*h))
    }
}

impl FromIterator<ResourceHook> for HookSet {
    fn from_iter<I: IntoIterator<Item = ResourceHook>>(iter: I) -> Self {
        let mut set = HookSet::empty();
        for hook in iter {
            set.insert(hook);
        }
        set
    }
}

impl<const N: usize> From<[ResourceHook; N]> for HookSet {
    fn from(hooks: [ResourceHook; N]) -> Self {
        hooks.into_iter().collect()
    }
}

/// The request pipeline a hook pass runs for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourcePipeline {
    Post,
    Patch,
    /// PATCH on `/{type}/{id}/relationships/{relationship}`.
    PatchRelationship,
    Delete,
}

impl ResourcePipeline {
    /// Pipelines whose primary resources already exist in storage.
    pub fn targets_existing(&self) -> bool {
        !matches!(self, ResourcePipeline::Post)
    }
}
