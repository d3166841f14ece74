//! Entity diff: request state paired with stored state for the primary resources of one pass.

use crate::error::HookError;
use crate::resource::Resource;
use serde_json::Value;

/// One attribute the request sets, with the stored value it replaces.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeChange<'a> {
    pub attribute: &'a str,
    pub old: Option<&'a Value>,
    pub new: &'a Value,
}

/// Request resources and their stored counterparts, index-aligned.
///
/// `database` is `None` when the handler did not ask for database values. Inside it, `None` marks a
/// resource that does not exist yet (being created).
#[derive(Clone, Debug)]
pub struct EntityDiff {
    request: Vec<Resource>,
    database: Option<Vec<Option<Resource>>>,
}

impl EntityDiff {
    pub fn new(request: Vec<Resource>, database: Option<Vec<Option<Resource>>>) -> Result<Self, HookError> {
        if let Some(db) = &database {
            if db.len() != request.len() {
                return Err(HookError::GraphConsistency(format!(
                    "diff length mismatch: {} request vs {} database entities",
                    request.len(),
                    db.len()
                )));
            }
            for (req, stored) in request.iter().zip(db) {
                if let Some(stored) = stored {
                    if stored.key() != req.key() {
                        return Err(HookError::GraphConsistency(format!(
                            "diff identity mismatch: {} vs {}",
                            req.key(),
                            stored.key()
                        )));
                    }
                }
            }
        }
        Ok(EntityDiff { request, database })
    }

    /// Diff for resources being created: every stored counterpart is absent.
    pub fn creating(request: Vec<Resource>) -> Self {
        let database = Some(vec![None; request.len()]);
        EntityDiff { request, database }
    }

    /// Align `request` with stored resources found by `lookup`.
    pub fn from_lookup(request: Vec<Resource>, mut lookup: impl FnMut(&Resource) -> Option<Resource>) -> Self {
        let database = Some(request.iter().map(|r| lookup(r)).collect());
        EntityDiff { request, database }
    }

    pub fn request_entities(&self) -> &[Resource] {
        &self.request
    }

    pub fn request_entities_mut(&mut self) -> &mut [Resource] {
        &mut self.request
    }

    pub fn database_entities(&self) -> Option<&[Option<Resource>]> {
        self.database.as_deref()
    }

    pub fn len(&self) -> usize {
        self.request.len()
    }

    pub fn is_empty(&self) -> bool {
        self.request.is_empty()
    }

    /// (request, stored) pairs. Stored is `None` when absent or not loaded.
    pub fn pairs(&self) -> impl Iterator<Item = (&Resource, Option<&Resource>)> {
        self.request.iter().enumerate().map(move |(i, r)| {
            let stored = self.database.as_ref().and_then(|db| db[i].as_ref());
            (r, stored)
        })
    }

    /// Attributes the request at `index` sets to a value different from the stored one.
    pub fn changed_attributes(&self, index: usize) -> Vec<AttributeChange<'_>> {
        let Some(req) = self.request.get(index) else {
            return Vec::new();
        };
        let stored = self
            .database
            .as_ref()
            .and_then(|db| db.get(index))
            .and_then(|s| s.as_ref());
        req.attributes
            .iter()
            .filter_map(|(name, new)| {
                let old = stored.and_then(|s| s.attributes.get(name));
                (old != Some(new)).then_some(AttributeChange {
                    attribute: name.as_str(),
                    old,
                    new,
                })
            })
            .collect()
    }

    pub fn into_request_entities(self) -> Vec<Resource> {
        self.request
    }
}
