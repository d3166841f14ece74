//! Resource hooks: discovery, diffing, and the executor that fires them in order.

pub mod affected;
pub mod diff;
pub mod discovery;
pub mod executor;
pub mod handler;
pub mod kind;
pub(crate) mod traversal;

pub use affected::{AffectedEntry, AffectedRelationships};
pub use diff::{AttributeChange, EntityDiff};
pub use discovery::{HookDiscovery, HookRegistry};
pub use executor::{PassState, ResourceHookExecutor};
pub use handler::ResourceHooks;
pub use kind::{HookSet, ResourceHook, ResourcePipeline};
