//! Request pipeline: validation, hooks, and repository writes for one declared graph.

mod resource;
mod validation;
pub use resource::ResourceService;
pub use validation::{RequestValidator, RequiredGate, ValidationPass};
