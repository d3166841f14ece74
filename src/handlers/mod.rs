//! HTTP handlers for resource and relationship endpoints.

pub mod resource;
pub use resource::*;
