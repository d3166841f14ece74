//! Request extractors.

mod media_type;
pub use media_type::JsonApiBody;
