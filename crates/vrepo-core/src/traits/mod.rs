//! Traits defined in `vrepo-core` and implemented by other crates.

pub mod cache;
pub mod content_type;

pub use cache::CacheProvider;
pub use content_type::{ContentTypeResolver, is_text_content_type};
