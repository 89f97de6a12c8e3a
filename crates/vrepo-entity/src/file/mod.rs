//! Resource and version entities.

pub mod model;
pub mod version;

pub use model::{Resource, ResourceMeta};
pub use version::FileVersion;
