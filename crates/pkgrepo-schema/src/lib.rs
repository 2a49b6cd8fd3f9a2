//! Shared identity types for the pkgrepo repository layer.
//!
//! This crate defines the vocabulary the repository abstraction speaks:
//! normalized package names and versions, the immutable [`ResourceHandle`]
//! used as a cache key, and the opaque [`StateHandle`] staleness token.
//! It carries no I/O and no caching policy.

pub mod handle;
pub mod state;
pub mod types;

// Re-exports
pub use handle::{AttrValue, HandleError, ResourceHandle, ResourceHandleBuilder};
pub use state::StateHandle;
pub use types::{PackageName, Version};

/// Handle variable naming the repository type that owns a resource.
pub const ATTR_REPOSITORY_TYPE: &str = "repository_type";

/// Handle variable naming the owning repository's location.
pub const ATTR_LOCATION: &str = "location";

/// Handle variable naming a package family or package.
pub const ATTR_NAME: &str = "name";

/// Handle variable naming a package version.
pub const ATTR_VERSION: &str = "version";

/// Handle variable carrying a variant's index within its package.
pub const ATTR_INDEX: &str = "index";
