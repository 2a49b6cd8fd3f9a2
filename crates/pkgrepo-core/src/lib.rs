//! pkgrepo - package repository abstraction layer
//!
//! Models heterogeneous backends that store versioned package metadata
//! (families → packages → variants) behind one iteration/lookup contract,
//! and caches materialized resources in a pool shared across all
//! repositories.
//!
//! # Architecture
//!
//! - **Handles as identity**: every repository entity is addressed by an
//!   immutable [`ResourceHandle`](pkgrepo_schema::ResourceHandle); equal
//!   handles resolve to the same cached resource.
//! - **Plugin dispatch**: backends implement the
//!   [`PackageRepository`](repository::PackageRepository) trait and are
//!   created through the [`PluginRegistry`](registry::PluginRegistry) by
//!   type name.
//! - **One pool per manager**: the
//!   [`RepositoryManager`](manager::RepositoryManager) owns the sole
//!   [`ResourcePool`](pool::ResourcePool) and memoizes one repository per
//!   normalized `"type:location"` URI.

pub mod backend;
pub mod config;
pub mod manager;
pub mod package;
pub mod pool;
pub mod registry;
pub mod repository;
pub mod resource;

// Re-exports
pub use backend::{FileSystemRepository, MemoryRepository};
pub use config::Config;
pub use manager::RepositoryManager;
pub use package::{PackageData, PackageDataError};
pub use pool::{PoolStats, ResourcePool};
pub use registry::{PluginRegistry, RepositoryFactory};
pub use repository::{PackageRepository, RepositoryError, RepositoryUid};
pub use resource::{
    FamilyResource, PackageResource, Resource, ResourceError, ResourceType, VariantResource,
};

// Re-exports from the schema crate for convenience
pub use pkgrepo_schema::{AttrValue, PackageName, ResourceHandle, StateHandle, Version};

/// The available package repository types, as registered in the built-in
/// plugin registry.
pub fn package_repository_types() -> Vec<String> {
    PluginRegistry::builtin().plugin_names()
}
