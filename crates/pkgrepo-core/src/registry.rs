//! Plugin registry: repository type names to backend factories.
//!
//! The manager resolves `"type:location"` URIs through this registry. The
//! two built-in backends are pre-registered by [`PluginRegistry::builtin`];
//! additional backends register a factory under a unique type name.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::backend::{FileSystemRepository, MemoryRepository};
use crate::pool::ResourcePool;
use crate::repository::{PackageRepository, RepositoryError};

/// Factory producing a repository bound to a location and the shared pool.
pub type RepositoryFactory = Arc<
    dyn Fn(String, Arc<ResourcePool>) -> Result<Arc<dyn PackageRepository>, RepositoryError>
        + Send
        + Sync,
>;

/// Maps backend type names to their repository factories.
pub struct PluginRegistry {
    factories: RwLock<HashMap<String, RepositoryFactory>>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.plugin_names())
            .finish_non_exhaustive()
    }
}

impl PluginRegistry {
    /// A registry with no plugins; for isolated tests.
    pub fn empty() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// A registry with the built-in `filesystem` and `memory` backends.
    pub fn builtin() -> Self {
        let registry = Self::empty();
        registry
            .register("filesystem", Arc::new(FileSystemRepository::factory))
            .expect("builtin plugin names are unique");
        registry
            .register("memory", Arc::new(MemoryRepository::factory))
            .expect("builtin plugin names are unique");
        registry
    }

    /// Register a backend factory under a type name.
    ///
    /// Names must be unique; registering an existing name fails with
    /// [`RepositoryError::DuplicatePlugin`].
    pub fn register(&self, name: &str, factory: RepositoryFactory) -> Result<(), RepositoryError> {
        let mut factories = self.factories.write().expect("plugin registry poisoned");
        if factories.contains_key(name) {
            return Err(RepositoryError::DuplicatePlugin(name.to_string()));
        }
        debug!(name, "registered repository plugin");
        factories.insert(name.to_string(), factory);
        Ok(())
    }

    /// Look up the factory for a type name.
    pub fn get(&self, name: &str) -> Result<RepositoryFactory, RepositoryError> {
        self.factories
            .read()
            .expect("plugin registry poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| RepositoryError::UnknownPlugin(name.to_string()))
    }

    /// All registered type names, sorted for deterministic output.
    pub fn plugin_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .factories
            .read()
            .expect("plugin registry poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_backends_are_registered() {
        let registry = PluginRegistry::builtin();
        assert_eq!(registry.plugin_names(), vec!["filesystem", "memory"]);
        assert!(registry.get("memory").is_ok());
    }

    #[test]
    fn unknown_plugin_is_an_error() {
        let registry = PluginRegistry::builtin();
        assert!(matches!(
            registry.get("bogus"),
            Err(RepositoryError::UnknownPlugin(name)) if name == "bogus"
        ));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = PluginRegistry::builtin();
        let result = registry.register("memory", Arc::new(MemoryRepository::factory));
        assert!(matches!(
            result,
            Err(RepositoryError::DuplicatePlugin(name)) if name == "memory"
        ));
    }
}
