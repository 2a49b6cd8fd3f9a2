//! Package repository manager.
//!
//! Parses `"type:location"` strings, memoizes one repository instance per
//! normalized URI, and routes resource handles to the repository that owns
//! them. One manager owns one shared [`ResourcePool`]; the process-wide
//! instance is [`RepositoryManager::global`], but tests construct their own
//! isolated managers.

use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};

use pkgrepo_schema::ResourceHandle;
use tracing::debug;

use crate::config::Config;
use crate::pool::ResourcePool;
use crate::registry::PluginRegistry;
use crate::repository::{PackageRepository, RepositoryError};
use crate::resource::{Resource, ResourceError};

/// Repository type assumed for paths with no `"type:"` prefix.
pub const DEFAULT_REPOSITORY_TYPE: &str = "filesystem";

static GLOBAL_MANAGER: LazyLock<RepositoryManager> =
    LazyLock::new(|| RepositoryManager::new(&Config::from_env()));

/// Instantiates, caches, and routes to [`PackageRepository`] instances.
pub struct RepositoryManager {
    pool: Arc<ResourcePool>,
    registry: Arc<PluginRegistry>,
    repositories: Mutex<HashMap<String, Arc<dyn PackageRepository>>>,
}

impl fmt::Debug for RepositoryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let uris: Vec<String> = self
            .repositories
            .lock()
            .expect("repository cache poisoned")
            .keys()
            .cloned()
            .collect();
        f.debug_struct("RepositoryManager")
            .field("repositories", &uris)
            .field("pool", &self.pool.stats())
            .finish_non_exhaustive()
    }
}

impl RepositoryManager {
    /// Manager with the built-in plugins and a pool sized from `config`.
    pub fn new(config: &Config) -> Self {
        Self::with_registry(config, Arc::new(PluginRegistry::builtin()))
    }

    /// Manager over a caller-supplied plugin registry.
    pub fn with_registry(config: &Config, registry: Arc<PluginRegistry>) -> Self {
        Self {
            pool: Arc::new(ResourcePool::new(config.cache_size())),
            registry,
            repositories: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide manager, constructed lazily from the environment on
    /// first use.
    pub fn global() -> &'static Self {
        &GLOBAL_MANAGER
    }

    /// The resource pool shared by every repository this manager creates.
    pub fn pool(&self) -> &Arc<ResourcePool> {
        &self.pool
    }

    /// The plugin registry this manager resolves types through.
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Get the repository for a path.
    ///
    /// `path` is either a bare location (implying the `filesystem` type) or
    /// a `"type:location"` string. Filesystem locations are canonicalized
    /// before use, so two spellings of the same directory return the same
    /// instance. For any normalized URI at most one repository is ever
    /// constructed until [`clear_caches`](Self::clear_caches).
    pub fn get_repository(
        &self,
        path: &str,
    ) -> Result<Arc<dyn PackageRepository>, RepositoryError> {
        let (repo_type, location) = split_path(path);
        let location = if repo_type == DEFAULT_REPOSITORY_TYPE {
            normalize_filesystem_location(location)
        } else {
            location.to_string()
        };
        let uri = format!("{repo_type}:{location}");

        // Repository constructors are I/O-free by contract, so building
        // under the cache lock keeps at-most-one construction per URI.
        let mut repositories = self.repositories.lock().expect("repository cache poisoned");
        if let Some(repo) = repositories.get(&uri) {
            return Ok(Arc::clone(repo));
        }
        let factory = self.registry.get(repo_type)?;
        let repo = factory(location, Arc::clone(&self.pool))?;
        debug!(%uri, "created repository");
        repositories.insert(uri, Arc::clone(&repo));
        Ok(repo)
    }

    /// Resolve a resource handle via the repository that owns it.
    pub fn get_resource(&self, handle: &ResourceHandle) -> Result<Resource, RepositoryError> {
        let repo_type = handle.repository_type().map_err(ResourceError::Handle)?;
        let location = handle.location().map_err(ResourceError::Handle)?;
        let path = format!("{repo_type}:{location}");

        let repo = self.get_repository(&path)?;
        Ok(repo.get_resource(handle)?)
    }

    /// Drop all cached repository instances and pooled resources; the next
    /// access reconstructs everything from scratch.
    pub fn clear_caches(&self) {
        let mut repositories = self.repositories.lock().expect("repository cache poisoned");
        let dropped = repositories.len();
        repositories.clear();
        drop(repositories);
        self.pool.clear_caches();
        debug!(dropped, "cleared repository caches");
    }
}

fn split_path(path: &str) -> (&str, &str) {
    match path.split_once(':') {
        Some((repo_type, location)) => (repo_type, location),
        None => (DEFAULT_REPOSITORY_TYPE, path),
    }
}

/// Canonicalize a filesystem location: resolve symlinks where the path
/// exists, otherwise fall back to a lexical cleanup against the current
/// directory. The same logical location always yields the same string.
fn normalize_filesystem_location(location: &str) -> String {
    let path = Path::new(location);
    match std::fs::canonicalize(path) {
        Ok(real) => real.to_string_lossy().into_owned(),
        Err(_) => lexical_normalize(path).to_string_lossy().into_owned(),
    }
}

fn lexical_normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_paths_default_to_filesystem() {
        assert_eq!(split_path("/packages"), ("filesystem", "/packages"));
        assert_eq!(split_path("memory:site"), ("memory", "site"));
        assert_eq!(
            split_path("filesystem:/a/b"),
            ("filesystem", "/a/b")
        );
    }

    #[test]
    fn lexical_normalization_collapses_dots() {
        assert_eq!(
            lexical_normalize(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
        assert_eq!(lexical_normalize(Path::new("/../x")), PathBuf::from("/x"));
    }

    #[test]
    fn unknown_plugin_is_rejected() {
        let manager = RepositoryManager::new(&Config::default());
        assert!(matches!(
            manager.get_repository("bogus:/tmp"),
            Err(RepositoryError::UnknownPlugin(name)) if name == "bogus"
        ));
    }

    #[test]
    fn same_uri_returns_the_same_instance() {
        let manager = RepositoryManager::new(&Config::default());
        let a = manager.get_repository("memory:site").unwrap();
        let b = manager.get_repository("memory:site").unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let other = manager.get_repository("memory:elsewhere").unwrap();
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[test]
    fn clear_caches_forces_new_instances() {
        let manager = RepositoryManager::new(&Config::default());
        let before = manager.get_repository("memory:site").unwrap();
        manager.clear_caches();
        let after = manager.get_repository("memory:site").unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn global_manager_is_one_instance() {
        let a = RepositoryManager::global();
        let b = RepositoryManager::global();
        assert!(std::ptr::eq(a, b));
    }
}
