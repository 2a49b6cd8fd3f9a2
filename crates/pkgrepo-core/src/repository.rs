//! The abstract package repository contract.
//!
//! Backends implement [`PackageRepository`] and are instantiated through the
//! plugin registry. The trait owns no storage policy: it defines the
//! iteration/lookup surface the rest of the system depends on, plus
//! capability-optional operations with "unsupported" defaults.

use std::path::PathBuf;
use std::sync::Arc;

use pkgrepo_schema::{PackageName, ResourceHandle, StateHandle};
use thiserror::Error;

use crate::package::PackageDataError;
use crate::pool::ResourcePool;
use crate::resource::{
    FamilyResource, PackageResource, Resource, ResourceError, ResourceType, VariantResource,
};

/// Errors surfaced by repository operations and the manager/registry layer.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// The requested repository type has no registered implementation.
    #[error("unknown repository type '{0}'")]
    UnknownPlugin(String),

    /// A plugin with this type name is already registered.
    #[error("repository type '{0}' is already registered")]
    DuplicatePlugin(String),

    /// The backend does not support an optional operation.
    #[error("'{operation}' is not supported by '{repository_type}' repositories")]
    Unsupported {
        /// The operation that was requested.
        operation: &'static str,
        /// Type name of the backend that lacks it.
        repository_type: &'static str,
    },

    /// Resource materialization failed.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// A package definition on storage could not be parsed.
    #[error("invalid package definition at {path}: {source}")]
    Definition {
        /// Path of the offending definition.
        path: PathBuf,
        /// Underlying parse failure.
        source: PackageDataError,
    },

    /// Backend I/O failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A hashable value uniquely identifying one repository among all others.
///
/// The default form combines type name and location. Backends whose
/// locations are ambiguous across hosts or users (local filesystem paths,
/// typically) add a disambiguating token such as a device/inode pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepositoryUid {
    repository_type: String,
    location: String,
    token: Option<u64>,
}

impl RepositoryUid {
    /// Uid from type name and location alone.
    pub fn new(repository_type: &str, location: &str) -> Self {
        Self {
            repository_type: repository_type.to_string(),
            location: location.to_string(),
            token: None,
        }
    }

    /// Uid carrying an extra disambiguating token.
    pub fn with_token(repository_type: &str, location: &str, token: u64) -> Self {
        Self {
            token: Some(token),
            ..Self::new(repository_type, location)
        }
    }

    /// The repository type name.
    pub fn repository_type(&self) -> &str {
        &self.repository_type
    }

    /// The repository location.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// The disambiguating token, if the backend supplied one.
    pub fn token(&self) -> Option<u64> {
        self.token
    }

    /// The normalized `"type:location"` URI for this repository.
    pub fn uri(&self) -> String {
        format!("{}:{}", self.repository_type, self.location)
    }
}

impl std::fmt::Display for RepositoryUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.token {
            Some(token) => write!(f, "{}:{}#{token}", self.repository_type, self.location),
            None => write!(f, "{}:{}", self.repository_type, self.location),
        }
    }
}

/// Lazy sequence of family resources; no ordering contract.
pub type FamilyIter<'a> =
    Box<dyn Iterator<Item = Result<Arc<FamilyResource>, RepositoryError>> + 'a>;

/// Lazy sequence of package resources; no ordering contract.
pub type PackageIter<'a> =
    Box<dyn Iterator<Item = Result<Arc<PackageResource>, RepositoryError>> + 'a>;

/// Lazy sequence of variant resources; no ordering contract.
pub type VariantIter<'a> =
    Box<dyn Iterator<Item = Result<Arc<VariantResource>, RepositoryError>> + 'a>;

/// A package repository backend.
///
/// Implementations bind a location string to the shared [`ResourcePool`] at
/// construction time and register their resource types with it; the
/// constructor performs no I/O. Lookups that find nothing return `Ok(None)`
/// rather than an error; operations a backend cannot provide return
/// [`RepositoryError::Unsupported`].
pub trait PackageRepository: Send + Sync {
    /// Identifier of this backend type (e.g. `"filesystem"`). Unique across
    /// registered plugins.
    fn type_name(&self) -> &'static str;

    /// The location string this repository is bound to.
    fn location(&self) -> &str;

    /// The shared resource pool this repository materializes through.
    fn pool(&self) -> &Arc<ResourcePool>;

    /// Unique identifier for this repository, computed once per instance.
    fn uid(&self) -> &RepositoryUid;

    /// Downcast support for backend-specific APIs (test ingestion, mostly).
    fn as_any(&self) -> &dyn std::any::Any;

    /// Register a resource type with the bound pool.
    ///
    /// Backends call this (or the pool directly) while constructing, once
    /// per resource type they own; registration is idempotent.
    fn register_resource(&self, resource_type: ResourceType) {
        self.pool().register_resource(resource_type);
    }

    /// Look up a package family by name; `None` if absent.
    fn get_package_family(
        &self,
        name: &PackageName,
    ) -> Result<Option<Arc<FamilyResource>>, RepositoryError>;

    /// Iterate over the package families in the repository.
    fn iter_package_families(&self) -> Result<FamilyIter<'_>, RepositoryError>;

    /// Iterate over the packages within the given family.
    fn iter_packages(&self, family: &FamilyResource) -> Result<PackageIter<'_>, RepositoryError>;

    /// Iterate over the variants within the given package.
    fn iter_variants(&self, package: &PackageResource)
    -> Result<VariantIter<'_>, RepositoryError>;

    /// The family a package was iterated from. Consistent with
    /// [`iter_packages`](Self::iter_packages): the returned resource is the
    /// identical cached object.
    fn get_parent_package_family(
        &self,
        package: &PackageResource,
    ) -> Result<Arc<FamilyResource>, RepositoryError>;

    /// The package a variant was iterated from.
    fn get_parent_package(
        &self,
        variant: &VariantResource,
    ) -> Result<Arc<PackageResource>, RepositoryError>;

    /// Load an in-progress package from a working directory, before it has
    /// been installed or released. Most backends do not implement this.
    fn get_developer_package(&self) -> Result<Arc<PackageResource>, RepositoryError> {
        Err(RepositoryError::Unsupported {
            operation: "get_developer_package",
            repository_type: self.type_name(),
        })
    }

    /// An opaque staleness token for the variant, or `None` where the
    /// backend has no notion of state. Recomputed on every call, never
    /// cached: the value exists to detect change.
    fn get_variant_state_handle(
        &self,
        _variant: &VariantResource,
    ) -> Result<Option<StateHandle>, RepositoryError> {
        Ok(None)
    }

    /// Epoch seconds of the last mutation to the given family, or `0` if
    /// unknown. Recomputed on every call, never cached.
    fn get_last_release_time(&self, _family: &FamilyResource) -> Result<u64, RepositoryError> {
        Ok(0)
    }

    /// Resolve a handle through the shared pool and stamp the resulting
    /// resource with a non-owning back-reference to this repository.
    fn get_resource(&self, handle: &ResourceHandle) -> Result<Resource, ResourceError> {
        let resource = self.pool().get_resource_from_handle(handle)?;
        resource.attach_repository(self.uid().clone());
        Ok(resource)
    }
}
