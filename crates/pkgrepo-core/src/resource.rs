//! Materialized resources and the registrable types that build them.
//!
//! Resources are identity objects: their defining attributes live in the
//! [`ResourceHandle`] they were built from, and the shared pool guarantees
//! one materialized object per distinct handle. After construction the
//! owning repository stamps a non-owning back-reference (its uid) onto the
//! resource; the pool stays free to evict because nothing here holds the
//! repository alive.

use std::sync::{Arc, OnceLock};

use pkgrepo_schema::{
    ATTR_INDEX, ATTR_NAME, ATTR_VERSION, HandleError, PackageName, ResourceHandle, Version,
};
use thiserror::Error;

use crate::repository::RepositoryUid;

/// Errors raised while materializing resources from handles.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The handle's key does not match any registered resource type.
    #[error("no resource type registered for key '{0}'")]
    UnknownResourceType(String),

    /// The handle is missing or mistypes a required variable.
    #[error(transparent)]
    Handle(#[from] HandleError),

    /// A resource of one kind was requested where another was cached.
    #[error("expected a {expected} resource, got '{key}'")]
    WrongKind {
        /// The kind the caller asked for.
        expected: &'static str,
        /// Resource type key of the actual resource.
        key: String,
    },

    /// Backend-specific failure while materializing the resource.
    #[error("failed to materialize resource {handle}: {reason}")]
    Construction {
        /// Display form of the offending handle.
        handle: String,
        /// Backend-reported reason.
        reason: String,
    },
}

/// The three entity kinds a repository holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// A named package family (no version).
    Family,
    /// A specific version of a family.
    Package,
    /// One build configuration of a package.
    Variant,
}

impl ResourceKind {
    /// Lowercase label used in error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Family => "family",
            Self::Package => "package",
            Self::Variant => "variant",
        }
    }
}

/// A registrable resource type: the pool constructs resources of this kind
/// for handles whose key matches.
///
/// Backends register their types at construction time; registering the same
/// key twice is a no-op.
#[derive(Debug, Clone)]
pub struct ResourceType {
    key: &'static str,
    kind: ResourceKind,
}

impl ResourceType {
    /// A family resource type under the given key.
    pub fn family(key: &'static str) -> Self {
        Self {
            key,
            kind: ResourceKind::Family,
        }
    }

    /// A package resource type under the given key.
    pub fn package(key: &'static str) -> Self {
        Self {
            key,
            kind: ResourceKind::Package,
        }
    }

    /// A variant resource type under the given key.
    pub fn variant(key: &'static str) -> Self {
        Self {
            key,
            kind: ResourceKind::Variant,
        }
    }

    /// The handle key this type matches.
    pub fn key(&self) -> &'static str {
        self.key
    }

    /// The kind of resource this type builds.
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Build a resource of this type from a matching handle, validating the
    /// handle's required variables.
    pub fn build(&self, handle: ResourceHandle) -> Result<Resource, ResourceError> {
        match self.kind {
            ResourceKind::Family => Ok(Resource::Family(Arc::new(FamilyResource::from_handle(
                handle,
            )?))),
            ResourceKind::Package => Ok(Resource::Package(Arc::new(PackageResource::from_handle(
                handle,
            )?))),
            ResourceKind::Variant => Ok(Resource::Variant(Arc::new(VariantResource::from_handle(
                handle,
            )?))),
        }
    }
}

fn require_routing(handle: &ResourceHandle) -> Result<(), HandleError> {
    handle.repository_type()?;
    handle.location()?;
    Ok(())
}

/// A named package family resource.
#[derive(Debug)]
pub struct FamilyResource {
    handle: ResourceHandle,
    name: PackageName,
    repository: OnceLock<RepositoryUid>,
}

impl FamilyResource {
    fn from_handle(handle: ResourceHandle) -> Result<Self, ResourceError> {
        require_routing(&handle)?;
        let name = PackageName::new(handle.require_str(ATTR_NAME)?);
        Ok(Self {
            handle,
            name,
            repository: OnceLock::new(),
        })
    }

    /// The family's name.
    pub fn name(&self) -> &PackageName {
        &self.name
    }

    /// The identity handle this resource was built from.
    pub fn handle(&self) -> &ResourceHandle {
        &self.handle
    }

    /// Uid of the repository this resource belongs to, once stamped.
    pub fn repository_uid(&self) -> Option<&RepositoryUid> {
        self.repository.get()
    }

    pub(crate) fn attach_repository(&self, uid: RepositoryUid) {
        let _ = self.repository.set(uid);
    }
}

/// A specific version of a package family.
#[derive(Debug)]
pub struct PackageResource {
    handle: ResourceHandle,
    name: PackageName,
    version: Version,
    repository: OnceLock<RepositoryUid>,
}

impl PackageResource {
    fn from_handle(handle: ResourceHandle) -> Result<Self, ResourceError> {
        require_routing(&handle)?;
        let name = PackageName::new(handle.require_str(ATTR_NAME)?);
        let version = Version::new(handle.require_str(ATTR_VERSION)?);
        Ok(Self {
            handle,
            name,
            version,
            repository: OnceLock::new(),
        })
    }

    /// The family name this package belongs to.
    pub fn name(&self) -> &PackageName {
        &self.name
    }

    /// The package's version.
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// The identity handle this resource was built from.
    pub fn handle(&self) -> &ResourceHandle {
        &self.handle
    }

    /// Uid of the repository this resource belongs to, once stamped.
    pub fn repository_uid(&self) -> Option<&RepositoryUid> {
        self.repository.get()
    }

    pub(crate) fn attach_repository(&self, uid: RepositoryUid) {
        let _ = self.repository.set(uid);
    }
}

/// One build configuration of a package.
#[derive(Debug)]
pub struct VariantResource {
    handle: ResourceHandle,
    name: PackageName,
    version: Version,
    index: Option<i64>,
    repository: OnceLock<RepositoryUid>,
}

impl VariantResource {
    fn from_handle(handle: ResourceHandle) -> Result<Self, ResourceError> {
        require_routing(&handle)?;
        let name = PackageName::new(handle.require_str(ATTR_NAME)?);
        let version = Version::new(handle.require_str(ATTR_VERSION)?);
        let index = handle.get_int(ATTR_INDEX);
        Ok(Self {
            handle,
            name,
            version,
            index,
            repository: OnceLock::new(),
        })
    }

    /// The family name this variant's package belongs to.
    pub fn name(&self) -> &PackageName {
        &self.name
    }

    /// The version of this variant's package.
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Index of this variant within its package definition, or `None` for
    /// the implicit variant of a package that declares none.
    pub fn index(&self) -> Option<i64> {
        self.index
    }

    /// The identity handle this resource was built from.
    pub fn handle(&self) -> &ResourceHandle {
        &self.handle
    }

    /// Uid of the repository this resource belongs to, once stamped.
    pub fn repository_uid(&self) -> Option<&RepositoryUid> {
        self.repository.get()
    }

    pub(crate) fn attach_repository(&self, uid: RepositoryUid) {
        let _ = self.repository.set(uid);
    }
}

/// A materialized resource as cached by the pool.
///
/// Cloning is cheap (`Arc` bump); two clones of the same cache entry share
/// the same allocation, observable via [`Resource::ptr_eq`].
#[derive(Debug, Clone)]
pub enum Resource {
    /// A package family.
    Family(Arc<FamilyResource>),
    /// A package version.
    Package(Arc<PackageResource>),
    /// A package variant.
    Variant(Arc<VariantResource>),
}

impl Resource {
    /// The identity handle of the underlying resource.
    pub fn handle(&self) -> &ResourceHandle {
        match self {
            Self::Family(r) => r.handle(),
            Self::Package(r) => r.handle(),
            Self::Variant(r) => r.handle(),
        }
    }

    /// The kind of the underlying resource.
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Family(_) => ResourceKind::Family,
            Self::Package(_) => ResourceKind::Package,
            Self::Variant(_) => ResourceKind::Variant,
        }
    }

    /// Uid of the repository this resource belongs to, once stamped.
    pub fn repository_uid(&self) -> Option<&RepositoryUid> {
        match self {
            Self::Family(r) => r.repository_uid(),
            Self::Package(r) => r.repository_uid(),
            Self::Variant(r) => r.repository_uid(),
        }
    }

    pub(crate) fn attach_repository(&self, uid: RepositoryUid) {
        match self {
            Self::Family(r) => r.attach_repository(uid),
            Self::Package(r) => r.attach_repository(uid),
            Self::Variant(r) => r.attach_repository(uid),
        }
    }

    /// Whether two resources are the same cached object (not merely equal).
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Family(a), Self::Family(b)) => Arc::ptr_eq(a, b),
            (Self::Package(a), Self::Package(b)) => Arc::ptr_eq(a, b),
            (Self::Variant(a), Self::Variant(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Unwrap as a family resource.
    pub fn into_family(self) -> Result<Arc<FamilyResource>, ResourceError> {
        match self {
            Self::Family(r) => Ok(r),
            other => Err(ResourceError::WrongKind {
                expected: ResourceKind::Family.as_str(),
                key: other.handle().key().to_string(),
            }),
        }
    }

    /// Unwrap as a package resource.
    pub fn into_package(self) -> Result<Arc<PackageResource>, ResourceError> {
        match self {
            Self::Package(r) => Ok(r),
            other => Err(ResourceError::WrongKind {
                expected: ResourceKind::Package.as_str(),
                key: other.handle().key().to_string(),
            }),
        }
    }

    /// Unwrap as a variant resource.
    pub fn into_variant(self) -> Result<Arc<VariantResource>, ResourceError> {
        match self {
            Self::Variant(r) => Ok(r),
            other => Err(ResourceError::WrongKind {
                expected: ResourceKind::Variant.as_str(),
                key: other.handle().key().to_string(),
            }),
        }
    }
}
