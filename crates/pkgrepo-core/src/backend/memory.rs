//! In-memory package repository backend.
//!
//! Holds package definitions behind an `RwLock`, keyed family → version.
//! Mostly useful for tests and for tooling that wants to overlay
//! not-yet-released packages onto a resolve; mutation bumps the family's
//! release time and revision so staleness tokens behave like a real
//! backend's.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock, RwLock};

use chrono::Utc;
use pkgrepo_schema::{
    ATTR_INDEX, ATTR_NAME, ATTR_VERSION, PackageName, ResourceHandle, StateHandle, Version,
};
use tracing::debug;

use crate::package::PackageData;
use crate::pool::ResourcePool;
use crate::repository::{
    FamilyIter, PackageIter, PackageRepository, RepositoryError, RepositoryUid, VariantIter,
};
use crate::resource::{FamilyResource, PackageResource, ResourceType, VariantResource};

const TYPE_NAME: &str = "memory";
const FAMILY_KEY: &str = "memory.family";
const PACKAGE_KEY: &str = "memory.package";
const VARIANT_KEY: &str = "memory.variant";

#[derive(Debug, Default)]
struct FamilyEntry {
    versions: BTreeMap<Version, PackageData>,
    last_release: u64,
    revision: u64,
}

#[derive(Debug, Default)]
struct Store {
    families: BTreeMap<PackageName, FamilyEntry>,
}

/// A repository whose contents live entirely in process memory.
#[derive(Debug)]
pub struct MemoryRepository {
    location: String,
    pool: Arc<ResourcePool>,
    store: RwLock<Store>,
    uid: OnceLock<RepositoryUid>,
}

impl MemoryRepository {
    /// Create an empty memory repository bound to `location` (an arbitrary
    /// identifier) and the shared pool.
    pub fn new(location: String, pool: Arc<ResourcePool>) -> Self {
        pool.register_resource(ResourceType::family(FAMILY_KEY));
        pool.register_resource(ResourceType::package(PACKAGE_KEY));
        pool.register_resource(ResourceType::variant(VARIANT_KEY));
        Self {
            location,
            pool,
            store: RwLock::new(Store::default()),
            uid: OnceLock::new(),
        }
    }

    /// Registry factory for the `memory` plugin.
    pub fn factory(
        location: String,
        pool: Arc<ResourcePool>,
    ) -> Result<Arc<dyn PackageRepository>, RepositoryError> {
        Ok(Arc::new(Self::new(location, pool)))
    }

    /// Insert or replace a package definition.
    ///
    /// Bumps the family's last-release time and revision, so outstanding
    /// state handles for its variants go stale.
    pub fn ingest(&self, data: PackageData) -> Result<(), RepositoryError> {
        data.validate()
            .map_err(|err| RepositoryError::Definition {
                path: self.location.clone().into(),
                source: err,
            })?;
        let mut store = self.store.write().expect("memory store poisoned");
        let entry = store.families.entry(data.name.clone()).or_default();
        entry.last_release = now_epoch();
        entry.revision += 1;
        debug!(name = %data.name, version = %data.version, "ingested package definition");
        entry.versions.insert(data.version.clone(), data);
        Ok(())
    }

    /// Remove a family and all its versions; returns whether it existed.
    pub fn remove_family(&self, name: &PackageName) -> bool {
        let mut store = self.store.write().expect("memory store poisoned");
        store.families.remove(name).is_some()
    }

    fn family_handle(&self, name: &str) -> ResourceHandle {
        ResourceHandle::builder(FAMILY_KEY)
            .repository(TYPE_NAME, &self.location)
            .set(ATTR_NAME, name)
            .build()
    }

    fn package_handle(&self, name: &str, version: &str) -> ResourceHandle {
        ResourceHandle::builder(PACKAGE_KEY)
            .repository(TYPE_NAME, &self.location)
            .set(ATTR_NAME, name)
            .set(ATTR_VERSION, version)
            .build()
    }

    fn variant_handle(&self, name: &str, version: &str, index: Option<i64>) -> ResourceHandle {
        let builder = ResourceHandle::builder(VARIANT_KEY)
            .repository(TYPE_NAME, &self.location)
            .set(ATTR_NAME, name)
            .set(ATTR_VERSION, version);
        match index {
            Some(i) => builder.set(ATTR_INDEX, i).build(),
            None => builder.build(),
        }
    }
}

fn now_epoch() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}

impl PackageRepository for MemoryRepository {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn location(&self) -> &str {
        &self.location
    }

    fn pool(&self) -> &Arc<ResourcePool> {
        &self.pool
    }

    fn uid(&self) -> &RepositoryUid {
        self.uid
            .get_or_init(|| RepositoryUid::new(TYPE_NAME, &self.location))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn get_package_family(
        &self,
        name: &PackageName,
    ) -> Result<Option<Arc<FamilyResource>>, RepositoryError> {
        let present = {
            let store = self.store.read().expect("memory store poisoned");
            store.families.contains_key(name)
        };
        if !present {
            return Ok(None);
        }
        let family = self
            .get_resource(&self.family_handle(name))?
            .into_family()?;
        Ok(Some(family))
    }

    fn iter_package_families(&self) -> Result<FamilyIter<'_>, RepositoryError> {
        let names: Vec<PackageName> = {
            let store = self.store.read().expect("memory store poisoned");
            store.families.keys().cloned().collect()
        };
        Ok(Box::new(names.into_iter().map(|name| {
            let family = self
                .get_resource(&self.family_handle(&name))?
                .into_family()?;
            Ok(family)
        })))
    }

    fn iter_packages(&self, family: &FamilyResource) -> Result<PackageIter<'_>, RepositoryError> {
        let name = family.name().clone();
        let versions: Vec<Version> = {
            let store = self.store.read().expect("memory store poisoned");
            store
                .families
                .get(&name)
                .map(|entry| entry.versions.keys().cloned().collect())
                .unwrap_or_default()
        };
        Ok(Box::new(versions.into_iter().map(move |version| {
            let package = self
                .get_resource(&self.package_handle(&name, &version))?
                .into_package()?;
            Ok(package)
        })))
    }

    fn iter_variants(&self, package: &PackageResource) -> Result<VariantIter<'_>, RepositoryError> {
        let name = package.name().clone();
        let version = package.version().clone();
        let indices: Vec<Option<i64>> = {
            let store = self.store.read().expect("memory store poisoned");
            store
                .families
                .get(&name)
                .and_then(|entry| entry.versions.get(&version))
                .map(PackageData::variant_indices)
                .unwrap_or_default()
        };
        Ok(Box::new(indices.into_iter().map(move |index| {
            let variant = self
                .get_resource(&self.variant_handle(&name, &version, index))?
                .into_variant()?;
            Ok(variant)
        })))
    }

    fn get_parent_package_family(
        &self,
        package: &PackageResource,
    ) -> Result<Arc<FamilyResource>, RepositoryError> {
        Ok(self
            .get_resource(&self.family_handle(package.name()))?
            .into_family()?)
    }

    fn get_parent_package(
        &self,
        variant: &VariantResource,
    ) -> Result<Arc<PackageResource>, RepositoryError> {
        Ok(self
            .get_resource(&self.package_handle(variant.name(), variant.version()))?
            .into_package()?)
    }

    fn get_variant_state_handle(
        &self,
        variant: &VariantResource,
    ) -> Result<Option<StateHandle>, RepositoryError> {
        let store = self.store.read().expect("memory store poisoned");
        Ok(store
            .families
            .get(variant.name())
            .map(|entry| StateHandle::new(entry.revision)))
    }

    fn get_last_release_time(&self, family: &FamilyResource) -> Result<u64, RepositoryError> {
        let store = self.store.read().expect("memory store poisoned");
        Ok(store
            .families
            .get(family.name())
            .map_or(0, |entry| entry.last_release))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(name: &str, version: &str, variants: Vec<Vec<String>>) -> PackageData {
        PackageData {
            name: PackageName::new(name),
            version: Version::new(version),
            description: String::new(),
            requires: Vec::new(),
            variants,
        }
    }

    fn two_family_repo() -> MemoryRepository {
        let repo = MemoryRepository::new("memtest".to_string(), Arc::new(ResourcePool::unbounded()));
        repo.ingest(definition("foo", "1.0.0", vec![])).unwrap();
        repo.ingest(definition("foo", "1.1.0", vec![])).unwrap();
        repo.ingest(definition(
            "bar",
            "2.0.0",
            vec![vec!["platform-linux".into()], vec!["platform-macos".into()]],
        ))
        .unwrap();
        repo
    }

    #[test]
    fn iterates_exactly_the_ingested_families() {
        let repo = two_family_repo();
        let names: std::collections::BTreeSet<String> = repo
            .iter_package_families()
            .unwrap()
            .map(|f| f.unwrap().name().to_string())
            .collect();
        assert_eq!(
            names,
            ["bar".to_string(), "foo".to_string()].into_iter().collect()
        );
    }

    #[test]
    fn absent_family_is_none_not_an_error() {
        let repo = two_family_repo();
        assert!(
            repo.get_package_family(&PackageName::new("baz"))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn parent_package_family_is_the_iterated_family() {
        let repo = two_family_repo();
        let family = repo
            .get_package_family(&PackageName::new("foo"))
            .unwrap()
            .unwrap();
        for package in repo.iter_packages(&family).unwrap() {
            let package = package.unwrap();
            let parent = repo.get_parent_package_family(&package).unwrap();
            assert!(Arc::ptr_eq(&parent, &family));
        }
    }

    #[test]
    fn parent_package_is_the_iterated_package() {
        let repo = two_family_repo();
        let family = repo
            .get_package_family(&PackageName::new("bar"))
            .unwrap()
            .unwrap();
        let package = repo
            .iter_packages(&family)
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        let variants: Vec<_> = repo
            .iter_variants(&package)
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].index(), Some(0));
        for variant in &variants {
            let parent = repo.get_parent_package(variant).unwrap();
            assert!(Arc::ptr_eq(&parent, &package));
        }
    }

    #[test]
    fn package_without_variants_yields_one_implicit_variant() {
        let repo = two_family_repo();
        let family = repo
            .get_package_family(&PackageName::new("foo"))
            .unwrap()
            .unwrap();
        let package = repo
            .iter_packages(&family)
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        let variants: Vec<_> = repo
            .iter_variants(&package)
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].index(), None);
    }

    #[test]
    fn ingest_bumps_state_handle_and_release_time() {
        let repo = two_family_repo();
        let family = repo
            .get_package_family(&PackageName::new("foo"))
            .unwrap()
            .unwrap();
        let package = repo
            .iter_packages(&family)
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        let variant = repo
            .iter_variants(&package)
            .unwrap()
            .next()
            .unwrap()
            .unwrap();

        let before = repo.get_variant_state_handle(&variant).unwrap().unwrap();
        assert!(repo.get_last_release_time(&family).unwrap() > 0);

        repo.ingest(definition("foo", "2.0.0", vec![])).unwrap();
        let after = repo.get_variant_state_handle(&variant).unwrap().unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn removed_family_reports_unknown_release_time() {
        let repo = two_family_repo();
        let family = repo
            .get_package_family(&PackageName::new("foo"))
            .unwrap()
            .unwrap();
        assert!(repo.remove_family(&PackageName::new("foo")));
        assert_eq!(repo.get_last_release_time(&family).unwrap(), 0);
        assert!(!repo.remove_family(&PackageName::new("foo")));
    }
}
