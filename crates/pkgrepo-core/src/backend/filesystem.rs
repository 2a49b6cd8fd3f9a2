//! Filesystem package repository backend.
//!
//! Layout: `<location>/<family>/<version>/package.toml`. The location is
//! canonicalized by the manager before the repository is constructed, so
//! two spellings of the same directory collapse to one instance. Because a
//! local path does not uniquely identify storage across hosts or mounts,
//! the uid folds in the directory's device/inode pair where available.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::UNIX_EPOCH;

use pkgrepo_schema::{
    ATTR_INDEX, ATTR_NAME, ATTR_VERSION, PackageName, ResourceHandle, StateHandle,
};
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::package::PackageData;
use crate::pool::ResourcePool;
use crate::repository::{
    FamilyIter, PackageIter, PackageRepository, RepositoryError, RepositoryUid, VariantIter,
};
use crate::resource::{FamilyResource, PackageResource, ResourceType, VariantResource};

const TYPE_NAME: &str = "filesystem";
const FAMILY_KEY: &str = "filesystem.family";
const PACKAGE_KEY: &str = "filesystem.package";
const VARIANT_KEY: &str = "filesystem.variant";

/// Name of the per-version package definition file.
pub const DEFINITION_FILE: &str = "package.toml";

/// A repository backed by a directory tree of TOML package definitions.
#[derive(Debug)]
pub struct FileSystemRepository {
    location: String,
    root: PathBuf,
    pool: Arc<ResourcePool>,
    uid: OnceLock<RepositoryUid>,
}

impl FileSystemRepository {
    /// Bind a repository to a directory and the shared pool. No I/O occurs
    /// until an iteration or lookup is requested.
    pub fn new(location: String, pool: Arc<ResourcePool>) -> Self {
        pool.register_resource(ResourceType::family(FAMILY_KEY));
        pool.register_resource(ResourceType::package(PACKAGE_KEY));
        pool.register_resource(ResourceType::variant(VARIANT_KEY));
        let root = PathBuf::from(&location);
        Self {
            location,
            root,
            pool,
            uid: OnceLock::new(),
        }
    }

    /// Registry factory for the `filesystem` plugin.
    pub fn factory(
        location: String,
        pool: Arc<ResourcePool>,
    ) -> Result<Arc<dyn PackageRepository>, RepositoryError> {
        Ok(Arc::new(Self::new(location, pool)))
    }

    fn family_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn definition_path(&self, name: &str, version: &str) -> PathBuf {
        self.root.join(name).join(version).join(DEFINITION_FILE)
    }

    fn load_definition(&self, name: &str, version: &str) -> Result<PackageData, RepositoryError> {
        let path = self.definition_path(name, version);
        PackageData::from_file(&path).map_err(|err| match err {
            crate::package::PackageDataError::Io(io) => RepositoryError::Io(io),
            other => RepositoryError::Definition { path, source: other },
        })
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

    /// Visible subdirectory names of `dir`, or empty if it does not exist.
    fn subdir_names(dir: &Path) -> Result<Vec<String>, RepositoryError> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            names.push(name);
        }
        Ok(names)
    }
}

fn mtime_epoch(path: &Path) -> Result<u64, RepositoryError> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs()))
}

#[cfg(unix)]
fn storage_token(path: &Path) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    let meta = fs::metadata(path).ok()?;
    // dev/ino pair folded into one token; collisions across devices are
    // acceptable for a disambiguator
    Some(meta.dev().rotate_left(32) ^ meta.ino())
}

#[cfg(not(unix))]
fn storage_token(_path: &Path) -> Option<u64> {
    None
}

impl PackageRepository for FileSystemRepository {
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
        self.uid.get_or_init(|| match storage_token(&self.root) {
            Some(token) => RepositoryUid::with_token(TYPE_NAME, &self.location, token),
            None => RepositoryUid::new(TYPE_NAME, &self.location),
        })
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn get_package_family(
        &self,
        name: &PackageName,
    ) -> Result<Option<Arc<FamilyResource>>, RepositoryError> {
        if !self.family_dir(name).is_dir() {
            return Ok(None);
        }
        let family = self.get_resource(&self.family_handle(name))?.into_family()?;
        Ok(Some(family))
    }

    fn iter_package_families(&self) -> Result<FamilyIter<'_>, RepositoryError> {
        trace!(location = %self.location, "scanning package families");
        let names = Self::subdir_names(&self.root)?;
        Ok(Box::new(names.into_iter().map(|name| {
            let family = self.get_resource(&self.family_handle(&name))?.into_family()?;
            Ok(family)
        })))
    }

    fn iter_packages(&self, family: &FamilyResource) -> Result<PackageIter<'_>, RepositoryError> {
        let name = family.name().clone();
        let versions = Self::subdir_names(&self.family_dir(&name))?;
        Ok(Box::new(
            versions
                .into_iter()
                .filter({
                    let name = name.clone();
                    let root = self.root.clone();
                    move |version| {
                        root.join(name.as_str())
                            .join(version)
                            .join(DEFINITION_FILE)
                            .is_file()
                    }
                })
                .map(move |version| {
                    let package = self
                        .get_resource(&self.package_handle(&name, &version))?
                        .into_package()?;
                    Ok(package)
                }),
        ))
    }

    fn iter_variants(&self, package: &PackageResource) -> Result<VariantIter<'_>, RepositoryError> {
        let name = package.name().clone();
        let version = package.version().clone();
        let definition = self.load_definition(&name, &version)?;
        Ok(Box::new(definition.variant_indices().into_iter().map(
            move |index| {
                let variant = self
                    .get_resource(&self.variant_handle(&name, &version, index))?
                    .into_variant()?;
                Ok(variant)
            },
        )))
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

    /// Load an uninstalled package definition from the repository's
    /// location, i.e. a `package.toml` sitting directly in a working
    /// directory.
    fn get_developer_package(&self) -> Result<Arc<PackageResource>, RepositoryError> {
        let path = self.root.join(DEFINITION_FILE);
        let data = PackageData::from_file(&path).map_err(|err| match err {
            crate::package::PackageDataError::Io(io) => RepositoryError::Io(io),
            other => RepositoryError::Definition { path, source: other },
        })?;
        debug!(name = %data.name, version = %data.version, "loaded developer package");
        let package = self
            .get_resource(&self.package_handle(&data.name, &data.version))?
            .into_package()?;
        Ok(package)
    }

    fn get_variant_state_handle(
        &self,
        variant: &VariantResource,
    ) -> Result<Option<StateHandle>, RepositoryError> {
        let path = self.definition_path(variant.name(), variant.version());
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(StateHandle::new(mtime_epoch(&path)?)))
    }

    fn get_last_release_time(&self, family: &FamilyResource) -> Result<u64, RepositoryError> {
        let dir = self.family_dir(family.name());
        if !dir.is_dir() {
            return Ok(0);
        }
        let mut newest = 0;
        for entry in WalkDir::new(&dir).min_depth(2).max_depth(2) {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.file_name() == DEFINITION_FILE {
                newest = newest.max(mtime_epoch(entry.path())?);
            }
        }
        Ok(newest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn write_package(root: &Path, name: &str, version: &str, body: &str) {
        let dir = root.join(name).join(version);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(DEFINITION_FILE), body).unwrap();
    }

    fn sample_repo() -> (TempDir, FileSystemRepository) {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write_package(root, "foo", "1.0.0", "name = \"foo\"\nversion = \"1.0.0\"\n");
        write_package(
            root,
            "foo",
            "1.1.0",
            "name = \"foo\"\nversion = \"1.1.0\"\nvariants = [[\"platform-linux\"], [\"platform-macos\"]]\n",
        );
        write_package(root, "bar", "0.5.0", "name = \"bar\"\nversion = \"0.5.0\"\n");
        let repo = FileSystemRepository::new(
            root.to_string_lossy().into_owned(),
            Arc::new(ResourcePool::unbounded()),
        );
        (temp, repo)
    }

    #[test]
    fn scans_families_and_versions() {
        let (_temp, repo) = sample_repo();

        let families: std::collections::BTreeSet<String> = repo
            .iter_package_families()
            .unwrap()
            .map(|f| f.unwrap().name().to_string())
            .collect();
        assert_eq!(
            families,
            ["bar".to_string(), "foo".to_string()].into_iter().collect()
        );

        let foo = repo
            .get_package_family(&PackageName::new("foo"))
            .unwrap()
            .unwrap();
        let versions: std::collections::BTreeSet<String> = repo
            .iter_packages(&foo)
            .unwrap()
            .map(|p| p.unwrap().version().to_string())
            .collect();
        assert_eq!(
            versions,
            ["1.0.0".to_string(), "1.1.0".to_string()]
                .into_iter()
                .collect()
        );
    }

    #[test]
    fn missing_location_iterates_empty() {
        let repo = FileSystemRepository::new(
            "/nonexistent/pkgrepo-test".to_string(),
            Arc::new(ResourcePool::unbounded()),
        );
        assert_eq!(repo.iter_package_families().unwrap().count(), 0);
        assert!(
            repo.get_package_family(&PackageName::new("foo"))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn version_dir_without_definition_is_skipped() {
        let (temp, repo) = sample_repo();
        fs::create_dir_all(temp.path().join("foo").join("9.9.9")).unwrap();

        let foo = repo
            .get_package_family(&PackageName::new("foo"))
            .unwrap()
            .unwrap();
        let versions: Vec<_> = repo
            .iter_packages(&foo)
            .unwrap()
            .map(|p| p.unwrap().version().to_string())
            .collect();
        assert!(!versions.contains(&"9.9.9".to_string()));
    }

    #[test]
    fn variants_follow_the_definition() {
        let (_temp, repo) = sample_repo();
        let foo = repo
            .get_package_family(&PackageName::new("foo"))
            .unwrap()
            .unwrap();
        for package in repo.iter_packages(&foo).unwrap() {
            let package = package.unwrap();
            let variants: Vec<_> = repo
                .iter_variants(&package)
                .unwrap()
                .map(Result::unwrap)
                .collect();
            if package.version().as_str() == "1.1.0" {
                assert_eq!(variants.len(), 2);
                assert_eq!(variants[1].index(), Some(1));
            } else {
                assert_eq!(variants.len(), 1);
                assert_eq!(variants[0].index(), None);
            }
            for variant in &variants {
                let parent = repo.get_parent_package(variant).unwrap();
                assert!(Arc::ptr_eq(&parent, &package));
            }
        }
    }

    #[test]
    fn broken_definition_surfaces_as_definition_error() {
        let (temp, repo) = sample_repo();
        write_package(temp.path(), "foo", "2.0.0", "not valid toml {{{");

        let foo = repo
            .get_package_family(&PackageName::new("foo"))
            .unwrap()
            .unwrap();
        let package = repo
            .iter_packages(&foo)
            .unwrap()
            .map(Result::unwrap)
            .find(|p| p.version().as_str() == "2.0.0")
            .unwrap();
        assert!(matches!(
            repo.iter_variants(&package),
            Err(RepositoryError::Definition { .. })
        ));
    }

    #[test]
    fn state_handle_tracks_definition_mtime() {
        let (_temp, repo) = sample_repo();
        let foo = repo
            .get_package_family(&PackageName::new("foo"))
            .unwrap()
            .unwrap();
        let package = repo
            .iter_packages(&foo)
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

        let a = repo.get_variant_state_handle(&variant).unwrap();
        let b = repo.get_variant_state_handle(&variant).unwrap();
        assert!(a.is_some());
        assert_eq!(a, b);

        assert!(repo.get_last_release_time(&foo).unwrap() > 0);
    }

    #[test]
    fn developer_package_loads_from_working_directory() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(DEFINITION_FILE),
            "name = \"wip\"\nversion = \"0.0.1\"\n",
        )
        .unwrap();
        let repo = FileSystemRepository::new(
            temp.path().to_string_lossy().into_owned(),
            Arc::new(ResourcePool::unbounded()),
        );
        let dev = repo.get_developer_package().unwrap();
        assert_eq!(dev.name(), &PackageName::new("wip"));
        assert_eq!(dev.version().as_str(), "0.0.1");
    }

    #[cfg(unix)]
    #[test]
    fn uid_carries_a_storage_token() {
        let (_temp, repo) = sample_repo();
        assert!(repo.uid().token().is_some());
        assert_eq!(repo.uid().repository_type(), "filesystem");
    }
}
