//! TOML package definition parsing
//!
//! The metadata a backend stores per package version. Both concrete
//! backends speak this shape: the filesystem backend reads it from
//! `package.toml` files, the memory backend holds it directly.

use std::fs;
use std::path::Path;

use pkgrepo_schema::{PackageName, Version};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading or parsing a package definition.
#[derive(Error, Debug)]
pub enum PackageDataError {
    /// An I/O error occurred while reading a definition file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML content could not be deserialized into a valid definition.
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// A required field is present but empty.
    #[error("Empty field: {0}")]
    EmptyField(&'static str),
}

/// A package definition: the metadata describing one version of a family.
///
/// Dependency requests (`requires`, variant entries) are opaque strings at
/// this layer; interpreting them is the resolver's job, not the
/// repository's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageData {
    /// Family name this version belongs to.
    pub name: PackageName,
    /// Version of the package.
    pub version: Version,
    /// Short human-readable summary.
    #[serde(default)]
    pub description: String,
    /// Dependency requests shared by all variants.
    #[serde(default)]
    pub requires: Vec<String>,
    /// Per-variant dependency requests. An empty list means the package
    /// has a single implicit variant.
    #[serde(default)]
    pub variants: Vec<Vec<String>>,
}

impl PackageData {
    /// Parse a package definition from a TOML file on disk.
    pub fn from_file(path: &Path) -> Result<Self, PackageDataError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a package definition from a TOML string.
    pub fn parse(content: &str) -> Result<Self, PackageDataError> {
        let data: Self = toml::from_str(content)?;
        data.validate()?;
        Ok(data)
    }

    /// Serialize this definition to a pretty-printed TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `toml::ser::Error` if serialization fails.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Check that required fields are non-empty.
    pub fn validate(&self) -> Result<(), PackageDataError> {
        if self.name.is_empty() {
            return Err(PackageDataError::EmptyField("name"));
        }
        if self.version.is_empty() {
            return Err(PackageDataError::EmptyField("version"));
        }
        Ok(())
    }

    /// Indices of the variants this definition declares.
    ///
    /// A definition with no explicit variants still has exactly one
    /// buildable configuration, addressed with no index.
    pub fn variant_indices(&self) -> Vec<Option<i64>> {
        if self.variants.is_empty() {
            vec![None]
        } else {
            (0..self.variants.len() as i64).map(Some).collect()
        }
    }

    /// The dependency requests of one variant: the shared `requires` list
    /// followed by the variant's own entries.
    pub fn variant_requires(&self, index: Option<i64>) -> Vec<String> {
        let mut out = self.requires.clone();
        if let Some(i) = index
            && let Ok(i) = usize::try_from(i)
            && let Some(extra) = self.variants.get(i)
        {
            out.extend(extra.iter().cloned());
        }
        out
    }
}

impl std::str::FromStr for PackageData {
    type Err = PackageDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
