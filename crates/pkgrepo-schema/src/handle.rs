//! Resource handles: immutable identity keys for repository-held entities.
//!
//! A handle is the unit of addressing between the repository manager, the
//! resource pool, and external resolve caches. Two handles with identical
//! key and variables are interchangeable: they hash and compare equal and
//! resolve to the same cached resource.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::{ATTR_LOCATION, ATTR_REPOSITORY_TYPE};

/// Errors raised when reading required variables out of a handle.
#[derive(Error, Debug)]
pub enum HandleError {
    /// A variable the caller requires is not present in the handle.
    #[error("handle '{key}' is missing required variable '{variable}'")]
    MissingVariable {
        /// Resource type key of the offending handle.
        key: String,
        /// Name of the absent variable.
        variable: String,
    },

    /// A variable is present but holds a value of the wrong type.
    #[error("handle '{key}' variable '{variable}' has the wrong type")]
    WrongType {
        /// Resource type key of the offending handle.
        key: String,
        /// Name of the mistyped variable.
        variable: String,
    },
}

/// A single handle variable value.
///
/// Variables are either strings (names, versions, locations) or integers
/// (variant indices). The ordering and hash derive over the value, so any
/// handle containing the variable remains a stable cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Integer variable (e.g. a variant index).
    Int(i64),
    /// String variable (e.g. a name, version, or location).
    Str(String),
}

impl AttrValue {
    /// Return the string form of this value, or `None` for integers.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            Self::Int(_) => None,
        }
    }

    /// Return the integer form of this value, or `None` for strings.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Str(_) => None,
        }
    }
}

impl std::fmt::Display for AttrValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s}"),
            Self::Int(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

/// Immutable identity descriptor for a repository-held entity.
///
/// `key` names the resource type the owning backend registered with the
/// resource pool (e.g. `"filesystem.package"`); `variables` is an ordered
/// map of named attributes and always carries at least `repository_type`
/// and `location`, so the manager can route the handle to its owning
/// repository without further context.
///
/// Handles are never mutated after construction; build them with
/// [`ResourceHandle::builder`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceHandle {
    key: String,
    variables: BTreeMap<String, AttrValue>,
}

impl ResourceHandle {
    /// Start building a handle for the given resource type key.
    pub fn builder(key: impl Into<String>) -> ResourceHandleBuilder {
        ResourceHandleBuilder {
            key: key.into(),
            variables: BTreeMap::new(),
        }
    }

    /// The resource type key this handle addresses.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Look up a variable by name.
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.variables.get(name)
    }

    /// Look up a string variable by name.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.variables.get(name).and_then(AttrValue::as_str)
    }

    /// Look up an integer variable by name.
    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.variables.get(name).and_then(AttrValue::as_int)
    }

    /// Iterate over all variables in their stable (sorted) order.
    pub fn variables(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.variables.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Read a required string variable, failing with a descriptive error.
    pub fn require_str(&self, name: &str) -> Result<&str, HandleError> {
        match self.variables.get(name) {
            Some(value) => value.as_str().ok_or_else(|| HandleError::WrongType {
                key: self.key.clone(),
                variable: name.to_string(),
            }),
            None => Err(HandleError::MissingVariable {
                key: self.key.clone(),
                variable: name.to_string(),
            }),
        }
    }

    /// The repository type that owns this handle's resource.
    pub fn repository_type(&self) -> Result<&str, HandleError> {
        self.require_str(ATTR_REPOSITORY_TYPE)
    }

    /// The location of the repository that owns this handle's resource.
    pub fn location(&self) -> Result<&str, HandleError> {
        self.require_str(ATTR_LOCATION)
    }
}

impl std::fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{{", self.key)?;
        for (i, (name, value)) in self.variables.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        write!(f, "}}")
    }
}

/// Builder for [`ResourceHandle`]; consumed by [`build`](Self::build) so the
/// finished handle is immutable.
#[derive(Debug)]
pub struct ResourceHandleBuilder {
    key: String,
    variables: BTreeMap<String, AttrValue>,
}

impl ResourceHandleBuilder {
    /// Set a variable, replacing any previous value under the same name.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Set the `repository_type` and `location` variables in one step.
    pub fn repository(self, repository_type: &str, location: &str) -> Self {
        self.set(ATTR_REPOSITORY_TYPE, repository_type)
            .set(ATTR_LOCATION, location)
    }

    /// Finish building the handle.
    pub fn build(self) -> ResourceHandle {
        ResourceHandle {
            key: self.key,
            variables: self.variables,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResourceHandle {
        ResourceHandle::builder("memory.package")
            .repository("memory", "store1")
            .set("name", "foo")
            .set("version", "1.0.0")
            .build()
    }

    #[test]
    fn equal_handles_are_interchangeable_keys() {
        use std::collections::HashMap;

        let a = sample();
        let b = sample();
        assert_eq!(a, b);

        let mut map = HashMap::new();
        map.insert(a, 1);
        assert_eq!(map.get(&b), Some(&1));
    }

    #[test]
    fn variable_order_does_not_matter() {
        let a = ResourceHandle::builder("k")
            .set("x", 1i64)
            .set("y", "z")
            .build();
        let b = ResourceHandle::builder("k")
            .set("y", "z")
            .set("x", 1i64)
            .build();
        assert_eq!(a, b);
    }

    #[test]
    fn required_variables() {
        let h = sample();
        assert_eq!(h.repository_type().unwrap(), "memory");
        assert_eq!(h.location().unwrap(), "store1");

        let bare = ResourceHandle::builder("memory.family").build();
        assert!(matches!(
            bare.repository_type(),
            Err(HandleError::MissingVariable { .. })
        ));
    }

    #[test]
    fn serde_round_trip() {
        let h = ResourceHandle::builder("filesystem.variant")
            .repository("filesystem", "/packages")
            .set("name", "foo")
            .set("version", "1.0.0")
            .set("index", 0i64)
            .build();

        let json = serde_json::to_string(&h).unwrap();
        let back: ResourceHandle = serde_json::from_str(&json).unwrap();
        assert_eq!(h, back);
        assert_eq!(back.get_int("index"), Some(0));
    }

    #[test]
    fn display_is_stable() {
        let h = sample();
        assert_eq!(
            h.to_string(),
            "memory.package{location=store1, name=foo, repository_type=memory, version=1.0.0}"
        );
    }
}
