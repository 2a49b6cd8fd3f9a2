//! Opaque staleness tokens for external cache invalidation.

use serde::{Deserialize, Serialize};

/// An opaque, hashable value representing backend-specific staleness.
///
/// Consumers compare state handles for equality to decide whether a cached
/// resolve is still valid; the value itself is never interpreted by the
/// repository layer. The filesystem backend uses the definition file's
/// mtime, the memory backend a mutation counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateHandle(u64);

impl StateHandle {
    /// Wrap a raw backend-specific token.
    pub fn new(token: u64) -> Self {
        Self(token)
    }

    /// The raw token value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for StateHandle {
    fn from(token: u64) -> Self {
        Self(token)
    }
}

impl std::fmt::Display for StateHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
