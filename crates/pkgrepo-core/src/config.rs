//! Layer configuration.
//!
//! One small knob matters to this layer: how many resources the shared pool
//! may keep resident. The rest (`packages_path`) is convenience for
//! consumers that want a configured search order of repositories.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Environment variable naming a TOML config file to load.
pub const ENV_CONFIG_FILE: &str = "PKGREPO_CONFIG";

/// Environment variable overriding `resource_caching_maxsize`.
pub const ENV_CACHE_MAXSIZE: &str = "PKGREPO_CACHE_MAXSIZE";

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An I/O error occurred while reading a config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML content could not be deserialized.
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Repository-layer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum number of resources resident in the shared pool. A negative
    /// value means unbounded.
    pub resource_caching_maxsize: i64,

    /// Repository locations to search, in order. Entries are `"location"`
    /// or `"type:location"` strings as accepted by the manager.
    pub packages_path: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resource_caching_maxsize: -1,
            packages_path: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Build configuration from the process environment.
    ///
    /// Reads the file named by `PKGREPO_CONFIG` if set (a broken file is
    /// logged and ignored), then applies the `PKGREPO_CACHE_MAXSIZE`
    /// override.
    pub fn from_env() -> Self {
        let mut config = match std::env::var(ENV_CONFIG_FILE) {
            Ok(path) => Self::load(Path::new(&path)).unwrap_or_else(|err| {
                warn!(%path, %err, "ignoring unreadable config file");
                Self::default()
            }),
            Err(_) => Self::default(),
        };

        if let Some(maxsize) = parse_maxsize(std::env::var(ENV_CACHE_MAXSIZE).ok().as_deref()) {
            config.resource_caching_maxsize = maxsize;
        }
        config
    }

    /// The pool bound this config implies: `None` for unbounded.
    pub fn cache_size(&self) -> Option<usize> {
        usize::try_from(self.resource_caching_maxsize).ok()
    }
}

fn parse_maxsize(raw: Option<&str>) -> Option<i64> {
    let raw = raw?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(raw, "ignoring non-integer {ENV_CACHE_MAXSIZE}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unbounded() {
        let config = Config::default();
        assert_eq!(config.resource_caching_maxsize, -1);
        assert_eq!(config.cache_size(), None);
    }

    #[test]
    fn non_negative_maxsize_bounds_the_pool() {
        let config = Config {
            resource_caching_maxsize: 128,
            ..Config::default()
        };
        assert_eq!(config.cache_size(), Some(128));
    }

    #[test]
    fn parse_from_toml() {
        let config: Config = toml::from_str(
            r#"
resource_caching_maxsize = 64
packages_path = ["/packages", "memory:site"]
"#,
        )
        .unwrap();
        assert_eq!(config.cache_size(), Some(64));
        assert_eq!(config.packages_path.len(), 2);
    }

    #[test]
    fn maxsize_override_parsing() {
        assert_eq!(parse_maxsize(Some("256")), Some(256));
        assert_eq!(parse_maxsize(Some("-1")), Some(-1));
        assert_eq!(parse_maxsize(Some("lots")), None);
        assert_eq!(parse_maxsize(None), None);
    }
}
