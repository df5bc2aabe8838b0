//! Mount configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};
use crate::types::VaultPath;

/// Default liveness window for cache entries.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Configuration for a projection mount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    /// Root directory of the content-addressed object store.
    pub instance_path: PathBuf,

    /// Absolute directory path to become the projection root.
    pub virtual_root: PathBuf,

    /// Liveness window applied to all three cache maps.
    pub cache_ttl: Duration,

    /// Enables verbose tracing.
    pub debug: bool,

    /// Virtual prefixes whose files are regenerated after a user deletion:
    /// a close-deleted notification under one of these invalidates caches
    /// and the platform tombstone so the next access re-fetches.
    pub regenerate_prefixes: Vec<VaultPath>,
}

impl MountConfig {
    /// Creates a configuration for the given store and projection root.
    pub fn new(instance_path: impl Into<PathBuf>, virtual_root: impl Into<PathBuf>) -> Self {
        MountConfig {
            instance_path: instance_path.into(),
            virtual_root: virtual_root.into(),
            cache_ttl: DEFAULT_CACHE_TTL,
            debug: false,
            regenerate_prefixes: vec![VaultPath::new("/invites")],
        }
    }

    /// Sets the cache liveness window.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Enables verbose tracing.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Replaces the regeneration prefixes.
    pub fn regenerate_prefixes(mut self, prefixes: Vec<VaultPath>) -> Self {
        self.regenerate_prefixes = prefixes;
        self
    }

    /// True if `path` falls under a regeneration prefix.
    pub fn is_regenerated(&self, path: &VaultPath) -> bool {
        self.regenerate_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.instance_path.as_os_str().is_empty() {
            return Err(VaultError::InvalidConfig {
                reason: "instance_path must not be empty".to_string(),
            });
        }
        if self.virtual_root.as_os_str().is_empty() {
            return Err(VaultError::InvalidConfig {
                reason: "virtual_root must not be empty".to_string(),
            });
        }
        if !self.virtual_root.is_absolute() {
            return Err(VaultError::InvalidConfig {
                reason: format!(
                    "virtual_root must be absolute: {}",
                    self.virtual_root.display()
                ),
            });
        }
        if self.cache_ttl.is_zero() {
            return Err(VaultError::InvalidConfig {
                reason: "cache_ttl must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abs_root() -> &'static str {
        if cfg!(windows) {
            "C:\\vault\\mount"
        } else {
            "/vault/mount"
        }
    }

    #[test]
    fn test_defaults() {
        let config = MountConfig::new("store", abs_root());
        assert_eq!(config.cache_ttl, DEFAULT_CACHE_TTL);
        assert!(!config.debug);
        assert!(config.is_regenerated(&VaultPath::new("/invites/iom_invite.txt")));
        assert!(!config.is_regenerated(&VaultPath::new("/chats/log.txt")));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(MountConfig::new("", abs_root()).validate().is_err());
        assert!(MountConfig::new("store", "").validate().is_err());
        assert!(MountConfig::new("store", "relative/root").validate().is_err());
        assert!(MountConfig::new("store", abs_root())
            .cache_ttl(Duration::ZERO)
            .validate()
            .is_err());
        assert!(MountConfig::new("store", abs_root()).validate().is_ok());
    }

    #[test]
    fn test_builder_setters() {
        let config = MountConfig::new("store", abs_root())
            .cache_ttl(Duration::from_secs(5))
            .debug(true)
            .regenerate_prefixes(vec![VaultPath::new("/generated")]);
        assert_eq!(config.cache_ttl, Duration::from_secs(5));
        assert!(config.debug);
        assert!(config.is_regenerated(&VaultPath::new("/generated/a")));
        assert!(!config.is_regenerated(&VaultPath::new("/invites/a")));
    }
}
