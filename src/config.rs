//! Runtime configuration, resolved from environment variables with typed
//! fallbacks — same shape as the log-rotation config a cooperative-scheduler
//! daemon carries (one `env::var(...).ok().and_then(...).unwrap_or(DEFAULT)`
//! per field).

use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    DEFAULT_PROFILE, FLUSH_TIMEOUT, FLUSH_WRITE_THRESHOLD, MIN_FREE_BYTES, REBUILD_HEADROOM_RATIO,
};
use crate::error::{Result, StoreError};

/// Resolved runtime configuration for one `ObjectStore` instance.
#[derive(Debug, Clone)]
pub struct Config {
    /// Sugar-style profile name, used to namespace the datastore root.
    pub profile: String,
    /// Explicit root override (bypasses profile resolution); used in tests.
    pub root_override: Option<PathBuf>,
    /// Force a flush after this many pending index writes.
    pub flush_write_threshold: u32,
    /// Force a flush after this much time has passed since the last write.
    pub flush_timeout: Duration,
    /// Free-bytes floor below which the orchestrator prefers scratch storage.
    pub min_free_bytes: u64,
    /// Headroom ratio required before copying a rebuilt scratch index back
    /// onto the primary disk.
    pub rebuild_headroom_ratio: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: DEFAULT_PROFILE.to_string(),
            root_override: None,
            flush_write_threshold: FLUSH_WRITE_THRESHOLD,
            flush_timeout: FLUSH_TIMEOUT,
            min_free_bytes: MIN_FREE_BYTES,
            rebuild_headroom_ratio: REBUILD_HEADROOM_RATIO,
        }
    }
}

impl Config {
    /// Build configuration from `CUBBYSTORE_*` environment variables,
    /// falling back to the numeric constants spec.md fixes.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(profile) = std::env::var("CUBBYSTORE_PROFILE") {
            if !profile.is_empty() {
                config.profile = profile;
            }
        }

        if let Ok(home) = std::env::var("CUBBYSTORE_HOME") {
            if !home.is_empty() {
                config.root_override = Some(PathBuf::from(home));
            }
        }

        config.flush_write_threshold = std::env::var("CUBBYSTORE_FLUSH_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(FLUSH_WRITE_THRESHOLD);

        config.flush_timeout = std::env::var("CUBBYSTORE_FLUSH_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(FLUSH_TIMEOUT);

        config.min_free_bytes = std::env::var("CUBBYSTORE_MIN_FREE_BYTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(MIN_FREE_BYTES);

        config.rebuild_headroom_ratio = std::env::var("CUBBYSTORE_REBUILD_HEADROOM")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(REBUILD_HEADROOM_RATIO);

        config
    }

    /// Resolve the datastore root directory: an explicit override, or
    /// `$HOME/.cubbystore/<profile>/datastore`.
    pub fn resolve_root(&self) -> Result<PathBuf> {
        if let Some(root) = &self.root_override {
            return Ok(root.clone());
        }

        let home = dirs::home_dir()
            .ok_or_else(|| StoreError::config("could not determine home directory"))?;

        Ok(home
            .join(".cubbystore")
            .join(&self.profile)
            .join(crate::constants::DATASTORE_DIR_NAME))
    }

    /// Build a config pinned to an explicit root, bypassing profile/env
    /// resolution entirely. Used by tests and by `cubby --root <path>`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root_override: Some(root.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.profile, "default");
        assert_eq!(config.flush_write_threshold, 20);
        assert_eq!(config.flush_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_with_root_bypasses_resolution() {
        let config = Config::with_root("/tmp/somewhere");
        assert_eq!(config.resolve_root().unwrap(), PathBuf::from("/tmp/somewhere"));
    }
}
