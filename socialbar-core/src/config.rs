//! Bridge configuration.
//!
//! Usually built with [`BridgeConfig::default`]; hosts that want to tune the
//! wait bound can ship a TOML file:
//!
//! ```toml
//! wait_timeout_ms = 250
//! thread_name_prefix = "toolbar-worker"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// Upper bound, in milliseconds, on how long a facade call waits for the worker.
pub const WAIT_TIMEOUT_MS: u64 = 500;
/// Extra attempts allowed when the session hands back an empty user record.
pub const MAX_USER_RETRIES: u32 = 1;

const DEFAULT_THREAD_PREFIX: &str = "socialbar-worker";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// How long a blocking facade call waits before returning the cached value.
    pub wait_timeout_ms: u64,
    /// Re-fetches of an empty logged-in user record. Never more than
    /// [`MAX_USER_RETRIES`].
    pub user_retry_limit: u32,
    /// Worker threads are named `{prefix}-{n}`.
    pub thread_name_prefix: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: WAIT_TIMEOUT_MS,
            user_retry_limit: MAX_USER_RETRIES,
            thread_name_prefix: DEFAULT_THREAD_PREFIX.to_string(),
        }
    }
}

impl BridgeConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, BridgeError> {
        let config: Self = toml::from_str(s)?;
        Ok(config.normalized())
    }

    pub fn load(path: &Path) -> Result<Self, BridgeError> {
        let s = std::fs::read_to_string(path).map_err(|source| BridgeError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&s)?;
        tracing::debug!(path = %path.display(), ?config, "loaded bridge config");
        Ok(config)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_user_retry_limit(mut self, limit: u32) -> Self {
        self.user_retry_limit = limit;
        self.normalized()
    }

    fn normalized(mut self) -> Self {
        if self.user_retry_limit > MAX_USER_RETRIES {
            tracing::warn!(
                requested = self.user_retry_limit,
                "user_retry_limit capped at {MAX_USER_RETRIES}"
            );
            self.user_retry_limit = MAX_USER_RETRIES;
        }
        if self.thread_name_prefix.trim().is_empty() {
            self.thread_name_prefix = DEFAULT_THREAD_PREFIX.to_string();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.wait_timeout(), Duration::from_millis(500));
        assert_eq!(config.user_retry_limit, 1);
        assert_eq!(config.thread_name_prefix, "socialbar-worker");
    }

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = BridgeConfig::from_toml_str("").unwrap();
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = BridgeConfig::from_toml_str("wait_timeout_ms = 120").unwrap();
        assert_eq!(config.wait_timeout_ms, 120);
        assert_eq!(config.user_retry_limit, 1);
    }

    #[test]
    fn test_retry_limit_is_capped() {
        let config = BridgeConfig::from_toml_str("user_retry_limit = 10").unwrap();
        assert_eq!(config.user_retry_limit, MAX_USER_RETRIES);

        let config = BridgeConfig::default().with_user_retry_limit(0);
        assert_eq!(config.user_retry_limit, 0);
    }

    #[test]
    fn test_blank_prefix_falls_back() {
        let config = BridgeConfig::from_toml_str("thread_name_prefix = \"  \"").unwrap();
        assert_eq!(config.thread_name_prefix, "socialbar-worker");
    }

    #[test]
    fn test_bad_toml_is_an_error() {
        let err = BridgeConfig::from_toml_str("wait_timeout_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, BridgeError::ConfigParse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "wait_timeout_ms = 75").unwrap();
        writeln!(file, "thread_name_prefix = \"toolbar\"").unwrap();

        let config = BridgeConfig::load(file.path()).unwrap();
        assert_eq!(config.wait_timeout(), Duration::from_millis(75));
        assert_eq!(config.thread_name_prefix, "toolbar");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = BridgeConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, BridgeError::ConfigRead { .. }));
    }
}
