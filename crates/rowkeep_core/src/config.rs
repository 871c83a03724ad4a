//! Runtime configuration for sessions and repositories.
//!
//! # Responsibility
//! - Hold tunables shared by every session opened on a connection.
//! - Read overrides from process environment without failing startup.
//!
//! # Invariants
//! - `max_page_size` and `default_page_size` are never zero.
//! - Invalid environment values are ignored (logged) and defaults are kept.

use log::warn;
use std::time::Duration;

const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_PAGE_SIZE: u32 = 2_000;
const DEFAULT_PAGE_SIZE: u32 = 20;

pub const ENV_LOCK_TIMEOUT_MS: &str = "ROWKEEP_LOCK_TIMEOUT_MS";
pub const ENV_MAX_PAGE_SIZE: &str = "ROWKEEP_MAX_PAGE_SIZE";
pub const ENV_DEFAULT_PAGE_SIZE: &str = "ROWKEEP_DEFAULT_PAGE_SIZE";
pub const ENV_FLUSH_MODE: &str = "ROWKEEP_FLUSH_MODE";

/// When a session writes pending changes without an explicit `flush()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Flush before every query and bulk statement, and on commit.
    Auto,
    /// Flush only on explicit `flush()` or `commit()`.
    Commit,
}

/// Session/repository configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataConfig {
    /// Upper bound for waiting on a conflicting write lock.
    pub lock_timeout: Duration,
    /// Page sizes above this value are clamped.
    pub max_page_size: u32,
    /// Used when a page request asks for size `0`.
    pub default_page_size: u32,
    /// Auto-flush policy.
    pub flush_mode: FlushMode,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            default_page_size: DEFAULT_PAGE_SIZE,
            flush_mode: FlushMode::Auto,
        }
    }
}

impl DataConfig {
    /// Defaults overridden by `ROWKEEP_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by values returned from `lookup`.
    ///
    /// Split from [`DataConfig::from_env`] so tests do not mutate process env.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_LOCK_TIMEOUT_MS) {
            match raw.trim().parse::<u64>() {
                Ok(millis) => config.lock_timeout = Duration::from_millis(millis),
                Err(_) => warn_invalid(ENV_LOCK_TIMEOUT_MS, &raw),
            }
        }
        if let Some(raw) = lookup(ENV_MAX_PAGE_SIZE) {
            match parse_page_size(&raw) {
                Some(size) => config.max_page_size = size,
                None => warn_invalid(ENV_MAX_PAGE_SIZE, &raw),
            }
        }
        if let Some(raw) = lookup(ENV_DEFAULT_PAGE_SIZE) {
            match parse_page_size(&raw) {
                Some(size) => config.default_page_size = size,
                None => warn_invalid(ENV_DEFAULT_PAGE_SIZE, &raw),
            }
        }
        if let Some(raw) = lookup(ENV_FLUSH_MODE) {
            match raw.trim().to_ascii_lowercase().as_str() {
                "auto" => config.flush_mode = FlushMode::Auto,
                "commit" => config.flush_mode = FlushMode::Commit,
                _ => warn_invalid(ENV_FLUSH_MODE, &raw),
            }
        }

        config
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_max_page_size(mut self, size: u32) -> Self {
        self.max_page_size = size.max(1);
        self
    }

    pub fn with_default_page_size(mut self, size: u32) -> Self {
        self.default_page_size = size.max(1);
        self
    }

    pub fn with_flush_mode(mut self, mode: FlushMode) -> Self {
        self.flush_mode = mode;
        self
    }
}

fn parse_page_size(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok().filter(|size| *size > 0)
}

fn warn_invalid(key: &str, raw: &str) {
    warn!("event=config_load module=config status=ignored key={key} value={raw:?}");
}

#[cfg(test)]
mod tests {
    use super::{DataConfig, FlushMode, ENV_FLUSH_MODE, ENV_LOCK_TIMEOUT_MS, ENV_MAX_PAGE_SIZE};
    use std::collections::HashMap;
    use std::time::Duration;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn lookup_overrides_defaults() {
        let config = DataConfig::from_lookup(lookup_from(&[
            (ENV_LOCK_TIMEOUT_MS, "250"),
            (ENV_MAX_PAGE_SIZE, "100"),
            (ENV_FLUSH_MODE, "Commit"),
        ]));

        assert_eq!(config.lock_timeout, Duration::from_millis(250));
        assert_eq!(config.max_page_size, 100);
        assert_eq!(config.default_page_size, 20);
        assert_eq!(config.flush_mode, FlushMode::Commit);
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let config = DataConfig::from_lookup(lookup_from(&[
            (ENV_LOCK_TIMEOUT_MS, "soon"),
            (ENV_MAX_PAGE_SIZE, "0"),
            (ENV_FLUSH_MODE, "sometimes"),
        ]));

        assert_eq!(config, DataConfig::default());
    }
}
