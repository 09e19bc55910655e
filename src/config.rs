//! Configuration for opening a graph and running the schema lifecycle.
//!
//! Every struct deserialises from TOML with all fields optional, so a config
//! file only needs to name what it overrides:
//!
//! ```toml
//! reindex_batch_size = 250
//!
//! [sqlite]
//! busy_timeout_ms = 2000
//! pragma_settings = { journal_mode = "WAL" }
//!
//! [index_wait]
//! timeout_ms = 30000
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::EntityGraphError;

/// Options applied to the SQLite connection when a graph is opened.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SqliteConfig {
    /// Capacity of the prepared statement cache. `None` keeps rusqlite's default.
    pub cache_size: Option<usize>,

    /// How long a writer waits on a locked database before failing.
    pub busy_timeout_ms: Option<u64>,

    /// Extra `PRAGMA key = value` statements, applied in key order.
    pub pragma_settings: BTreeMap<String, String>,
}

/// Bounds on the blocking wait for newly built indexes.
///
/// The wait polls the index status with exponential backoff, starting at
/// `initial_backoff_ms` and doubling up to `max_backoff_ms`, and gives up with
/// [`EntityGraphError::IndexWaitTimeout`] once `timeout_ms` has elapsed.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IndexWaitConfig {
    pub timeout_ms: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl IndexWaitConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms.max(self.initial_backoff_ms))
    }
}

impl Default for IndexWaitConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            initial_backoff_ms: 5,
            max_backoff_ms: 500,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GraphConfig {
    pub sqlite: SqliteConfig,

    pub index_wait: IndexWaitConfig,

    /// Number of elements an index backfill processes per status poll.
    pub reindex_batch_size: usize,
}

impl GraphConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, EntityGraphError> {
        toml::from_str(input).map_err(|e| EntityGraphError::invalid_input(e.to_string()))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, EntityGraphError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            EntityGraphError::invalid_input(format!("{}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            sqlite: SqliteConfig::default(),
            index_wait: IndexWaitConfig::default(),
            reindex_batch_size: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_config_default() {
        let cfg = GraphConfig::default();
        assert!(cfg.sqlite.cache_size.is_none());
        assert!(cfg.sqlite.pragma_settings.is_empty());
        assert_eq!(cfg.index_wait.timeout(), Duration::from_secs(60));
        assert_eq!(cfg.reindex_batch_size, 1000);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg = GraphConfig::from_toml_str(
            r#"
            reindex_batch_size = 2

            [sqlite]
            pragma_settings = { journal_mode = "WAL" }

            [index_wait]
            timeout_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(cfg.reindex_batch_size, 2);
        assert_eq!(
            cfg.sqlite.pragma_settings.get("journal_mode").map(String::as_str),
            Some("WAL")
        );
        assert_eq!(cfg.index_wait.timeout_ms, 250);
        assert_eq!(cfg.index_wait.initial_backoff_ms, 5);
    }

    #[test]
    fn test_max_backoff_never_below_initial() {
        let cfg = IndexWaitConfig {
            timeout_ms: 10,
            initial_backoff_ms: 20,
            max_backoff_ms: 1,
        };
        assert_eq!(cfg.max_backoff(), Duration::from_millis(20));
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        let err = GraphConfig::from_toml_str("reindex_batch_size = \"many\"").unwrap_err();
        assert!(matches!(err, EntityGraphError::InvalidInput(_)));
    }
}
