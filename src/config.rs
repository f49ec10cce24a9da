//! Tracker configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config:
//!
//! ```rust
//! use ora_watch::config::TrackerConfig;
//!
//! let config = TrackerConfig::from_json(r#"{ "document_suffixes": [".md"] }"#).unwrap();
//! assert_eq!(config.event_capacity, 1024);
//! ```

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::domain::{DEFAULT_DOCUMENT_SUFFIXES, DocumentMatcher};
use crate::error::OraResult;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Entry name suffixes that mark an entry as a document.
    ///
    /// Defaults to `[".md", ".doc"]`.
    pub document_suffixes: Vec<String>,

    /// Buffer size of the event bus broadcast channel.
    ///
    /// Defaults to `1024`.
    pub event_capacity: usize,

    /// Interval between background listings, in milliseconds.
    ///
    /// `None` disables polling.
    pub poll_interval_ms: Option<u64>,

    /// Shelf opened by [`LocalStorage::from_config`](crate::shelf::LocalStorage::from_config).
    pub shelf: Option<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            document_suffixes: DEFAULT_DOCUMENT_SUFFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            event_capacity: 1024,
            poll_interval_ms: None,
            shelf: None,
        }
    }
}

impl TrackerConfig {
    pub fn from_json(raw: &str) -> OraResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Reads a JSON config file from disk.
    pub fn load(path: &Path) -> OraResult<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn matcher(&self) -> DocumentMatcher {
        DocumentMatcher::new(self.document_suffixes.iter().cloned())
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}
