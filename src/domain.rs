use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{OraError, OraResult};

/// Opaque version marker the backend attaches to every entry.
///
/// Only equality matters to the tracker; ordering is provided so tokens can
/// be used as map keys and compared in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModToken(pub u64);

impl fmt::Display for ModToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Free-form metadata a caller can attach to a write.
///
/// The tracker never interprets it; it is forwarded to the backend and
/// echoed in [`DocumentSaved`](crate::watcher::event::DocumentSaved).
pub type MetaHint = serde_json::Value;

/// One row of a backend listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMeta {
    pub name: String,
    pub token: ModToken,
    pub len: u64,
}

/// An entry materialized by a read, content included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub token: ModToken,
    pub content: Vec<u8>,
}

impl Entry {
    /// Returns the content decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }
}

/// Per-call options for [`ChangeTracker::write`](crate::watcher::tracker::ChangeTracker::write).
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// The write was issued by the subscriber side itself (e.g. a sync agent
    /// replaying a remote edit), so no local change notification is needed.
    ///
    /// Defaults to `false`.
    pub self_originated: bool,

    /// Metadata forwarded to the backend and to `DocumentSaved`.
    pub meta: Option<MetaHint>,
}

impl WriteOptions {
    pub fn self_originated() -> Self {
        Self {
            self_originated: true,
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: MetaHint) -> Self {
        self.meta = Some(meta);
        self
    }
}

pub const DEFAULT_DOCUMENT_SUFFIXES: &[&str] = &[".md", ".doc"];

/// Decides which entry names are documents and what their document name is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMatcher {
    suffixes: Vec<String>,
}

impl Default for DocumentMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_DOCUMENT_SUFFIXES.iter().copied())
    }
}

impl DocumentMatcher {
    pub fn new<I, T>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            suffixes: suffixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }

    /// Returns the document name for `name`, i.e. the name with its
    /// recognized suffix stripped, or `None` if `name` is not a document.
    ///
    /// Hidden entries (leading `.`) and bare suffixes such as `".md"` are
    /// never documents.
    pub fn document_name(&self, name: &str) -> Option<String> {
        if name.starts_with('.') {
            return None;
        }

        self.suffixes
            .iter()
            .filter(|suffix| !suffix.is_empty())
            .find_map(|suffix| name.strip_suffix(suffix.as_str()))
            .filter(|stem| !stem.is_empty())
            .map(str::to_owned)
    }

    pub fn is_document(&self, name: &str) -> bool {
        self.document_name(name).is_some()
    }
}

/// Validates an entry or shelf name for filesystem safety.
///
/// Trims whitespace, ensures it is not empty, and rejects
/// OS-invalid characters (`/`, `\`, `:`, `"`, `*`, `?`, `<`, `>`, `|`).
pub fn valid_name(name: &str) -> OraResult<String> {
    let trimmed = name.trim();

    if trimmed.is_empty() || trimmed.contains(&['/', '\\', ':', '"', '*', '?', '<', '>', '|'][..])
    {
        return Err(OraError::InvalidName(name.to_owned()));
    }

    Ok(trimmed.to_owned())
}
