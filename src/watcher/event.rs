//! Change events produced by the tracker.
//!
//! Events serialize as `{"kind": "...", "payload": {...}}` so a transport
//! can relay them to remote clients unchanged:
//!
//! ```rust
//! use ora_watch::watcher::event::{Deleted, Event};
//!
//! let event = Event::Deleted(Deleted { name: "a.md".into() });
//! let json = serde_json::to_string(&event).unwrap();
//! assert_eq!(json, r#"{"kind":"deleted","payload":{"name":"a.md"}}"#);
//! ```

use serde::Serialize;
use std::fmt;

use crate::domain::{EntryMeta, MetaHint, ModToken};

/// An entry's token moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Changed {
    pub name: String,

    /// `true` when the change was caused through this tracker's own `write`
    /// rather than observed in the backend.
    pub local: bool,

    /// Previously remembered token; `None` for local writes.
    pub old: Option<ModToken>,

    pub new: ModToken,
}

/// An entry disappeared or was deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deleted {
    pub name: String,
}

/// A listing completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Listed {
    pub entries: Vec<EntryMeta>,

    /// `true` for the first listing a tracker performs. That listing is the
    /// baseline; subscribers should treat it as a full sync.
    pub initial: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSaved {
    pub document: String,
    pub token: ModToken,
    pub meta: Option<MetaHint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentDeleted {
    pub document: String,
}

/// Text of a freshly written document, for indexers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentIndexText {
    pub document: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "camelCase")]
pub enum Event {
    Changed(Changed),
    Deleted(Deleted),
    Listed(Listed),
    DocumentSaved(DocumentSaved),
    DocumentDeleted(DocumentDeleted),
    DocumentIndexText(DocumentIndexText),
}

/// Payload-free discriminant of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Changed,
    Deleted,
    Listed,
    DocumentSaved,
    DocumentDeleted,
    DocumentIndexText,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Changed => "changed",
            EventKind::Deleted => "deleted",
            EventKind::Listed => "listed",
            EventKind::DocumentSaved => "documentSaved",
            EventKind::DocumentDeleted => "documentDeleted",
            EventKind::DocumentIndexText => "documentIndexText",
        };
        f.write_str(name)
    }
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Changed(_) => EventKind::Changed,
            Event::Deleted(_) => EventKind::Deleted,
            Event::Listed(_) => EventKind::Listed,
            Event::DocumentSaved(_) => EventKind::DocumentSaved,
            Event::DocumentDeleted(_) => EventKind::DocumentDeleted,
            Event::DocumentIndexText(_) => EventKind::DocumentIndexText,
        }
    }

    /// The entry or document name this event is about; `None` for listings.
    pub fn name(&self) -> Option<&str> {
        match self {
            Event::Changed(e) => Some(&e.name),
            Event::Deleted(e) => Some(&e.name),
            Event::Listed(_) => None,
            Event::DocumentSaved(e) => Some(&e.document),
            Event::DocumentDeleted(e) => Some(&e.document),
            Event::DocumentIndexText(e) => Some(&e.document),
        }
    }

    pub(crate) fn changed(name: &str, local: bool, old: Option<ModToken>, new: ModToken) -> Self {
        Event::Changed(Changed {
            name: name.to_owned(),
            local,
            old,
            new,
        })
    }

    pub(crate) fn deleted(name: &str) -> Self {
        Event::Deleted(Deleted {
            name: name.to_owned(),
        })
    }

    pub(crate) fn document_deleted(document: &str) -> Self {
        Event::DocumentDeleted(DocumentDeleted {
            document: document.to_owned(),
        })
    }
}
