//! # ora_watch
//!
//! Change detection and event dispatch for file-like stores that cannot
//! notify anyone about their own changes.
//!
//! A [`ChangeTracker`](watcher::ChangeTracker) wraps a storage backend. Every
//! list, read, write, metadata fetch, or delete that goes through it also
//! produces a de-duplicated stream of change events for subscribers such as
//! search indexers, UI refreshers, or sync agents, so none of them has to
//! poll the backend itself.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ora_watch::domain::WriteOptions;
//! use ora_watch::shelf::{LocalStorage, Shelf};
//! use ora_watch::watcher::{ChangeTracker, EventBus, EventLog};
//! use std::sync::Arc;
//!
//! # async fn run() -> ora_watch::OraResult<()> {
//! let shelf = Shelf::ensure_exists("my-notes")?;
//! let bus = Arc::new(EventBus::default());
//! let log = Arc::new(EventLog::new());
//! bus.subscribe(log.clone());
//!
//! let tracker = ChangeTracker::new(LocalStorage::from_shelf(&shelf)?, bus.clone());
//! tracker.list().await?;
//! tracker
//!     .write("todo.md", b"# Todo\n- ship it", WriteOptions::default())
//!     .await?;
//!
//! for event in log.events() {
//!     println!("{}: {:?}", event.kind(), event.name());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **[`domain`]**: tokens, entries, write options, document naming
//! - **[`shelf`]**: the storage contract and two backends (memory, directory)
//! - **[`watcher`]**: snapshot, guard, events, dispatch, tracker, poller
//! - **[`config`]**: JSON-loadable tracker settings
//! - **[`error`]**: unified error handling throughout the library
//!
//! ## Events
//!
//! | kind | when |
//! |---|---|
//! | `changed` | a token differs from the snapshot, or a local write |
//! | `deleted` | an entry vanished from a listing, was deleted, or its metadata is not found |
//! | `listed` | after every listing |
//! | `documentSaved` | after every write to a document |
//! | `documentDeleted` | a document was deleted or vanished |
//! | `documentIndexText` | after every write to a document, with its text |
//!
//! ## Error Handling
//!
//! All operations return [`OraResult<T>`] which wraps the unified [`OraError`] type.
//! Backend failures are propagated unchanged; a subscriber failure aborts the
//! remaining events of that operation and surfaces as [`OraError::Dispatch`].

pub mod config;
pub mod domain;
pub mod error;
pub mod shelf;
pub mod watcher;

/// Re-exports the most commonly used types for convenience.
pub use error::{OraError, OraResult};
