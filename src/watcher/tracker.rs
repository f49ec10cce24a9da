use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, trace};

use crate::config::TrackerConfig;
use crate::domain::{DocumentMatcher, Entry, EntryMeta, ModToken, WriteOptions};
use crate::error::OraResult;
use crate::shelf::storage::Storage;
use crate::watcher::dispatch::Dispatcher;
use crate::watcher::event::{DocumentIndexText, DocumentSaved, Event, Listed};
use crate::watcher::guard::Guard;
use crate::watcher::snapshot::Snapshot;

/// Decorates a [`Storage`] so every operation also yields change events.
///
/// The backend has no change notifications of its own, so the tracker
/// remembers the last token it saw for every entry and diffs against it.
///
/// # Nesting
///
/// Operations are meant to run on a cooperative scheduler: several may be in
/// flight at once on the same tracker, and event handlers may call back into
/// it. The first operation to start becomes *top-level* and holds the guard
/// until it returns. Any operation that starts while the guard is held is
/// *nested*: it still performs its backend call and returns the result, but
/// neither updates the snapshot nor dispatches events. The next top-level
/// [`list`](Self::list) reconciles whatever it missed.
///
/// Two exceptions: `list` always diffs, and `write` always emits the
/// document events for document entries.
pub struct ChangeTracker<S, D> {
    storage: S,
    dispatcher: D,
    documents: DocumentMatcher,
    snapshot: Mutex<Snapshot>,
    guard: Guard,
    initialized: AtomicBool,
}

impl<S, D> ChangeTracker<S, D>
where
    S: Storage,
    D: Dispatcher,
{
    pub fn new(storage: S, dispatcher: D) -> Self {
        Self {
            storage,
            dispatcher,
            documents: DocumentMatcher::default(),
            snapshot: Mutex::new(Snapshot::new()),
            guard: Guard::new(),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn with_config(storage: S, dispatcher: D, config: &TrackerConfig) -> Self {
        Self::new(storage, dispatcher).with_documents(config.matcher())
    }

    pub fn with_documents(mut self, documents: DocumentMatcher) -> Self {
        self.documents = documents;
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    pub fn documents(&self) -> &DocumentMatcher {
        &self.documents
    }

    /// Last token the tracker observed for `name`.
    pub fn token_of(&self, name: &str) -> Option<ModToken> {
        self.snapshot().get(name)
    }

    pub fn snapshot_len(&self) -> usize {
        self.snapshot().len()
    }

    /// Whether a listing has completed on this tracker.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Whether a top-level operation is in flight.
    pub fn is_busy(&self) -> bool {
        self.guard.is_held()
    }

    /// Lists the backend and reconciles the snapshot against it.
    ///
    /// Dispatches, in order: `Changed` for every known entry whose token
    /// moved, `Deleted` (plus `DocumentDeleted` for documents) for every
    /// remembered entry missing from the listing, then `Listed`. Entries seen
    /// for the first time are recorded silently and only appear in `Listed`.
    pub async fn list(&self) -> OraResult<Vec<EntryMeta>> {
        let _scope = self.guard.enter();
        let entries = self.storage.list().await?;

        let initial = !self.is_initialized();
        let (changes, vanished) = self.reconcile(&entries);
        if initial {
            info!(entries = entries.len(), "baseline listing");
        }

        for event in changes {
            self.emit(event).await?;
        }
        for name in &vanished {
            self.emit_deleted(name).await?;
        }

        self.emit(Event::Listed(Listed {
            entries: entries.clone(),
            initial,
        }))
        .await?;

        self.initialized.store(true, Ordering::Release);
        Ok(entries)
    }

    /// Reads an entry, diffing its token when top-level.
    pub async fn read(&self, name: &str) -> OraResult<Entry> {
        let scope = self.guard.enter();
        let entry = self.storage.read(name).await?;

        if scope.is_top_level() {
            self.observe(name, entry.token).await?;
        } else {
            trace!(entry = name, "nested read, diff skipped");
        }

        Ok(entry)
    }

    /// Writes an entry through to the backend.
    ///
    /// Top-level writes record the new token and, unless the write is
    /// self-originated, dispatch `Changed { local: true, old: None }`.
    /// Writes to documents always dispatch `DocumentSaved` followed by
    /// `DocumentIndexText`, nested or not.
    pub async fn write(
        &self,
        name: &str,
        content: &[u8],
        options: WriteOptions,
    ) -> OraResult<ModToken> {
        let scope = self.guard.enter();
        let token = self
            .storage
            .write(name, content, options.self_originated, options.meta.as_ref())
            .await?;

        if scope.is_top_level() {
            self.snapshot().set(name, token);
            if !options.self_originated {
                self.emit(Event::changed(name, true, None, token)).await?;
            }
        } else {
            trace!(entry = name, "nested write, snapshot left stale");
        }

        if let Some(document) = self.documents.document_name(name) {
            self.emit(Event::DocumentSaved(DocumentSaved {
                document: document.clone(),
                token,
                meta: options.meta,
            }))
            .await?;

            self.emit(Event::DocumentIndexText(DocumentIndexText {
                document,
                text: String::from_utf8_lossy(content).into_owned(),
            }))
            .await?;
        }

        Ok(token)
    }

    /// Fetches an entry's token, diffing it when top-level.
    ///
    /// A `NotFound` from the backend is taken as evidence the entry is gone:
    /// a top-level call forgets it, dispatches `Deleted` (and
    /// `DocumentDeleted`), then returns the original error.
    pub async fn metadata(&self, name: &str) -> OraResult<ModToken> {
        let scope = self.guard.enter();

        match self.storage.metadata(name).await {
            Ok(token) => {
                if scope.is_top_level() {
                    self.observe(name, token).await?;
                }
                Ok(token)
            }
            Err(err) if err.is_not_found() => {
                if scope.is_top_level() {
                    debug!(entry = name, "metadata not found, treating as deleted");
                    self.snapshot().remove(name);
                    self.emit_deleted(name).await?;
                }
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Deletes an entry.
    ///
    /// For documents, `DocumentDeleted` goes out before the backend call;
    /// `Deleted` goes out only after the backend confirmed the delete.
    pub async fn delete(&self, name: &str) -> OraResult<()> {
        let scope = self.guard.enter();

        if scope.is_top_level() {
            if let Some(document) = self.documents.document_name(name) {
                self.emit(Event::document_deleted(&document)).await?;
            }
        }

        self.storage.delete(name).await?;

        if scope.is_top_level() {
            self.snapshot().remove(name);
            self.emit(Event::deleted(name)).await?;
        }

        Ok(())
    }

    /// Applies a fresh listing to the snapshot.
    ///
    /// Returns the `Changed` events to dispatch and the names that vanished,
    /// sorted.
    fn reconcile(&self, entries: &[EntryMeta]) -> (Vec<Event>, Vec<String>) {
        let mut snapshot = self.snapshot();
        let mut candidates = snapshot.keys();
        let mut changes = Vec::new();

        for entry in entries {
            candidates.remove(&entry.name);
            match snapshot.set(&entry.name, entry.token) {
                Some(old) if old != entry.token => {
                    changes.push(Event::changed(&entry.name, false, Some(old), entry.token));
                }
                _ => {}
            }
        }

        let mut vanished: Vec<String> = candidates.into_iter().collect();
        vanished.sort();
        for name in &vanished {
            snapshot.remove(name);
        }

        (changes, vanished)
    }

    /// Records a freshly observed token, dispatching `Changed` if it moved.
    async fn observe(&self, name: &str, token: ModToken) -> OraResult<()> {
        let previous = self.snapshot().set(name, token);

        match previous {
            Some(old) if old != token => {
                self.emit(Event::changed(name, false, Some(old), token))
                    .await
            }
            _ => Ok(()),
        }
    }

    async fn emit_deleted(&self, name: &str) -> OraResult<()> {
        self.emit(Event::deleted(name)).await?;
        if let Some(document) = self.documents.document_name(name) {
            self.emit(Event::document_deleted(&document)).await?;
        }
        Ok(())
    }

    async fn emit(&self, event: Event) -> OraResult<()> {
        self.dispatcher.dispatch(event).await?;
        Ok(())
    }

    fn snapshot(&self) -> MutexGuard<'_, Snapshot> {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shelf::memory::MemoryStorage;
    use crate::watcher::dispatch::{EventBus, EventLog};
    use std::sync::Arc;
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn logs_baseline_and_nested_skips() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert("a.md", "a");
        let tracker = ChangeTracker::new(storage, EventBus::default());

        tracker.list().await.unwrap();
        assert!(logs_contain("baseline listing"));

        let _outer = tracker.guard.enter();
        tracker.read("a.md").await.unwrap();
        assert!(logs_contain("nested read, diff skipped"));
    }

    #[test]
    fn reconcile_sorts_vanished_names() {
        let tracker = ChangeTracker::new(MemoryStorage::new(), EventLogDispatcher::default());
        {
            let mut snapshot = tracker.snapshot();
            snapshot.set("z", ModToken(1));
            snapshot.set("m", ModToken(1));
            snapshot.set("a", ModToken(1));
        }

        let kept = EntryMeta {
            name: "m".into(),
            token: ModToken(2),
            len: 0,
        };
        let (changes, vanished) = tracker.reconcile(&[kept]);

        assert_eq!(vanished, vec!["a".to_string(), "z".to_string()]);
        assert_eq!(changes, vec![Event::changed("m", false, Some(ModToken(1)), ModToken(2))]);
        assert_eq!(tracker.snapshot_len(), 1);
    }

    /// Dispatcher that records directly, without a bus.
    #[derive(Default)]
    struct EventLogDispatcher(EventLog);

    #[async_trait::async_trait]
    impl Dispatcher for EventLogDispatcher {
        async fn dispatch(&self, event: Event) -> OraResult<usize> {
            use crate::watcher::dispatch::Subscriber;
            self.0.handle(&event).await?;
            Ok(1)
        }
    }
}
