use async_trait::async_trait;
use ora_watch::domain::{EntryMeta, ModToken, WriteOptions};
use ora_watch::error::{OraError, OraResult};
use ora_watch::shelf::{MemoryStorage, Storage};
use ora_watch::watcher::event::{Changed, DocumentIndexText, DocumentSaved, Listed};
use ora_watch::watcher::{ChangeTracker, Event, EventBus, EventKind, EventLog, Subscriber};
use std::sync::{Arc, Mutex, OnceLock};

type Tracker = ChangeTracker<Arc<MemoryStorage>, Arc<EventBus>>;

struct Fixture {
    tracker: Arc<Tracker>,
    storage: Arc<MemoryStorage>,
    bus: Arc<EventBus>,
    log: Arc<EventLog>,
}

fn fixture() -> Fixture {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let storage = Arc::new(MemoryStorage::new());
    let bus = Arc::new(EventBus::default());
    let log = Arc::new(EventLog::new());
    bus.subscribe(log.clone());

    Fixture {
        tracker: Arc::new(ChangeTracker::new(storage.clone(), bus.clone())),
        storage,
        bus,
        log,
    }
}

fn changed_events(log: &EventLog) -> Vec<Changed> {
    log.events()
        .into_iter()
        .filter_map(|e| match e {
            Event::Changed(c) => Some(c),
            _ => None,
        })
        .collect()
}

fn listed_names(event: &Event) -> Vec<String> {
    match event {
        Event::Listed(Listed { entries, .. }) => entries.iter().map(|e| e.name.clone()).collect(),
        other => panic!("expected listed, got {other:?}"),
    }
}

#[tokio::test]
async fn repeated_listings_emit_only_listed() -> OraResult<()> {
    let f = fixture();
    f.storage.insert("a.md", "a");
    f.storage.insert("b.txt", "b");

    for _ in 0..3 {
        f.tracker.list().await?;
    }

    assert_eq!(f.log.kinds(), vec![EventKind::Listed; 3]);
    Ok(())
}

#[tokio::test]
async fn only_the_first_listing_is_initial() -> OraResult<()> {
    let f = fixture();
    f.storage.insert("a.md", "a");
    assert!(!f.tracker.is_initialized());

    f.tracker.list().await?;
    f.tracker.list().await?;

    let flags: Vec<bool> = f
        .log
        .events()
        .iter()
        .map(|e| match e {
            Event::Listed(l) => l.initial,
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(flags, vec![true, false]);
    assert!(f.tracker.is_initialized());
    Ok(())
}

#[tokio::test]
async fn new_entry_appears_only_in_listing() -> OraResult<()> {
    let f = fixture();
    f.tracker.list().await?;
    f.log.clear();

    f.storage.insert("fresh.md", "hello");
    f.tracker.list().await?;

    let events = f.log.events();
    assert_eq!(events.len(), 1);
    assert_eq!(listed_names(&events[0]), vec!["fresh.md"]);
    assert!(f.tracker.token_of("fresh.md").is_some());
    Ok(())
}

#[tokio::test]
async fn list_reports_external_change_with_both_tokens() -> OraResult<()> {
    let f = fixture();
    let old = f.storage.insert("a.md", "v1");
    f.tracker.list().await?;
    f.log.clear();

    let new = f.storage.insert("a.md", "v2");
    f.tracker.list().await?;

    assert_eq!(
        changed_events(&f.log),
        vec![Changed {
            name: "a.md".into(),
            local: false,
            old: Some(old),
            new,
        }]
    );
    assert_eq!(f.log.kinds().last(), Some(&EventKind::Listed));
    Ok(())
}

#[tokio::test]
async fn top_level_read_reports_external_change_once() -> OraResult<()> {
    let f = fixture();
    let old = f.storage.insert("a.md", "v1");
    f.tracker.list().await?;
    f.log.clear();

    let new = f.storage.insert("a.md", "v2");
    let entry = f.tracker.read("a.md").await?;
    assert_eq!(entry.text(), "v2");

    // Already reconciled: neither a second read nor a listing repeats it.
    f.tracker.read("a.md").await?;
    f.tracker.list().await?;

    let changes = changed_events(&f.log);
    assert_eq!(changes.len(), 1);
    assert_eq!((changes[0].old, changes[0].new), (Some(old), new));
    assert!(!changes[0].local);
    Ok(())
}

#[tokio::test]
async fn read_of_unknown_entry_only_records_it() -> OraResult<()> {
    let f = fixture();
    let token = f.storage.insert("a.md", "v1");

    f.tracker.read("a.md").await?;

    assert!(f.log.events().is_empty());
    assert_eq!(f.tracker.token_of("a.md"), Some(token));
    Ok(())
}

#[tokio::test]
async fn vanished_entries_are_deleted_before_listed() -> OraResult<()> {
    let f = fixture();
    f.storage.insert("notes.doc", "n");
    f.storage.insert("image.png", "i");
    f.storage.insert("keep.md", "k");
    f.tracker.list().await?;
    f.log.clear();

    f.storage.remove("notes.doc");
    f.storage.remove("image.png");
    f.tracker.list().await?;

    let events = f.log.events();
    assert_eq!(
        events.iter().map(Event::kind).collect::<Vec<_>>(),
        vec![
            EventKind::Deleted,
            EventKind::Deleted,
            EventKind::DocumentDeleted,
            EventKind::Listed
        ]
    );
    assert_eq!(events[0].name(), Some("image.png"));
    assert_eq!(events[1].name(), Some("notes.doc"));
    assert_eq!(events[2].name(), Some("notes"));
    assert_eq!(listed_names(&events[3]), vec!["keep.md"]);
    assert_eq!(f.tracker.token_of("notes.doc"), None);
    Ok(())
}

#[tokio::test]
async fn local_write_is_flagged_local() -> OraResult<()> {
    let f = fixture();
    let token = f
        .tracker
        .write("data.bin", b"\x00\x01", WriteOptions::default())
        .await?;

    assert_eq!(
        changed_events(&f.log),
        vec![Changed {
            name: "data.bin".into(),
            local: true,
            old: None,
            new: token,
        }]
    );
    assert_eq!(f.tracker.token_of("data.bin"), Some(token));
    Ok(())
}

#[tokio::test]
async fn self_originated_write_is_silent_but_recorded() -> OraResult<()> {
    let f = fixture();
    let token = f
        .tracker
        .write("data.bin", b"x", WriteOptions::self_originated())
        .await?;

    assert!(changed_events(&f.log).is_empty());
    assert_eq!(f.tracker.token_of("data.bin"), Some(token));

    f.tracker.list().await?;
    assert!(changed_events(&f.log).is_empty());
    Ok(())
}

#[tokio::test]
async fn write_then_list_reports_no_external_change() -> OraResult<()> {
    let f = fixture();
    f.tracker.list().await?;
    f.tracker
        .write("new.txt", b"x", WriteOptions::default())
        .await?;
    f.log.clear();

    f.tracker.list().await?;

    let events = f.log.events();
    assert_eq!(events.len(), 1);
    assert_eq!(listed_names(&events[0]), vec!["new.txt"]);
    Ok(())
}

#[tokio::test]
async fn document_write_emits_saved_then_index_text() -> OraResult<()> {
    let f = fixture();
    let meta = serde_json::json!({ "author": "sam" });

    let token = f
        .tracker
        .write(
            "plan.md",
            "# Plan\nship".as_bytes(),
            WriteOptions::default().with_meta(meta.clone()),
        )
        .await?;

    let events = f.log.events();
    assert_eq!(
        events.iter().map(Event::kind).collect::<Vec<_>>(),
        vec![
            EventKind::Changed,
            EventKind::DocumentSaved,
            EventKind::DocumentIndexText
        ]
    );
    assert_eq!(
        events[1],
        Event::DocumentSaved(DocumentSaved {
            document: "plan".into(),
            token,
            meta: Some(meta),
        })
    );
    assert_eq!(
        events[2],
        Event::DocumentIndexText(DocumentIndexText {
            document: "plan".into(),
            text: "# Plan\nship".into(),
        })
    );
    Ok(())
}

#[tokio::test]
async fn document_text_is_decoded_lossily() -> OraResult<()> {
    let f = fixture();
    f.tracker
        .write("broken.md", b"ok \xff", WriteOptions::self_originated())
        .await?;

    let text = f.log.events().into_iter().find_map(|e| match e {
        Event::DocumentIndexText(t) => Some(t.text),
        _ => None,
    });
    assert_eq!(text.as_deref(), Some("ok \u{fffd}"));
    Ok(())
}

#[tokio::test]
async fn metadata_reports_change_like_read() -> OraResult<()> {
    let f = fixture();
    f.storage.insert("a.md", "v1");
    f.tracker.list().await?;
    f.log.clear();

    let new = f.storage.insert("a.md", "v2");
    assert_eq!(f.tracker.metadata("a.md").await?, new);

    assert_eq!(changed_events(&f.log).len(), 1);
    assert_eq!(f.tracker.token_of("a.md"), Some(new));
    Ok(())
}

#[tokio::test]
async fn metadata_not_found_emits_deletion_then_fails() -> OraResult<()> {
    let f = fixture();
    f.storage.insert("notes.doc", "n");
    f.tracker.list().await?;
    f.log.clear();
    f.storage.remove("notes.doc");

    let err = f.tracker.metadata("notes.doc").await.unwrap_err();

    assert!(matches!(err, OraError::NotFound(ref name) if name == "notes.doc"));
    let events = f.log.events();
    assert_eq!(
        events.iter().map(Event::kind).collect::<Vec<_>>(),
        vec![EventKind::Deleted, EventKind::DocumentDeleted]
    );
    assert_eq!(events[0].name(), Some("notes.doc"));
    assert_eq!(events[1].name(), Some("notes"));
    assert_eq!(f.tracker.token_of("notes.doc"), None);

    // Already forgotten, so the next listing has nothing to delete.
    f.log.clear();
    f.tracker.list().await?;
    assert_eq!(f.log.kinds(), vec![EventKind::Listed]);
    Ok(())
}

#[tokio::test]
async fn metadata_not_found_for_plain_entry_skips_document_event() {
    let f = fixture();

    let err = f.tracker.metadata("ghost.bin").await.unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(f.log.kinds(), vec![EventKind::Deleted]);
}

/// Records whether `notes.doc` still existed in the backend when each event
/// arrived.
struct PresenceCheck {
    storage: Arc<MemoryStorage>,
    seen: Mutex<Vec<(EventKind, bool)>>,
}

#[async_trait]
impl Subscriber for PresenceCheck {
    async fn handle(&self, event: &Event) -> OraResult<()> {
        let present = self.storage.contains("notes.doc");
        self.seen.lock().unwrap().push((event.kind(), present));
        Ok(())
    }
}

// documentDeleted is announced before the backend delete, deleted only after
// it. Kept as observed behavior rather than made symmetric.
#[tokio::test]
async fn delete_document_announces_before_and_confirms_after() -> OraResult<()> {
    let f = fixture();
    f.storage.insert("notes.doc", "n");
    f.tracker.list().await?;

    let presence = Arc::new(PresenceCheck {
        storage: f.storage.clone(),
        seen: Mutex::new(Vec::new()),
    });
    f.bus.subscribe(presence.clone());

    f.tracker.delete("notes.doc").await?;

    assert_eq!(
        *presence.seen.lock().unwrap(),
        vec![
            (EventKind::DocumentDeleted, true),
            (EventKind::Deleted, false)
        ]
    );
    assert_eq!(f.tracker.token_of("notes.doc"), None);
    Ok(())
}

#[tokio::test]
async fn failed_delete_keeps_early_document_announcement() {
    let f = fixture();

    let err = f.tracker.delete("missing.md").await.unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(f.log.kinds(), vec![EventKind::DocumentDeleted]);
    assert!(!f.tracker.is_busy());
}

#[tokio::test]
async fn overlapping_reads_never_duplicate_changes() -> OraResult<()> {
    let f = fixture();
    f.storage.insert("a.md", "a1");
    f.storage.insert("b.md", "b1");
    f.tracker.list().await?;
    f.log.clear();

    f.storage.insert("a.md", "a2");
    f.storage.insert("b.md", "b2");

    let (a, b) = tokio::join!(f.tracker.read("a.md"), f.tracker.read("b.md"));
    assert_eq!(a?.text(), "a2");
    assert_eq!(b?.text(), "b2");

    // Only the operation that claimed the guard diffed.
    assert_eq!(changed_events(&f.log).len(), 1);

    f.tracker.list().await?;
    let mut names: Vec<String> = changed_events(&f.log).into_iter().map(|c| c.name).collect();
    names.sort();
    assert_eq!(names, vec!["a.md", "b.md"]);
    assert!(!f.tracker.is_busy());
    Ok(())
}

/// Reacts to a change of `trigger` by calling back into the tracker.
struct Reentrant {
    tracker: OnceLock<Arc<Tracker>>,
    trigger: &'static str,
    action: ReentrantAction,
}

enum ReentrantAction {
    Read(&'static str),
    Write(&'static str),
}

#[async_trait]
impl Subscriber for Reentrant {
    async fn handle(&self, event: &Event) -> OraResult<()> {
        let Event::Changed(change) = event else {
            return Ok(());
        };
        if change.name != self.trigger {
            return Ok(());
        }
        let Some(tracker) = self.tracker.get() else {
            return Ok(());
        };

        match self.action {
            ReentrantAction::Read(name) => {
                tracker.read(name).await?;
            }
            ReentrantAction::Write(name) => {
                tracker
                    .write(name, b"from handler", WriteOptions::default())
                    .await?;
            }
        }
        Ok(())
    }
}

fn reentrant(f: &Fixture, trigger: &'static str, action: ReentrantAction) {
    let subscriber = Arc::new(Reentrant {
        tracker: OnceLock::new(),
        trigger,
        action,
    });
    let _ = subscriber.tracker.set(f.tracker.clone());
    f.bus.subscribe(subscriber);
}

#[tokio::test]
async fn reads_from_event_handlers_are_nested() -> OraResult<()> {
    let f = fixture();
    f.storage.insert("a.md", "a1");
    let b_old = f.storage.insert("b.md", "b1");
    f.tracker.list().await?;
    reentrant(&f, "a.md", ReentrantAction::Read("b.md"));
    f.log.clear();

    f.storage.insert("a.md", "a2");
    let b_new = f.storage.insert("b.md", "b2");
    f.tracker.read("a.md").await?;

    let changes = changed_events(&f.log);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].name, "a.md");
    assert_eq!(f.tracker.token_of("b.md"), Some(b_old));

    f.log.clear();
    f.tracker.list().await?;
    let changes = changed_events(&f.log);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].name, "b.md");
    assert_eq!((changes[0].old, changes[0].new), (Some(b_old), b_new));
    Ok(())
}

#[tokio::test]
async fn writes_from_event_handlers_still_emit_document_events() -> OraResult<()> {
    let f = fixture();
    f.storage.insert("a.md", "a1");
    f.tracker.list().await?;
    reentrant(&f, "a.md", ReentrantAction::Write("side.md"));
    f.log.clear();

    f.storage.insert("a.md", "a2");
    f.tracker.read("a.md").await?;

    assert_eq!(
        f.log.kinds(),
        vec![
            EventKind::Changed,
            EventKind::DocumentSaved,
            EventKind::DocumentIndexText
        ]
    );
    assert_eq!(f.log.events()[1].name(), Some("side"));
    assert_eq!(f.tracker.token_of("side.md"), None);

    f.log.clear();
    f.tracker.list().await?;
    let events = f.log.events();
    assert_eq!(events.len(), 1, "new entries never produce changed events");
    assert_eq!(listed_names(&events[0]), vec!["a.md", "side.md"]);
    Ok(())
}

struct Reject(EventKind);

#[async_trait]
impl Subscriber for Reject {
    async fn handle(&self, event: &Event) -> OraResult<()> {
        if event.kind() == self.0 {
            return Err(OraError::Other(format!("rejected {}", self.0)));
        }
        Ok(())
    }
}

#[tokio::test]
async fn subscriber_failure_aborts_remaining_events_and_releases_guard() -> OraResult<()> {
    let f = fixture();
    f.storage.insert("a.md", "a1");
    f.tracker.list().await?;
    let id = f.bus.subscribe(Arc::new(Reject(EventKind::Changed)));
    f.log.clear();

    f.storage.insert("a.md", "a2");
    let err = f.tracker.list().await.unwrap_err();

    match err {
        OraError::Dispatch { subscriber, source } => {
            assert_eq!(subscriber, id);
            assert!(matches!(*source, OraError::Other(_)));
        }
        other => panic!("expected dispatch error, got {other:?}"),
    }
    assert_eq!(f.log.kinds(), vec![EventKind::Changed]);
    assert!(!f.tracker.is_busy());

    assert!(f.bus.unsubscribe(id));
    f.tracker.list().await?;
    assert_eq!(f.log.kinds().last(), Some(&EventKind::Listed));
    Ok(())
}

/// A backend whose listing can be switched to fail.
#[derive(Default)]
struct FlakyStorage {
    inner: MemoryStorage,
    broken: Mutex<bool>,
}

#[async_trait]
impl Storage for FlakyStorage {
    async fn list(&self) -> OraResult<Vec<EntryMeta>> {
        if *self.broken.lock().unwrap() {
            return Err(OraError::Backend("disk on fire".into()));
        }
        self.inner.list().await
    }

    async fn read(&self, name: &str) -> OraResult<ora_watch::domain::Entry> {
        self.inner.read(name).await
    }

    async fn write(
        &self,
        name: &str,
        content: &[u8],
        self_originated: bool,
        meta: Option<&serde_json::Value>,
    ) -> OraResult<ModToken> {
        self.inner.write(name, content, self_originated, meta).await
    }

    async fn metadata(&self, name: &str) -> OraResult<ModToken> {
        self.inner.metadata(name).await
    }

    async fn delete(&self, name: &str) -> OraResult<()> {
        self.inner.delete(name).await
    }
}

#[tokio::test]
async fn backend_failure_propagates_and_releases_guard() -> OraResult<()> {
    let storage = Arc::new(FlakyStorage::default());
    let log = Arc::new(EventLog::new());
    let bus = Arc::new(EventBus::default());
    bus.subscribe(log.clone());
    let tracker = ChangeTracker::new(storage.clone(), bus);

    *storage.broken.lock().unwrap() = true;
    let err = tracker.list().await.unwrap_err();
    assert!(matches!(err, OraError::Backend(_)));
    assert!(!tracker.is_busy());
    assert!(!tracker.is_initialized());
    assert!(log.events().is_empty());

    *storage.broken.lock().unwrap() = false;
    tracker.list().await?;
    assert!(tracker.is_initialized());
    Ok(())
}

#[tokio::test]
async fn snapshot_matches_backend_once_idle() -> OraResult<()> {
    let f = fixture();
    f.storage.insert("a.md", "a");
    f.storage.insert("b.md", "b");
    f.tracker.list().await?;

    f.tracker.write("c.md", b"c", WriteOptions::default()).await?;
    f.tracker.delete("a.md").await?;
    f.storage.insert("b.md", "b2");
    f.tracker.metadata("b.md").await?;
    f.tracker.write("d.txt", b"d", WriteOptions::self_originated()).await?;

    assert!(!f.tracker.is_busy());
    let listing = f.storage.list().await?;
    assert_eq!(f.tracker.snapshot_len(), listing.len());
    for entry in listing {
        assert_eq!(f.tracker.token_of(&entry.name), Some(entry.token));
    }
    assert_eq!(f.tracker.token_of("a.md"), None);
    Ok(())
}
