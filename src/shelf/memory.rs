use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::{Entry, EntryMeta, MetaHint, ModToken};
use crate::error::{OraError, OraResult};
use crate::shelf::storage::Storage;

struct Stored {
    content: Vec<u8>,
    token: ModToken,
}

/// An in-process [`Storage`] backed by a sorted map.
///
/// Tokens come from a per-instance counter, so every write yields a strictly
/// greater token. Each operation yields to the runtime once before touching
/// the map, the way a real I/O call would.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, Stored>>,
    clock: AtomicU64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an entry immediately, without yielding.
    ///
    /// Handy for seeding a backend or simulating an edit made by another
    /// process behind the tracker's back.
    pub fn insert(&self, name: &str, content: impl Into<Vec<u8>>) -> ModToken {
        let token = self.tick();
        self.entries().insert(
            name.to_owned(),
            Stored {
                content: content.into(),
                token,
            },
        );
        token
    }

    /// Removes an entry immediately, returning whether it existed.
    pub fn remove(&self, name: &str) -> bool {
        self.entries().remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn tick(&self) -> ModToken {
        ModToken(self.clock.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<String, Stored>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn list(&self) -> OraResult<Vec<EntryMeta>> {
        tokio::task::yield_now().await;

        Ok(self
            .entries()
            .iter()
            .map(|(name, stored)| EntryMeta {
                name: name.clone(),
                token: stored.token,
                len: stored.content.len() as u64,
            })
            .collect())
    }

    async fn read(&self, name: &str) -> OraResult<Entry> {
        tokio::task::yield_now().await;

        self.entries()
            .get(name)
            .map(|stored| Entry {
                name: name.to_owned(),
                token: stored.token,
                content: stored.content.clone(),
            })
            .ok_or_else(|| OraError::NotFound(name.to_owned()))
    }

    async fn write(
        &self,
        name: &str,
        content: &[u8],
        _self_originated: bool,
        _meta: Option<&MetaHint>,
    ) -> OraResult<ModToken> {
        tokio::task::yield_now().await;
        Ok(self.insert(name, content))
    }

    async fn metadata(&self, name: &str) -> OraResult<ModToken> {
        tokio::task::yield_now().await;

        self.entries()
            .get(name)
            .map(|stored| stored.token)
            .ok_or_else(|| OraError::NotFound(name.to_owned()))
    }

    async fn delete(&self, name: &str) -> OraResult<()> {
        tokio::task::yield_now().await;

        if self.remove(name) {
            Ok(())
        } else {
            Err(OraError::NotFound(name.to_owned()))
        }
    }
}
