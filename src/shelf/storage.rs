use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::{Entry, EntryMeta, MetaHint, ModToken};
use crate::error::OraResult;

/// A file-like store keyed by name.
///
/// Implementations report absent entries as
/// [`OraError::NotFound`](crate::error::OraError::NotFound); every other
/// error is treated as a backend failure and propagated unchanged.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Lists every entry currently stored.
    async fn list(&self) -> OraResult<Vec<EntryMeta>>;

    /// Reads an entry's content together with its current token.
    async fn read(&self, name: &str) -> OraResult<Entry>;

    /// Stores `content` under `name` and returns the new token.
    async fn write(
        &self,
        name: &str,
        content: &[u8],
        self_originated: bool,
        meta: Option<&MetaHint>,
    ) -> OraResult<ModToken>;

    /// Returns the current token of an entry.
    async fn metadata(&self, name: &str) -> OraResult<ModToken>;

    async fn delete(&self, name: &str) -> OraResult<()>;
}

#[async_trait]
impl<T: Storage + ?Sized> Storage for Arc<T> {
    async fn list(&self) -> OraResult<Vec<EntryMeta>> {
        (**self).list().await
    }

    async fn read(&self, name: &str) -> OraResult<Entry> {
        (**self).read(name).await
    }

    async fn write(
        &self,
        name: &str,
        content: &[u8],
        self_originated: bool,
        meta: Option<&MetaHint>,
    ) -> OraResult<ModToken> {
        (**self).write(name, content, self_originated, meta).await
    }

    async fn metadata(&self, name: &str) -> OraResult<ModToken> {
        (**self).metadata(name).await
    }

    async fn delete(&self, name: &str) -> OraResult<()> {
        (**self).delete(name).await
    }
}
