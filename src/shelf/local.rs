use async_trait::async_trait;
use std::fs::{self, Metadata};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::config::TrackerConfig;
use crate::domain::{Entry, EntryMeta, MetaHint, ModToken, valid_name};
use crate::error::{OraError, OraResult};
use crate::shelf::storage::Storage;

/// A named directory holding one flat collection of entries.
pub struct Shelf {
    pub root: PathBuf,
    pub name: String,
}

impl Shelf {
    /// Ensures `~/Documents/shelves/{name}` exists and opens it.
    ///
    /// # Errors
    /// - [`OraError::InvalidName`] if the name is empty or has invalid characters
    /// - [`OraError::NotFound`] if the documents directory cannot be determined
    /// - [`OraError::Io`] if the directory cannot be created
    pub fn ensure_exists(name: &str) -> OraResult<Self> {
        Self::ensure_in(&Self::shelves_dir()?, name)
    }

    /// Same as [`Shelf::ensure_exists`], rooted at `base` instead of the
    /// user's documents directory.
    pub fn ensure_in(base: &Path, name: &str) -> OraResult<Self> {
        let name = valid_name(name)?;
        let root = base.join(&name);
        if !root.exists() {
            fs::create_dir_all(&root)?;
        }

        Self::open_in(base, &name)
    }

    /// Opens an existing shelf under `base`.
    ///
    /// Returns [`OraError::NotFound`] if the shelf does not exist, or
    /// [`OraError::InvalidName`] if the path exists but is not a directory.
    pub fn open_in(base: &Path, name: &str) -> OraResult<Self> {
        let name = valid_name(name)?;
        let root = base.join(&name);

        if !root.exists() {
            return Err(OraError::NotFound(root.display().to_string()));
        }

        if !root.is_dir() {
            return Err(OraError::InvalidName(name));
        }

        Ok(Self { root, name })
    }

    fn shelves_dir() -> OraResult<PathBuf> {
        let docs = dirs::document_dir()
            .ok_or_else(|| OraError::NotFound("documents directory".into()))?;
        Ok(docs.join("shelves"))
    }
}

/// A [`Storage`] over the regular files directly inside one directory.
///
/// Entry names are file names. Directories, hidden files, and files whose
/// names fail validation are invisible.
/// Tokens are modification times in nanoseconds since the Unix epoch, so
/// two writes landing within the filesystem's timestamp granularity can
/// share a token.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Opens a storage over an existing directory.
    pub fn new(root: impl Into<PathBuf>) -> OraResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(OraError::NotFound(root.display().to_string()));
        }
        Ok(Self { root })
    }

    pub fn from_shelf(shelf: &Shelf) -> OraResult<Self> {
        Self::new(shelf.root.clone())
    }

    /// Opens the shelf named by `config.shelf` under `~/Documents/shelves`,
    /// creating it if missing.
    pub fn from_config(config: &TrackerConfig) -> OraResult<Self> {
        Self::from_config_in(&Shelf::shelves_dir()?, config)
    }

    /// Same as [`LocalStorage::from_config`], with shelves rooted at `base`.
    pub fn from_config_in(base: &Path, config: &TrackerConfig) -> OraResult<Self> {
        let name = config
            .shelf
            .as_deref()
            .ok_or_else(|| OraError::Other("no shelf configured".into()))?;
        Self::from_shelf(&Shelf::ensure_in(base, name)?)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, name: &str) -> OraResult<PathBuf> {
        Ok(self.root.join(addressable(name)?))
    }
}

/// Accepts only names that address the same file they were given as:
/// valid, already trimmed, and not hidden.
fn addressable(name: &str) -> OraResult<&str> {
    let valid = valid_name(name)?;
    if valid != name || valid.starts_with('.') {
        return Err(OraError::InvalidName(name.to_owned()));
    }
    Ok(name)
}

fn token_of(meta: &Metadata) -> OraResult<ModToken> {
    let nanos = meta
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map_err(|e| OraError::Backend(e.to_string()))?
        .as_nanos();
    let nanos = u64::try_from(nanos).map_err(|e| OraError::Backend(e.to_string()))?;
    Ok(ModToken(nanos))
}

fn map_io(name: &str, err: io::Error) -> OraError {
    if err.kind() == io::ErrorKind::NotFound {
        OraError::NotFound(name.to_owned())
    } else {
        OraError::Io(err)
    }
}

/// Writes data to a temporary file next to `path` and renames it in place,
/// so readers never observe a half-written entry.
fn write_atomic(path: &Path, data: &[u8]) -> io::Result<Metadata> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "entry has no parent"))?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    fs::metadata(path)
}

#[async_trait]
impl Storage for LocalStorage {
    async fn list(&self) -> OraResult<Vec<EntryMeta>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.root).await?;

        while let Some(entry) = dir.next_entry().await? {
            // Hidden, padded, or otherwise unaddressable names could not be
            // read back, so they are not entries.
            let name = entry.file_name().to_string_lossy().into_owned();
            if addressable(&name).is_err() {
                continue;
            }

            // Raced with a delete; the next listing will report it gone.
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if !meta.is_file() {
                continue;
            }

            entries.push(EntryMeta {
                name,
                token: token_of(&meta)?,
                len: meta.len(),
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn read(&self, name: &str) -> OraResult<Entry> {
        let path = self.entry_path(name)?;
        let content = tokio::fs::read(&path).await.map_err(|e| map_io(name, e))?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| map_io(name, e))?;

        Ok(Entry {
            name: name.to_owned(),
            token: token_of(&meta)?,
            content,
        })
    }

    async fn write(
        &self,
        name: &str,
        content: &[u8],
        _self_originated: bool,
        _meta: Option<&MetaHint>,
    ) -> OraResult<ModToken> {
        let path = self.entry_path(name)?;
        let data = content.to_vec();

        let meta = tokio::task::spawn_blocking(move || write_atomic(&path, &data))
            .await
            .map_err(|e| OraError::Other(e.to_string()))??;

        debug!(entry = name, bytes = content.len(), "wrote entry");
        token_of(&meta)
    }

    async fn metadata(&self, name: &str) -> OraResult<ModToken> {
        let path = self.entry_path(name)?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| map_io(name, e))?;

        if !meta.is_file() {
            return Err(OraError::NotFound(name.to_owned()));
        }
        token_of(&meta)
    }

    async fn delete(&self, name: &str) -> OraResult<()> {
        let path = self.entry_path(name)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| map_io(name, e))?;

        debug!(entry = name, "deleted entry");
        Ok(())
    }
}
