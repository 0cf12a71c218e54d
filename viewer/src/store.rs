//! The blob store: a directory of immutable uploaded files,
//! each named by its [`StorageKey`].
//!
//! Blobs are written once and never modified or removed by the service.
//! A blob only becomes visible under its key
//! after all of its bytes have been written and synced,
//! so a key handed out to a client always refers to complete content.
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use snafu::ensure;
use tracing::warn;

use crate::error::{InvalidFileNameSnafu, InvalidKeySnafu, Result};

/// A source of nanosecond timestamps for generating storage keys.
pub trait Clock: Send + Sync {
    /// Obtain the current tick, in nanoseconds.
    fn now_nanos(&self) -> u64;
}

/// Wall clock time in nanoseconds since the Unix epoch.
///
/// Ticks handed out by the same instance strictly increase,
/// even if the system time stalls or goes backwards.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicU64,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock::default()
    }
}

impl Clock for SystemClock {
    fn now_nanos(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        let next = |last: u64| now.max(last.saturating_add(1));
        match self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| Some(next(last)))
        {
            Ok(last) | Err(last) => next(last),
        }
    }
}

/// The name of a stored blob,
/// of the form `<nanosecond-timestamp>_<original-filename>`.
///
/// A storage key never contains path separators
/// and never starts with a dot,
/// so it always names a plain file directly inside the store.
#[derive(Debug, Clone, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct StorageKey(String);

impl StorageKey {
    /// Build the key for a new upload
    /// received at the given tick.
    ///
    /// Only the last path component of `original_name` is kept.
    pub fn generate(tick: u64, original_name: &str) -> Result<Self> {
        let name = original_name
            .rsplit(|c| c == '/' || c == '\\')
            .next()
            .unwrap_or(original_name);
        ensure!(
            !name.is_empty() && name != "." && name != ".." && !name.contains('\0'),
            InvalidFileNameSnafu {
                name: original_name
            }
        );
        Ok(StorageKey(format!("{}_{}", tick, name)))
    }

    /// Validate a key received from a client.
    pub fn parse(key: &str) -> Result<Self> {
        ensure!(
            !key.is_empty()
                && !key.starts_with('.')
                && !key.contains(|c| c == '/' || c == '\\' || c == '\0'),
            InvalidKeySnafu { key }
        );
        Ok(StorageKey(key.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A directory of write-once blobs.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Open the store at the given directory,
    /// creating it if it does not exist.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(BlobStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The path of the file holding the blob with the given key.
    pub fn path_of(&self, key: &StorageKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    fn partial_path_of(&self, key: &StorageKey) -> PathBuf {
        self.root.join(format!(".{}.partial", key))
    }

    /// Write all bytes of `payload` as the blob for `key`,
    /// returning the number of bytes stored.
    ///
    /// The content is first written to a hidden partial file,
    /// which is only renamed to the key once fully synced.
    /// On failure the partial file is removed.
    pub fn put<R: Read>(&self, key: &StorageKey, mut payload: R) -> io::Result<u64> {
        let partial = self.partial_path_of(key);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&partial)?;

        let written = io::copy(&mut payload, &mut file).and_then(|written| {
            file.sync_all()?;
            Ok(written)
        });
        drop(file);

        let outcome = written.and_then(|written| {
            fs::rename(&partial, self.path_of(key))?;
            Ok(written)
        });
        if outcome.is_err() {
            discard(&partial);
        }
        outcome
    }

    /// Read the full content of the blob for `key`.
    pub fn get(&self, key: &StorageKey) -> io::Result<Vec<u8>> {
        fs::read(self.path_of(key))
    }

    /// Whether a blob is stored under `key`.
    pub fn contains(&self, key: &StorageKey) -> bool {
        self.path_of(key).is_file()
    }
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("Could not remove partial file {}: {}", path.display(), e);
        }
    }
}
