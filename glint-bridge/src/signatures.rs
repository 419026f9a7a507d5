//! Signature cache - notifications that already reached a decision

use std::collections::VecDeque;
use std::fs;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Number of signatures kept unless configured otherwise
pub const DEFAULT_LIMIT: usize = 300;

/// Newest-first list of signatures, capped at `limit`.
///
/// Eviction is by insertion order only: a signature is useful because it was inserted once,
/// lookups do not refresh it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signatures {
    entries: VecDeque<String>,
    limit: usize,
}

impl Signatures {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit,
        }
    }

    fn from_entries(entries: Vec<String>, limit: usize) -> Self {
        let mut entries = VecDeque::from(entries);
        entries.truncate(limit);
        Self { entries, limit }
    }

    pub fn contains(&self, signature: &str) -> bool {
        self.entries.iter().any(|s| s == signature)
    }

    /// Prepend a signature, dropping the oldest beyond the configured limit
    pub fn insert(&mut self, signature: impl Into<String>) {
        self.insert_limited(signature, self.limit);
    }

    /// Prepend a signature, dropping the oldest beyond `limit`
    pub fn insert_limited(&mut self, signature: impl Into<String>, limit: usize) {
        self.entries.push_front(signature.into());
        self.entries.truncate(limit);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Newest first
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

struct Inner {
    signatures: Signatures,
    path: Option<PathBuf>,
}

/// Process-wide signature cache shared by every accessory session.
///
/// Cloning gives another handle to the same cache. All access goes through one mutex, and
/// every insert rewrites the backing file while the lock is held.
#[derive(Clone)]
pub struct SignatureCache {
    inner: Arc<Mutex<Inner>>,
}

impl SignatureCache {
    /// A cache that is never written to disk
    pub fn in_memory(limit: usize) -> Self {
        Self::with_state(Signatures::new(limit), None)
    }

    /// Load the cache from `path`.
    ///
    /// A missing or unreadable file is not an error: duplicate suppression starts over empty.
    pub fn open(path: impl Into<PathBuf>, limit: usize) -> Self {
        let path = path.into();
        let signatures = match load(&path) {
            Ok(entries) => {
                tracing::debug!(path = %path.display(), count = entries.len(), "loaded signature cache");
                Signatures::from_entries(entries, limit)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "could not load signature cache, starting empty: {e}");
                Signatures::new(limit)
            }
        };
        Self::with_state(signatures, Some(path))
    }

    fn with_state(signatures: Signatures, path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner { signatures, path })),
        }
    }

    /// Hold the cache for a read-then-insert sequence
    pub fn lock(&self) -> SignatureGuard<'_> {
        SignatureGuard {
            inner: self.inner.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    pub fn contains(&self, signature: &str) -> bool {
        self.lock().contains(signature)
    }

    pub fn insert(&self, signature: impl Into<String>) {
        self.lock().insert(signature);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the current signatures, newest first
    pub fn snapshot(&self) -> Vec<String> {
        self.lock().iter().map(str::to_string).collect()
    }
}

/// Exclusive access to the cache; reads through `Deref`, inserts persist immediately
pub struct SignatureGuard<'a> {
    inner: MutexGuard<'a, Inner>,
}

impl SignatureGuard<'_> {
    pub fn insert(&mut self, signature: impl Into<String>) {
        self.inner.signatures.insert(signature);
        self.persist();
    }

    pub fn insert_limited(&mut self, signature: impl Into<String>, limit: usize) {
        self.inner.signatures.insert_limited(signature, limit);
        self.persist();
    }

    fn persist(&self) {
        let Some(path) = &self.inner.path else {
            return;
        };
        if let Err(e) = save(path, &self.inner.signatures) {
            tracing::warn!(path = %path.display(), "error writing signature cache: {e}");
        }
    }
}

impl Deref for SignatureGuard<'_> {
    type Target = Signatures;

    fn deref(&self) -> &Signatures {
        &self.inner.signatures
    }
}

fn load(path: &Path) -> std::io::Result<Vec<String>> {
    let data = fs::read_to_string(path)?;
    serde_json::from_str(&data).map_err(std::io::Error::other)
}

/// Write to a sibling file and rename it over the old one
fn save(path: &Path, signatures: &Signatures) -> std::io::Result<()> {
    let entries: Vec<&str> = signatures.iter().collect();
    let data = serde_json::to_vec(&entries).map_err(std::io::Error::other)?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)
}
