//! Object storage access.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{DataError, Result};

/// Opaque access credential, supplied once per session.
///
/// Its absence disables all image/feedback I/O; local review logic is
/// unaffected. The value never appears in Debug output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessKey(String);

impl AccessKey {
    /// Wrap a caller-supplied credential.
    ///
    /// # Errors
    ///
    /// An empty credential is equivalent to none at all and is
    /// rejected as [`DataError::MissingCredential`].
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(DataError::MissingCredential);
        }
        Ok(Self(key))
    }
}

impl fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessKey(***)")
    }
}

/// Read/write access to stored blobs by key.
///
/// Keys are forward-slash separated paths (`images/xyz.png`,
/// `feedback/feedback_<id>.json`).
pub trait ObjectStore {
    /// Fetch an object's bytes.
    ///
    /// # Errors
    ///
    /// [`DataError::NotFound`] / [`DataError::AccessDenied`] are
    /// recoverable and surfaced to the reviewer.
    fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Write an object, replacing any previous value for the key.
    fn put(&mut self, key: &str, bytes: &[u8]) -> Result<()>;
}

/// Object store over a local directory tree.
///
/// Construction requires the session's access credential; without one
/// the store cannot be built and all storage access stays disabled.
pub struct LocalObjectStore {
    root: PathBuf,
    _key: AccessKey,
}

impl LocalObjectStore {
    /// Open a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// [`DataError::MissingCredential`] when no key is supplied.
    pub fn new(root: impl Into<PathBuf>, key: Option<AccessKey>) -> Result<Self> {
        let key = key.ok_or(DataError::MissingCredential)?;
        Ok(Self {
            root: root.into(),
            _key: key,
        })
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        // Keys must stay inside the root.
        let relative = Path::new(key);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(DataError::AccessDenied {
                key: key.to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

impl ObjectStore for LocalObjectStore {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => DataError::NotFound {
                key: key.to_string(),
            },
            ErrorKind::PermissionDenied => DataError::AccessDenied {
                key: key.to_string(),
            },
            _ => DataError::Io(e),
        })
    }

    fn put(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        Ok(())
    }
}

/// In-memory object store for tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryObjectStore {
    objects: HashMap<String, Vec<u8>>,
}

impl MemoryObjectStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Stored keys, unordered.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(|k| k.as_str())
    }
}

impl ObjectStore for MemoryObjectStore {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .get(key)
            .cloned()
            .ok_or_else(|| DataError::NotFound {
                key: key.to_string(),
            })
    }

    fn put(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        self.objects.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}
