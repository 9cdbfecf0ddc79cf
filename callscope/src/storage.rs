//! # Ephemeral Output Storage
//!
//! The instrumentation expects an output directory to exist while it is
//! enabled. Sessions satisfy that with an in-memory store instead of the real
//! filesystem, so profiled tests stay hermetic and can run side by side.
//!
//! Directories are addressed by URL:
//!
//! ```text
//! mem://store-7/profiles
//! └─┬─┘ └──┬──┘ └──┬───┘
//! scheme  store   directory
//! ```
//!
//! Everything a store holds is discarded when it is dropped.

use crate::domain::StorageError;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

/// URL scheme of ephemeral locations
pub const URL_SCHEME: &str = "mem";

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Whether `url` points into an ephemeral store.
#[must_use]
pub fn is_ephemeral_url(url: &str) -> bool {
    url.strip_prefix(URL_SCHEME)
        .and_then(|rest| rest.strip_prefix("://"))
        .is_some_and(|rest| !rest.is_empty())
}

/// A process-local, non-persistent directory tree.
#[derive(Debug)]
pub struct EphemeralStore {
    id: u64,
    directories: Mutex<BTreeSet<String>>,
}

impl EphemeralStore {
    /// Create an empty store with a process-unique id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            directories: Mutex::new(BTreeSet::new()),
        }
    }

    /// Root URL of this store.
    #[must_use]
    pub fn root_url(&self) -> String {
        format!("{URL_SCHEME}://store-{}", self.id)
    }

    /// Create directory `name` and return its URL.
    ///
    /// # Errors
    /// Names containing path separators, and names already taken.
    pub fn create_dir(&self, name: &str) -> Result<String, StorageError> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        let url = self.url_of(name);
        if !self.directories.lock().insert(name.to_string()) {
            return Err(StorageError::AlreadyExists(url));
        }
        Ok(url)
    }

    /// URL of directory `name`, if it exists.
    #[must_use]
    pub fn url(&self, name: &str) -> Option<String> {
        self.directories
            .lock()
            .contains(name)
            .then(|| self.url_of(name))
    }

    /// Whether `url` names a directory of this store.
    #[must_use]
    pub fn contains_url(&self, url: &str) -> bool {
        url.strip_prefix(&self.root_url())
            .and_then(|rest| rest.strip_prefix('/'))
            .is_some_and(|name| self.directories.lock().contains(name))
    }

    fn url_of(&self, name: &str) -> String {
        format!("{}/{name}", self.root_url())
    }
}

impl Default for EphemeralStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_dir_returns_addressable_url() {
        let store = EphemeralStore::new();
        let url = store.create_dir("profiles").unwrap();
        assert!(url.starts_with("mem://store-"));
        assert!(url.ends_with("/profiles"));
        assert!(is_ephemeral_url(&url));
        assert!(store.contains_url(&url));
        assert_eq!(store.url("profiles"), Some(url));
    }

    #[test]
    fn test_stores_are_isolated() {
        let a = EphemeralStore::new();
        let b = EphemeralStore::new();
        let url_a = a.create_dir("profiles").unwrap();
        let url_b = b.create_dir("profiles").unwrap();
        assert_ne!(url_a, url_b);
        assert!(!b.contains_url(&url_a));
    }

    #[test]
    fn test_duplicate_dir_rejected() {
        let store = EphemeralStore::new();
        store.create_dir("profiles").unwrap();
        let err = store.create_dir("profiles").unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
    }

    #[test]
    fn test_invalid_names_rejected() {
        let store = EphemeralStore::new();
        for name in ["", "a/b", "..", "a\\b"] {
            assert_eq!(
                store.create_dir(name),
                Err(StorageError::InvalidName(name.to_string()))
            );
        }
        assert_eq!(store.url("missing"), None);
    }

    #[test]
    fn test_real_paths_are_not_ephemeral() {
        assert!(!is_ephemeral_url("/tmp/profiles"));
        assert!(!is_ephemeral_url("mem://"));
        assert!(!is_ephemeral_url("file:///tmp"));
    }
}
