//! Bounded, insertion-ordered map from path to [`Handle`].
//!
//! One mapping-wide lock serializes `take`, `put` and eviction. Each handle's
//! claim count has its own lock, always taken after the mapping lock. Remote
//! closes for evicted handles are issued after both locks are dropped.

use hashlink::LinkedHashMap;
use parking_lot::{Mutex, MutexGuard};
use tracing::{trace, warn};

use crate::{FileStatus, Handle, RgwPath};

/// Path to handle cache with insertion-order eviction.
///
/// A hit is handed out with a fresh claim. Handles dropped from the map are
/// closed at once if unclaimed, otherwise when their last claim is released.
pub struct HandleCache {
    entries: Mutex<LinkedHashMap<RgwPath, Handle>>,
    capacity: usize,
}

impl HandleCache {
    /// Create an empty cache holding at most `capacity` handles.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(LinkedHashMap::new()),
            capacity,
        }
    }

    /// Maximum number of entries.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Returns `true` if `path` is cached.
    pub fn contains(&self, path: &RgwPath) -> bool {
        self.entries.lock().contains_key(path)
    }

    /// Returns `true` if the entry cached under `status.path` reports the same
    /// type, size and modification time as `status`.
    pub(crate) fn is_current(&self, status: &FileStatus) -> bool {
        self.entries.lock().get(&status.path).is_some_and(|handle| {
            let cached = handle.status();
            cached.file_type == status.file_type
                && cached.size == status.size
                && cached.modified == status.modified
        })
    }

    /// Cached paths, oldest first.
    pub fn paths(&self) -> Vec<RgwPath> {
        self.entries.lock().keys().cloned().collect()
    }

    pub(crate) fn lock_entries(&self) -> MutexGuard<'_, LinkedHashMap<RgwPath, Handle>> {
        self.entries.lock()
    }

    /// Remove the entry for `path` and return it with a new caller claim.
    pub fn take(&self, path: &RgwPath) -> Option<Handle> {
        let mut entries = self.entries.lock();
        let handle = entries.remove(path)?;
        match handle.retain() {
            Ok(()) => {
                trace!(%path, "handle cache hit");
                Some(handle)
            }
            Err(_) => {
                warn!(%path, "closed handle found in cache");
                None
            }
        }
    }

    /// Insert `handle` under `path`, evicting the oldest entry when full.
    ///
    /// A different handle already cached under `path` is evicted. With a
    /// capacity of zero nothing is inserted and `handle` itself is treated as
    /// evicted. Returns `true` if the handle was inserted.
    pub(crate) fn put(&self, path: &RgwPath, handle: Handle) -> bool {
        let mut victims = Vec::new();
        let inserted = {
            let mut entries = self.entries.lock();
            if let Some(previous) = entries.remove(path) {
                if !previous.ptr_eq(&handle) {
                    victims.push(previous);
                }
            }
            if self.capacity == 0 {
                victims.push(handle);
                false
            } else {
                while entries.len() >= self.capacity {
                    match entries.pop_front() {
                        Some((evicted, victim)) => {
                            trace!(path = %evicted, "evicting cached handle");
                            victims.push(victim);
                        }
                        None => break,
                    }
                }
                entries.insert(path.clone(), handle);
                true
            }
        };
        close_unclaimed(victims);
        inserted
    }

    /// Drop `path` and every cached descendant.
    pub(crate) fn invalidate(&self, prefix: &RgwPath) {
        let victims: Vec<Handle> = {
            let mut entries = self.entries.lock();
            let stale: Vec<RgwPath> = entries
                .keys()
                .filter(|p| p.starts_with(prefix))
                .cloned()
                .collect();
            stale.iter().filter_map(|p| entries.remove(p)).collect()
        };
        if !victims.is_empty() {
            trace!(%prefix, count = victims.len(), "invalidated cached handles");
        }
        close_unclaimed(victims);
    }

    /// Drop every entry. Handles still claimed close on their last release.
    pub fn evict_all(&self) {
        let victims: Vec<Handle> = {
            let mut entries = self.entries.lock();
            let mut drained = Vec::with_capacity(entries.len());
            while let Some((_, handle)) = entries.pop_front() {
                drained.push(handle);
            }
            drained
        };
        close_unclaimed(victims);
    }
}

fn close_unclaimed(victims: Vec<Handle>) {
    for victim in victims {
        if let Some(remote) = victim.close_if_unclaimed() {
            victim.mount().close_remote(remote, victim.path());
        }
    }
}

impl std::fmt::Debug for HandleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
