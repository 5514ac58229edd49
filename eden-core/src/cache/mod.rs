//! A thread-safe in-memory LRU cache of immutable content blobs, with
//! interest handles that keep a blob resident while a consumer uses it.
//!
//! Grounded in `eden/fs/store/BlobCache.h`: a single lock around a
//! hashmap-plus-eviction-queue, an `Interest` enum controlling whether a
//! lookup bumps recency/refcount, and a handle whose drop releases the
//! reference. One behavior is preserved exactly as observed rather than
//! "fixed": `Interest::LikelyNeededAgain` increments an entry's reference
//! count but hands back no handle to ever decrement it again — such an
//! entry only becomes evictable again if the whole cache forgets it via a
//! later `WantHandle` roundtrip whose handle is dropped. This mirrors the
//! original header's doc comment ("assumed to be worth caching until it is
//! naturally evicted") and is not a bug we're asked to resolve.
mod handle;

pub use handle::BlobHandle;

use crate::blob::Blob;
use crate::hash::Hash;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    UnlikelyNeededAgain,
    LikelyNeededAgain,
    WantHandle,
}

struct Entry {
    blob: Arc<Blob>,
    reference_count: u64,
}

struct State {
    entries: HashMap<Hash, Entry>,
    /// Eviction queue, ordered least-recently-touched (front) to
    /// most-recently-touched (back).
    order: Vec<Hash>,
    total_size: u64,
}

impl State {
    fn move_to_back(&mut self, hash: Hash) {
        if let Some(pos) = self.order.iter().position(|h| *h == hash) {
            self.order.remove(pos);
        }
        self.order.push(hash);
    }

    fn remove_entry(&mut self, hash: &Hash) {
        if let Some(entry) = self.entries.remove(hash) {
            self.total_size -= entry.blob.len();
        }
        if let Some(pos) = self.order.iter().position(|h| h == hash) {
            self.order.remove(pos);
        }
    }

    fn evict_to_budget(&mut self, max_bytes: u64, min_entries: usize) {
        let mut i = 0;
        while self.total_size > max_bytes && self.entries.len() > min_entries {
            if i >= self.order.len() {
                break;
            }
            let hash = self.order[i];
            let evictable = self
                .entries
                .get(&hash)
                .map(|e| e.reference_count == 0)
                .unwrap_or(false);
            if evictable {
                tracing::trace!(%hash, "evicting blob over budget");
                self.remove_entry(&hash);
                // removal shifted subsequent elements left; re-scan from the
                // same index.
            } else {
                i += 1;
            }
        }
    }
}

pub struct BlobCache {
    max_bytes: u64,
    min_entries: usize,
    state: Mutex<State>,
}

impl BlobCache {
    pub fn new(maximum_cache_size_bytes: u64, minimum_entry_count: usize) -> Arc<Self> {
        Arc::new(Self {
            max_bytes: maximum_cache_size_bytes,
            min_entries: minimum_entry_count,
            state: Mutex::new(State {
                entries: HashMap::new(),
                order: Vec::new(),
                total_size: 0,
            }),
        })
    }

    pub fn total_size(&self) -> u64 {
        self.state.lock().total_size
    }

    pub fn entry_count(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn get(self: &Arc<Self>, hash: &Hash, interest: Interest) -> (Option<Arc<Blob>>, BlobHandle) {
        let mut state = self.state.lock();
        let Some(entry) = state.entries.get_mut(hash) else {
            return (None, BlobHandle::empty());
        };
        let blob = entry.blob.clone();
        match interest {
            Interest::UnlikelyNeededAgain => (Some(blob), BlobHandle::empty()),
            Interest::LikelyNeededAgain => {
                entry.reference_count += 1;
                state.move_to_back(*hash);
                (Some(blob), BlobHandle::empty())
            }
            Interest::WantHandle => {
                entry.reference_count += 1;
                state.move_to_back(*hash);
                let handle = BlobHandle::live(Arc::downgrade(self), *hash, Arc::downgrade(&blob));
                (Some(blob), handle)
            }
        }
    }

    pub fn insert(self: &Arc<Self>, blob: Blob, interest: Interest) -> BlobHandle {
        let hash = blob.hash();
        let mut state = self.state.lock();

        if !state.entries.contains_key(&hash) {
            let size = blob.len();
            state.entries.insert(
                hash,
                Entry {
                    blob: Arc::new(blob),
                    reference_count: 0,
                },
            );
            state.order.push(hash);
            state.total_size += size;
        }
        // else: the existing entry is retained; `blob` (the caller's new
        // object) is simply dropped here.

        let resident = state.entries.get(&hash).unwrap().blob.clone();
        let handle = match interest {
            Interest::UnlikelyNeededAgain => BlobHandle::empty(),
            Interest::LikelyNeededAgain => {
                state.entries.get_mut(&hash).unwrap().reference_count += 1;
                state.move_to_back(hash);
                BlobHandle::empty()
            }
            Interest::WantHandle => {
                state.entries.get_mut(&hash).unwrap().reference_count += 1;
                state.move_to_back(hash);
                BlobHandle::live(Arc::downgrade(self), hash, Arc::downgrade(&resident))
            }
        };

        state.evict_to_budget(self.max_bytes, self.min_entries);
        handle
    }

    fn decrement_interest(&self, hash: &Hash) {
        let mut state = self.state.lock();
        let Some(entry) = state.entries.get_mut(hash) else {
            return;
        };
        if entry.reference_count > 0 {
            entry.reference_count -= 1;
        }
        if entry.reference_count == 0 {
            // Removed immediately, regardless of queue position.
            state.remove_entry(hash);
        }
    }

    fn peek_blob(&self, hash: &Hash) -> Option<Arc<Blob>> {
        let mut state = self.state.lock();
        let blob = state.entries.get(hash).map(|e| e.blob.clone())?;
        state.move_to_back(*hash);
        Some(blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn blob(byte: u8, len: usize) -> Blob {
        let mut bytes = vec![byte; len];
        bytes[0] = byte;
        Blob::new(Hash::from_bytes([byte; crate::hash::HASH_LEN]), Bytes::from(bytes))
    }

    #[test]
    fn get_on_empty_cache_misses() {
        let cache = BlobCache::new(100, 2);
        let (found, handle) = cache.get(&Hash::zero(), Interest::WantHandle);
        assert!(found.is_none());
        assert!(handle.get_blob().is_none());
    }

    #[test]
    fn insert_then_get_hits() {
        let cache = BlobCache::new(100, 2);
        let b = blob(1, 10);
        let h = b.hash();
        cache.insert(b, Interest::UnlikelyNeededAgain);
        let (found, _handle) = cache.get(&h, Interest::UnlikelyNeededAgain);
        assert!(found.is_some());
        assert_eq!(cache.total_size(), 10);
    }

    #[test]
    fn reinsert_keeps_existing_entry() {
        let cache = BlobCache::new(100, 2);
        let b1 = blob(2, 10);
        let h = b1.hash();
        cache.insert(b1, Interest::UnlikelyNeededAgain);
        let size_before = cache.total_size();
        cache.insert(blob(2, 10), Interest::UnlikelyNeededAgain);
        assert_eq!(cache.total_size(), size_before);
        assert_eq!(cache.entry_count(), 1);
        let _ = h;
    }

    /// Three 60-byte blobs in a 100-byte/2-entry-floor cache, all inserted
    /// with WantHandle. Dropping a handle evicts its blob immediately.
    #[test]
    fn eviction_respects_entry_floor_and_handle_drop_evicts() {
        let cache = BlobCache::new(100, 2);
        let b1 = blob(1, 60);
        let b2 = blob(2, 60);
        let b3 = blob(3, 60);
        let (h1, h2, h3) = (b1.hash(), b2.hash(), b3.hash());

        let handle1 = cache.insert(b1, Interest::WantHandle);
        assert_eq!(cache.entry_count(), 1);

        let _handle2 = cache.insert(b2, Interest::WantHandle);
        // Budget exceeded (120 > 100) but floor is 2 entries, both handled
        // (refcount > 0), so nothing is evicted.
        assert_eq!(cache.entry_count(), 2);

        let _handle3 = cache.insert(b3, Interest::WantHandle);
        // Still at the floor: all three are pinned by live handles, so
        // eviction can make no progress past the floor.
        assert_eq!(cache.entry_count(), 3);

        drop(handle1);
        assert_eq!(cache.entry_count(), 2);
        let (found, _) = cache.get(&h1, Interest::UnlikelyNeededAgain);
        assert!(found.is_none());

        let (found2, _) = cache.get(&h2, Interest::UnlikelyNeededAgain);
        assert!(found2.is_some());
        let (found3, _) = cache.get(&h3, Interest::UnlikelyNeededAgain);
        assert!(found3.is_some());
    }

    #[test]
    fn handle_survives_eviction_if_blob_kept_alive_elsewhere() {
        let cache = BlobCache::new(10, 0);
        let b = blob(9, 5);
        let h = b.hash();
        let (_found, handle) = {
            cache.insert(b, Interest::UnlikelyNeededAgain);
            cache.get(&h, Interest::WantHandle)
        };
        // keep the blob alive independently of the cache.
        let kept_alive = handle.get_blob().unwrap();

        // Force eviction of everything evictable by inserting past budget
        // with a zero floor; the handle itself still holds a refcount so
        // our own entry won't evict from this call, but demonstrate the
        // weak-blob fallback path directly instead.
        drop(handle);
        // after the handle is dropped, the entry is gone from the cache...
        let (found_after, _) = cache.get(&h, Interest::UnlikelyNeededAgain);
        assert!(found_after.is_none());
        // ...but the previously obtained Arc<Blob> is still valid.
        assert_eq!(kept_alive.hash(), h);
    }

    #[test]
    fn likely_needed_again_returns_no_handle_and_pins_entry() {
        let cache = BlobCache::new(10, 0);
        let b = blob(7, 5);
        let h = b.hash();
        cache.insert(b, Interest::LikelyNeededAgain);
        // No way to release this reference: it stays resident even when
        // the cache is well over any reasonable budget, since nothing ever
        // decrements the count that `LikelyNeededAgain` raised.
        cache.insert(blob(8, 500), Interest::UnlikelyNeededAgain);
        let (found, _) = cache.get(&h, Interest::UnlikelyNeededAgain);
        assert!(found.is_some());
    }
}
