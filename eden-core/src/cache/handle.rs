use super::BlobCache;
use crate::blob::Blob;
use crate::hash::Hash;
use std::sync::{Arc, Weak};

/// A movable token that keeps a specific blob resident until dropped.
///
/// Holds a weak back-reference to the cache (so a handle never keeps the
/// cache itself alive) and a weak reference to the blob (so that, even after
/// the cache has evicted the entry, [BlobHandle::get_blob] can still return
/// it if some other owner — typically a `FileInode` — is keeping the `Arc`
/// alive).
pub struct BlobHandle {
    cache: Weak<BlobCache>,
    hash: Hash,
    blob: Weak<Blob>,
}

impl BlobHandle {
    pub(super) fn live(cache: Weak<BlobCache>, hash: Hash, blob: Weak<Blob>) -> Self {
        Self { cache, hash, blob }
    }

    /// An inert handle: dropping it is a no-op. Returned by [BlobCache::get]
    /// and [BlobCache::insert] for [super::Interest] variants that don't ask
    /// for one.
    pub fn empty() -> Self {
        Self {
            cache: Weak::new(),
            hash: Hash::zero(),
            blob: Weak::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cache.strong_count() == 0 && self.blob.strong_count() == 0
    }

    /// Returns the blob if the cache (and entry) are still alive, bumping
    /// recency in that case. Falls back to the weak blob reference if the
    /// cache has evicted the entry but another owner kept it alive. Returns
    /// `None` only if both have gone away.
    pub fn get_blob(&self) -> Option<Arc<Blob>> {
        if let Some(cache) = self.cache.upgrade() {
            if let Some(blob) = cache.peek_blob(&self.hash) {
                return Some(blob);
            }
        }
        self.blob.upgrade()
    }
}

impl Drop for BlobHandle {
    fn drop(&mut self) {
        if let Some(cache) = self.cache.upgrade() {
            cache.decrement_interest(&self.hash);
        }
    }
}
