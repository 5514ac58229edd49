//! Immutable content blobs.
use crate::hash::Hash;
use bytes::Bytes;

/// An immutable byte vector with a known hash and length. Cheap to clone
/// (shared by reference via [Bytes]); never mutated after construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    hash: Hash,
    data: Bytes,
}

impl Blob {
    pub fn new(hash: Hash, data: Bytes) -> Self {
        Self { hash, data }
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }
}
