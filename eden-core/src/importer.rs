//! The source-control importer external collaborator. The
//! importer turns a commit identifier into a root tree hash (populating the
//! object store along the way) and can fetch individual blob contents it
//! hasn't pushed into the store yet.
use crate::blob::Blob;
use crate::hash::Hash;
use async_trait::async_trait;
use std::collections::HashMap;
use parking_lot::RwLock;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ImportError {
    #[error("unknown revision: {0}")]
    UnknownRevision(String),
    #[error("value not present in store: {0}")]
    NotInStore(Hash),
}

#[async_trait]
pub trait Importer: Send + Sync {
    /// Resolves a commit (given as its textual hash) to a root tree hash,
    /// populating the object store as a side effect.
    async fn import_manifest(&self, commit_hash_text: &str) -> Result<Hash, ImportError>;

    /// Fetches the byte contents of a blob by hash.
    async fn import_file_contents(&self, hash: &Hash) -> Result<Blob, ImportError>;
}

/// An in-memory [Importer] backed by caller-seeded revision/content maps.
#[derive(Default)]
pub struct MemoryImporter {
    revisions: RwLock<HashMap<String, Hash>>,
    blobs: RwLock<HashMap<Hash, Blob>>,
}

impl MemoryImporter {
    pub fn seed_revision(&self, commit_hash_text: impl Into<String>, root_tree: Hash) {
        self.revisions.write().insert(commit_hash_text.into(), root_tree);
    }

    pub fn seed_blob(&self, blob: Blob) {
        self.blobs.write().insert(blob.hash(), blob);
    }
}

#[async_trait]
impl Importer for MemoryImporter {
    async fn import_manifest(&self, commit_hash_text: &str) -> Result<Hash, ImportError> {
        self.revisions
            .read()
            .get(commit_hash_text)
            .copied()
            .ok_or_else(|| ImportError::UnknownRevision(commit_hash_text.to_string()))
    }

    async fn import_file_contents(&self, hash: &Hash) -> Result<Blob, ImportError> {
        self.blobs
            .read()
            .get(hash)
            .cloned()
            .ok_or(ImportError::NotInStore(*hash))
    }
}
