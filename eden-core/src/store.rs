//! The object store external collaborator: a content-addressed
//! store of commits, trees, and blobs, addressed only by [Hash]. The core
//! never picks a storage engine; it is handed an `Arc<dyn ObjectStore>`.
use crate::blob::Blob;
use crate::hash::Hash;
use crate::path::PathComponent;
use async_trait::async_trait;
use std::collections::HashMap;
use parking_lot::RwLock;

/// The kind of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Regular,
    Executable,
    Symlink,
    Directory,
}

impl NodeKind {
    pub fn is_directory(&self) -> bool {
        matches!(self, NodeKind::Directory)
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self, NodeKind::Symlink)
    }
}

/// One named child of a [Tree].
#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub name: PathComponent,
    pub hash: Hash,
    pub kind: NodeKind,
    /// Owner-permission bits, independent of `kind`.
    pub mode: u32,
}

/// An ordered sequence of named children — a manifest, immutable once
/// produced by the importer.
#[derive(Debug, Clone, Default)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn new(entries: Vec<TreeEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn get(&self, name: &PathComponent) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| &e.name == name)
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_tree(&self, hash: &Hash) -> Option<Tree>;
    async fn get_blob(&self, hash: &Hash) -> Option<Blob>;
    async fn put_tree(&self, tree: Tree) -> Hash;
    async fn put_blob(&self, blob: Blob) -> Hash;
    async fn put_commit(&self, hash: Hash, tree_root: Hash);
}

/// An in-memory [ObjectStore], used by tests and by [crate::testing] fixtures.
#[derive(Default)]
pub struct MemoryObjectStore {
    trees: RwLock<HashMap<Hash, Tree>>,
    blobs: RwLock<HashMap<Hash, Blob>>,
    commits: RwLock<HashMap<Hash, Hash>>,
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_tree(&self, hash: &Hash) -> Option<Tree> {
        self.trees.read().get(hash).cloned()
    }

    async fn get_blob(&self, hash: &Hash) -> Option<Blob> {
        self.blobs.read().get(hash).cloned()
    }

    async fn put_tree(&self, tree: Tree) -> Hash {
        // Tests construct trees with a hash they already picked; store keyed
        // fixtures separately via `put_tree_at` where that matters. For the
        // generic put, derive a cheap pseudo-hash from the entry count and
        // names so repeated inserts of an identical tree collide.
        let hash = Self::content_hash(&tree);
        self.trees.write().insert(hash, tree);
        hash
    }

    async fn put_blob(&self, blob: Blob) -> Hash {
        let hash = blob.hash();
        self.blobs.write().insert(hash, blob);
        hash
    }

    async fn put_commit(&self, hash: Hash, tree_root: Hash) {
        self.commits.write().insert(hash, tree_root);
    }
}

impl MemoryObjectStore {
    fn content_hash(tree: &Tree) -> Hash {
        // Not a real hash function (the core takes none as a dependency) —
        // just enough determinism for in-memory round-tripping in tests.
        let mut acc = [0u8; crate::hash::HASH_LEN];
        for entry in tree.entries() {
            for (i, b) in entry.name.as_bytes().iter().enumerate() {
                acc[i % acc.len()] ^= *b;
            }
            for (i, b) in entry.hash.as_bytes().iter().enumerate() {
                acc[i % acc.len()] ^= *b;
            }
        }
        Hash::from_bytes(acc)
    }

    /// Insert a tree at a caller-chosen hash, bypassing content hashing.
    /// Fixtures need this to build a manifest graph with specific hashes
    /// referenced from parent entries.
    pub fn put_tree_at(&self, hash: Hash, tree: Tree) {
        self.trees.write().insert(hash, tree);
    }

    pub fn put_commit_at(&self, commit: Hash, tree_root: Hash) {
        self.commits.write().insert(commit, tree_root);
    }

    pub async fn get_commit_tree(&self, commit: &Hash) -> Option<Hash> {
        self.commits.read().get(commit).copied()
    }
}
