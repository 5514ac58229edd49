//! The on-disk mount configuration external collaborator: the
//! parent-commit pointer is written through to this collaborator on every
//! `reset_parent`. Parsing the on-disk format itself is out of scope;
//! this crate only defines the write-through trait
//! and the in-memory fixture used to test it, plus the [MountConfig] struct
//! an embedder's config loader is expected to hand to [crate::mount::Mount].
use crate::hash::Hash;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Settings a mount is constructed with. An embedder typically deserializes
/// this from its on-disk config file and passes it to
/// [crate::mount::Mount::initialize]; parsing that file is the embedder's
/// job, not this crate's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    /// Default uid/gid assigned to newly created files.
    pub default_uid: u32,
    pub default_gid: u32,
    /// Creation mask applied on top of a caller-supplied mode.
    pub umask: u32,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            default_uid: 0,
            default_gid: 0,
            umask: 0o022,
        }
    }
}

/// Persists the mount's parent-commit pointer through to disk.
pub trait ConfigStore: Send + Sync {
    fn persist_parent(&self, commit: Hash);
    fn last_persisted_parent(&self) -> Option<Hash>;
}

#[derive(Default)]
pub struct MemoryConfigStore {
    parent: Mutex<Option<Hash>>,
}

impl ConfigStore for MemoryConfigStore {
    fn persist_parent(&self, commit: Hash) {
        *self.parent.lock() = Some(commit);
    }

    fn last_persisted_parent(&self) -> Option<Hash> {
        *self.parent.lock()
    }
}
