//! `TreeInode`: a directory, whose children start out as unloaded
//! descriptors taken from the backing manifest and are lazily promoted to
//! live inodes on first lookup.
use super::file::{FileInode, FileKind};
use super::map::InodeMap;
use super::{mode, Inode, InodeHeader, InodeMetadata, InodeNumber, SetAttrRequest};
use crate::clock::{Clock, Timestamp};
use crate::errors::{Error, Result};
use crate::hash::Hash;
use crate::importer::Importer;
use crate::path::PathComponent;
use crate::store::{NodeKind, ObjectStore};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::instrument;

/// A child slot in a directory's table. [ChildSlot::Loading] is transient:
/// it exists only between the moment a loader claims an unloaded child and
/// the moment it finishes, so concurrent lookups of the same name coalesce
/// onto a single in-flight load instead of racing the importer twice.
pub enum ChildSlot {
    Loaded(Inode),
    Unloaded {
        number: InodeNumber,
        hash: Hash,
        kind: NodeKind,
        mode: u32,
    },
    Loading(Arc<Notify>),
}

struct TreeInodeState {
    header: InodeHeader,
    children: HashMap<PathComponent, ChildSlot>,
    /// The manifest hash this directory's current child set was loaded
    /// from, or `None` if it was created locally (via `mkdir`) and so has
    /// no backing manifest to be demoted back to.
    source_hash: Option<Hash>,
}

pub struct TreeInode {
    state: Mutex<TreeInodeState>,
}

enum LookupAction {
    Wait(Arc<Notify>),
    Load {
        number: InodeNumber,
        hash: Hash,
        kind: NodeKind,
        mode: u32,
        notify: Arc<Notify>,
    },
}

impl TreeInode {
    pub fn new_root(uid: u32, gid: u32, permission_bits: u32, timestamp: Timestamp) -> Arc<Self> {
        let metadata = InodeMetadata::new(mode::S_IFDIR | (permission_bits & mode::PERM_MASK), uid, gid, timestamp);
        Arc::new(Self {
            state: Mutex::new(TreeInodeState {
                header: InodeHeader::new(super::ROOT_INODE_NUMBER, 0, None, metadata),
                children: HashMap::new(),
                source_hash: None,
            }),
        })
    }

    /// `timestamp` is the moment this directory's content should be
    /// reported as having been established: the mount's checkout time when
    /// `source_hash` comes from the manifest, or "now" when created locally
    /// via [TreeInode::mkdir].
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        number: InodeNumber,
        parent: InodeNumber,
        name: PathComponent,
        permission_bits: u32,
        uid: u32,
        gid: u32,
        source_hash: Option<Hash>,
        timestamp: Timestamp,
    ) -> Arc<Self> {
        let metadata = InodeMetadata::new(mode::S_IFDIR | (permission_bits & mode::PERM_MASK), uid, gid, timestamp);
        Arc::new(Self {
            state: Mutex::new(TreeInodeState {
                header: InodeHeader::new(number, parent, Some(name), metadata),
                children: HashMap::new(),
                source_hash,
            }),
        })
    }

    /// Seeds the child table with unloaded descriptors. `children` is
    /// `(name, pre-allocated inode number, hash, kind, mode)`; numbers must
    /// already have been reserved from the inode map by the caller so
    /// identity survives an unload/reload cycle.
    pub fn seed_unloaded(&self, children: Vec<(PathComponent, InodeNumber, Hash, NodeKind, u32)>) {
        let mut state = self.state.lock();
        for (name, number, hash, kind, mode) in children {
            state.children.insert(name, ChildSlot::Unloaded { number, hash, kind, mode });
        }
    }

    pub fn number(&self) -> InodeNumber {
        self.state.lock().header.number
    }

    pub fn parent_number(&self) -> InodeNumber {
        self.state.lock().header.parent
    }

    pub fn name_in_parent(&self) -> Option<PathComponent> {
        self.state.lock().header.name.clone()
    }

    pub fn get_attr(&self) -> InodeMetadata {
        self.state.lock().header.metadata
    }

    pub fn chown(&self, uid: u32, gid: u32, clock: &dyn Clock) {
        let mut state = self.state.lock();
        state.header.metadata.uid = uid;
        state.header.metadata.gid = gid;
        state.header.touch_metadata(clock);
    }

    /// Applies a subset of `{mode, uid, gid, atime, mtime}` to the
    /// directory's own metadata. Directories have no `size` to change.
    pub fn set_attr(&self, attr: SetAttrRequest, clock: &dyn Clock) -> InodeMetadata {
        let mut state = self.state.lock();
        if let Some(mode) = attr.mode {
            state.header.metadata.set_permission_bits(mode);
        }
        if let Some(uid) = attr.uid {
            state.header.metadata.uid = uid;
        }
        if let Some(gid) = attr.gid {
            state.header.metadata.gid = gid;
        }
        if let Some(atime) = attr.atime {
            state.header.metadata.atime = atime;
        }
        if let Some(mtime) = attr.mtime {
            state.header.metadata.mtime = mtime;
        }
        state.header.touch_metadata(clock);
        state.header.metadata
    }

    pub fn increment_fuse_refcount(&self) {
        self.state.lock().header.fuse_refcount += 1;
    }

    pub fn decrement_fuse_refcount(&self, delta: u64) -> u64 {
        let mut state = self.state.lock();
        state.header.fuse_refcount = state.header.fuse_refcount.saturating_sub(delta);
        state.header.fuse_refcount
    }

    pub fn fuse_refcount(&self) -> u64 {
        self.state.lock().header.fuse_refcount
    }

    /// `nlink`: two plus the number of child directories currently known
    /// (loaded or not), matching POSIX convention for `.` and each child's
    /// `..`.
    pub fn nlink(&self) -> u64 {
        let state = self.state.lock();
        let subdirs = state
            .children
            .values()
            .filter(|slot| matches!(slot, ChildSlot::Loaded(Inode::Tree(_)) | ChildSlot::Unloaded { kind: NodeKind::Directory, .. }))
            .count();
        2 + subdirs as u64
    }

    /// Snapshot of every child's name, inode number, and kind, without
    /// forcing any unloaded child to load.
    pub fn list_children(&self) -> Vec<(PathComponent, InodeNumber, NodeKind)> {
        let state = self.state.lock();
        state
            .children
            .iter()
            .filter_map(|(name, slot)| match slot {
                ChildSlot::Loaded(Inode::File(f)) => {
                    let kind = if f.kind() == FileKind::Symlink {
                        NodeKind::Symlink
                    } else {
                        NodeKind::Regular
                    };
                    Some((name.clone(), f.number(), kind))
                }
                ChildSlot::Loaded(Inode::Tree(t)) => Some((name.clone(), t.number(), NodeKind::Directory)),
                ChildSlot::Unloaded { number, kind, .. } => Some((name.clone(), *number, *kind)),
                ChildSlot::Loading(_) => None,
            })
            .collect()
    }

    /// `load_timestamp` is the timestamp stamped onto any child this call
    /// ends up loading from the manifest (the mount's checkout time) — it
    /// has no bearing on a child that's already loaded or that coalesces
    /// onto another caller's in-flight load.
    #[allow(clippy::too_many_arguments)]
    #[instrument(level = "debug", skip(self, store, importer, inode_map), fields(dir = self.number(), name = %name))]
    pub async fn lookup(
        self: &Arc<Self>,
        name: &PathComponent,
        store: &dyn ObjectStore,
        importer: &dyn Importer,
        inode_map: &InodeMap,
        default_uid: u32,
        default_gid: u32,
        load_timestamp: Timestamp,
    ) -> Result<Inode> {
        loop {
            let action = {
                let mut state = self.state.lock();
                match state.children.get(name) {
                    None => return Err(Error::NotFound(name.to_string())),
                    Some(ChildSlot::Loaded(inode)) => return Ok(inode.clone()),
                    Some(ChildSlot::Loading(notify)) => LookupAction::Wait(notify.clone()),
                    Some(ChildSlot::Unloaded { number, hash, kind, mode }) => {
                        let (number, hash, kind, mode) = (*number, *hash, *kind, *mode);
                        let notify = Arc::new(Notify::new());
                        state.children.insert(name.clone(), ChildSlot::Loading(notify.clone()));
                        LookupAction::Load { number, hash, kind, mode, notify }
                    }
                }
            };
            match action {
                LookupAction::Wait(notify) => {
                    tracing::trace!(%name, "coalescing onto an in-flight load");
                    notify.notified().await;
                    continue;
                }
                LookupAction::Load { number, hash, kind, mode, notify } => {
                    let parent_number = self.number();
                    let result = load_child(
                        number,
                        parent_number,
                        name.clone(),
                        hash,
                        kind,
                        mode,
                        store,
                        importer,
                        inode_map,
                        default_uid,
                        default_gid,
                        load_timestamp,
                    )
                    .await;
                    let mut state = self.state.lock();
                    return match result {
                        Ok(inode) => {
                            inode_map.register_loaded(number, inode.clone());
                            state.children.insert(name.clone(), ChildSlot::Loaded(inode.clone()));
                            notify.notify_waiters();
                            Ok(inode)
                        }
                        Err(err) => {
                            state.children.insert(name.clone(), ChildSlot::Unloaded { number, hash, kind, mode });
                            notify.notify_waiters();
                            Err(err)
                        }
                    };
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    #[instrument(level = "debug", skip(self, inode_map, clock), fields(dir = self.number(), name = %name))]
    pub fn create_file(
        self: &Arc<Self>,
        name: PathComponent,
        kind: FileKind,
        permission_bits: u32,
        umask: u32,
        inode_map: &InodeMap,
        clock: &dyn Clock,
    ) -> Result<Arc<FileInode>> {
        let mut state = self.state.lock();
        if state.children.contains_key(&name) {
            return Err(Error::AlreadyExists(name.to_string()));
        }
        let parent = state.header.number;
        let number = inode_map.number_for_child(parent, &name);
        let uid = state.header.metadata.uid;
        let gid = state.header.metadata.gid;
        let mode = permission_bits & !umask;
        let file = FileInode::new_materialized(number, parent, name.clone(), kind, mode, uid, gid, Vec::new(), clock);
        state.children.insert(name, ChildSlot::Loaded(Inode::File(file.clone())));
        state.header.touch_content(clock);
        drop(state);
        inode_map.register_loaded(number, Inode::File(file.clone()));
        Ok(file)
    }

    #[allow(clippy::too_many_arguments)]
    #[instrument(level = "debug", skip(self, inode_map, clock), fields(dir = self.number(), name = %name))]
    pub fn mkdir(
        self: &Arc<Self>,
        name: PathComponent,
        permission_bits: u32,
        umask: u32,
        inode_map: &InodeMap,
        clock: &dyn Clock,
    ) -> Result<Arc<TreeInode>> {
        let mut state = self.state.lock();
        if state.children.contains_key(&name) {
            return Err(Error::AlreadyExists(name.to_string()));
        }
        let parent = state.header.number;
        let number = inode_map.number_for_child(parent, &name);
        let uid = state.header.metadata.uid;
        let gid = state.header.metadata.gid;
        let mode = permission_bits & !umask;
        let child = TreeInode::new(number, parent, name.clone(), mode, uid, gid, None, clock.now());
        state.children.insert(name, ChildSlot::Loaded(Inode::Tree(child.clone())));
        state.header.touch_content(clock);
        drop(state);
        inode_map.register_loaded(number, Inode::Tree(child.clone()));
        Ok(child)
    }

    fn has_loaded_children(&self) -> bool {
        self.state.lock().children.values().any(|slot| matches!(slot, ChildSlot::Loaded(_)))
    }

    /// Collapses any loaded children that are themselves quiescent back to
    /// unloaded descriptors, recursing bottom-up so a directory only
    /// unloads once everything beneath it already has. A child with
    /// outstanding kernel references, an open file handle, or local
    /// modifications is left alone.
    pub fn unload_children_now(self: &Arc<Self>, inode_map: &InodeMap) {
        let names: Vec<PathComponent> = self.state.lock().children.keys().cloned().collect();
        for name in names {
            let loaded = match self.state.lock().children.get(&name) {
                Some(ChildSlot::Loaded(inode)) => Some(inode.clone()),
                _ => None,
            };
            let Some(inode) = loaded else { continue };
            if inode.fuse_refcount() > 0 {
                continue;
            }
            match &inode {
                Inode::File(f) => {
                    let Some((hash, mode)) = f.unload_descriptor() else { continue };
                    tracing::debug!(inode = f.number(), name = %name, "unloading quiescent file");
                    inode_map.demote_to_unloaded(f.number(), self.number(), name.clone());
                    let kind = if f.kind() == FileKind::Symlink { NodeKind::Symlink } else { NodeKind::Regular };
                    self.state.lock().children.insert(name, ChildSlot::Unloaded { number: f.number(), hash, kind, mode });
                }
                Inode::Tree(t) => {
                    t.unload_children_now(inode_map);
                    if t.has_loaded_children() {
                        continue;
                    }
                    let Some(hash) = t.source_hash() else { continue };
                    let mode = t.get_attr().mode;
                    tracing::debug!(inode = t.number(), name = %name, "unloading quiescent directory");
                    inode_map.demote_to_unloaded(t.number(), self.number(), name.clone());
                    self.state
                        .lock()
                        .children
                        .insert(name, ChildSlot::Unloaded { number: t.number(), hash, kind: NodeKind::Directory, mode });
                }
            }
        }
    }

    fn source_hash(&self) -> Option<Hash> {
        self.state.lock().source_hash
    }
}

#[allow(clippy::too_many_arguments)]
async fn load_child(
    number: InodeNumber,
    parent: InodeNumber,
    name: PathComponent,
    hash: Hash,
    kind: NodeKind,
    entry_mode: u32,
    store: &dyn ObjectStore,
    importer: &dyn Importer,
    inode_map: &InodeMap,
    default_uid: u32,
    default_gid: u32,
    load_timestamp: Timestamp,
) -> Result<Inode> {
    match kind {
        NodeKind::Directory => {
            let tree = store
                .get_tree(&hash)
                .await
                .ok_or_else(|| Error::NotFound(format!("tree {hash}")))?;
            // Re-derived every time this directory loads, so each child must
            // get back the number it was already known by rather than a
            // fresh one, or its identity would change across an
            // unload/reload cycle.
            let children: Vec<_> = tree
                .entries()
                .iter()
                .map(|e| (e.name.clone(), inode_map.number_for_child(number, &e.name), e.hash, e.kind, e.mode))
                .collect();
            let dir = TreeInode::new(number, parent, name, entry_mode, default_uid, default_gid, Some(hash), load_timestamp);
            dir.seed_unloaded(children);
            Ok(Inode::Tree(dir))
        }
        NodeKind::Regular | NodeKind::Executable => {
            let file = FileInode::new_backing(number, parent, name, FileKind::Regular, entry_mode, default_uid, default_gid, hash, load_timestamp);
            Ok(Inode::File(file))
        }
        NodeKind::Symlink => {
            let file = FileInode::new_backing(number, parent, name, FileKind::Symlink, entry_mode, default_uid, default_gid, hash, load_timestamp);
            Ok(Inode::File(file))
        }
    }
}
