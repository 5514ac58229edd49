//! `Mount`: ties the inode tree to its external collaborators (object
//! store, importer, blob cache, journal, config store, clock, kernel
//! notifier) and exposes the path- and number-based entry points an
//! embedder's FUSE glue calls into.
use crate::cache::BlobCache;
use crate::clock::{Clock, Timestamp};
use crate::config::{ConfigStore, MountConfig};
use crate::errors::{Error, Result};
use crate::hash::Hash;
use crate::importer::Importer;
use crate::inode::{FileKind, Inode, InodeMap, InodeNumber, SetAttrRequest, TreeInode, ROOT_INODE_NUMBER};
use crate::journal::{Journal, JournalEntry};
use crate::kernel::KernelNotifier;
use crate::path::{AbsolutePath, PathComponent};
use crate::store::ObjectStore;
use crate::symlink;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::instrument;

/// Bundles the collaborators path resolution needs so they don't have to be
/// threaded through every function individually.
pub struct ResolveContext<'a> {
    pub store: &'a dyn ObjectStore,
    pub importer: &'a dyn Importer,
    pub cache: &'a Arc<BlobCache>,
    pub inode_map: &'a InodeMap,
    pub default_uid: u32,
    pub default_gid: u32,
    pub clock: &'a dyn Clock,
    /// Stamped onto any inode a lookup along the way ends up loading from
    /// the manifest.
    pub checkout_time: Timestamp,
}

pub struct Mount {
    root: Arc<TreeInode>,
    inode_map: Arc<InodeMap>,
    store: Arc<dyn ObjectStore>,
    importer: Arc<dyn Importer>,
    cache: Arc<BlobCache>,
    journal: Arc<dyn Journal>,
    config_store: Arc<dyn ConfigStore>,
    clock: Arc<dyn Clock>,
    kernel: Arc<dyn KernelNotifier>,
    config: MountConfig,
    /// Owner assigned to newly created or newly loaded files. Starts from
    /// `config.default_{uid,gid}` but is mutable: `chown` updates it so
    /// later loads and creations pick up the new owner without every call
    /// site needing to re-read a shared config object.
    defaults: Mutex<(u32, u32)>,
    parents: Mutex<Vec<Hash>>,
    last_checkout: Mutex<Timestamp>,
}

impl Mount {
    /// Imports `commit_hash_text`'s manifest and builds the root directory
    /// from it. The root's own children start unloaded, same as any other
    /// directory's.
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(config, store, importer, cache, journal, config_store, clock, kernel), fields(commit = commit_hash_text))]
    pub async fn initialize(
        commit_hash_text: &str,
        config: MountConfig,
        store: Arc<dyn ObjectStore>,
        importer: Arc<dyn Importer>,
        cache: Arc<BlobCache>,
        journal: Arc<dyn Journal>,
        config_store: Arc<dyn ConfigStore>,
        clock: Arc<dyn Clock>,
        kernel: Arc<dyn KernelNotifier>,
    ) -> Result<Arc<Self>> {
        let root_commit = importer.import_manifest(commit_hash_text).await.map_err(|e| match e {
            // An unresolvable revision is a statement about the repository,
            // not a transport failure, so it maps to `Domain` rather than
            // `ImporterFailure`.
            crate::importer::ImportError::UnknownRevision(text) => Error::Domain(text.parse().unwrap_or(Hash::zero())),
            crate::importer::ImportError::NotInStore(hash) => Error::Domain(hash),
        })?;
        let root_tree = store.get_tree(&root_commit).await.ok_or(Error::Domain(root_commit))?;

        let now = clock.now();
        let root = TreeInode::new_root(config.default_uid, config.default_gid, 0o755, now);
        let inode_map = InodeMap::new(Inode::Tree(root.clone()));
        let children: Vec<_> = root_tree
            .entries()
            .iter()
            .map(|e| (e.name.clone(), inode_map.number_for_child(ROOT_INODE_NUMBER, &e.name), e.hash, e.kind, e.mode))
            .collect();
        root.seed_unloaded(children);

        config_store.persist_parent(root_commit);
        journal.append(JournalEntry {
            from_commit: root_commit,
            to_commit: root_commit,
            file_changes: Vec::new(),
        });
        tracing::debug!(%root_commit, "mount initialized");

        let defaults = Mutex::new((config.default_uid, config.default_gid));
        Ok(Arc::new(Self {
            root,
            inode_map,
            store,
            importer,
            cache,
            journal,
            config_store,
            clock: clock.clone(),
            kernel,
            config,
            defaults,
            parents: Mutex::new(vec![root_commit]),
            last_checkout: Mutex::new(now),
        }))
    }

    fn resolve_context(&self) -> ResolveContext<'_> {
        let (default_uid, default_gid) = *self.defaults.lock();
        ResolveContext {
            store: self.store.as_ref(),
            importer: self.importer.as_ref(),
            cache: &self.cache,
            inode_map: &self.inode_map,
            default_uid,
            default_gid,
            clock: self.clock.as_ref(),
            checkout_time: self.last_checkout_time(),
        }
    }

    pub fn root(&self) -> &Arc<TreeInode> {
        &self.root
    }

    pub fn inode_map(&self) -> &Arc<InodeMap> {
        &self.inode_map
    }

    /// Resolves a path from the root, following every symlink encountered
    /// (including a symlink as the final component).
    #[instrument(skip(self), fields(path = %path))]
    pub async fn get_inode(&self, path: &AbsolutePath) -> Result<Inode> {
        symlink::resolve_path(&self.root, path, true, &self.resolve_context()).await
    }

    /// Same as [Mount::get_inode], but a symlink as the final component is
    /// returned unresolved (`lstat` semantics).
    #[instrument(skip(self), fields(path = %path))]
    pub async fn get_inode_no_follow(&self, path: &AbsolutePath) -> Result<Inode> {
        symlink::resolve_path(&self.root, path, false, &self.resolve_context()).await
    }

    /// Looks up an inode purely by number, reconstructing any unloaded
    /// ancestors along the way. The inode returned is identical (same
    /// number, same content) to whatever was unloaded — unloading is
    /// purely a cache eviction and never changes identity.
    #[instrument(skip(self))]
    pub async fn get_inode_by_number(&self, number: InodeNumber) -> Result<Inode> {
        if number == ROOT_INODE_NUMBER {
            return Ok(Inode::Tree(self.root.clone()));
        }
        if let Some(inode) = self.inode_map.get_loaded(number) {
            return Ok(inode);
        }
        let descriptor = self
            .inode_map
            .get_unloaded(number)
            .ok_or_else(|| Error::NotFound(format!("inode {number}")))?;
        let parent = Box::pin(self.get_inode_by_number(descriptor.parent)).await?;
        let Inode::Tree(parent_tree) = parent else {
            return Err(Error::NotADirectory(format!("inode {}", descriptor.parent)));
        };
        let (default_uid, default_gid) = *self.defaults.lock();
        parent_tree
            .lookup(
                &descriptor.name,
                self.store.as_ref(),
                self.importer.as_ref(),
                &self.inode_map,
                default_uid,
                default_gid,
                self.last_checkout_time(),
            )
            .await
    }

    /// Recursively creates every directory component of `path` that doesn't
    /// already exist, following symlinks along the way. Idempotent: an
    /// already-existing directory tree is left untouched. Concurrent calls
    /// over overlapping paths converge: each directory is created by
    /// whichever caller's `mkdir` reaches it first, and every subsequent
    /// `AlreadyExists` is simply read back via `lookup`.
    #[instrument(skip(self), fields(path = %path))]
    pub async fn ensure_directory_exists(&self, path: &AbsolutePath) -> Result<Arc<TreeInode>> {
        let (default_uid, default_gid) = *self.defaults.lock();
        let checkout_time = self.last_checkout_time();
        let mut dir_stack = vec![self.root.clone()];
        for component in path.components() {
            let current = dir_stack.last().unwrap().clone();
            let existing = current
                .lookup(
                    component,
                    self.store.as_ref(),
                    self.importer.as_ref(),
                    &self.inode_map,
                    default_uid,
                    default_gid,
                    checkout_time,
                )
                .await;
            let next = match existing {
                Ok(Inode::Tree(t)) => t,
                Ok(Inode::File(f)) if f.kind() == FileKind::Symlink => {
                    let resolved = symlink::resolve_symlink(Inode::File(f), dir_stack.clone(), &self.resolve_context()).await?;
                    match resolved {
                        Inode::Tree(t) => t,
                        Inode::File(_) => return Err(Error::NotADirectory(component.to_string())),
                    }
                }
                Ok(Inode::File(_)) => return Err(Error::NotADirectory(component.to_string())),
                Err(Error::NotFound(_)) => match current.mkdir(component.clone(), 0o755, self.config.umask, &self.inode_map, self.clock.as_ref()) {
                    Ok(dir) => dir,
                    // Lost the race to create this component: another caller's
                    // `mkdir` won between our `lookup` miss and our own
                    // `mkdir`. Read back what they created.
                    Err(Error::AlreadyExists(_)) => match current
                        .lookup(component, self.store.as_ref(), self.importer.as_ref(), &self.inode_map, default_uid, default_gid, checkout_time)
                        .await?
                    {
                        Inode::Tree(t) => t,
                        Inode::File(_) => return Err(Error::NotADirectory(component.to_string())),
                    },
                    Err(other) => return Err(other),
                },
                Err(other) => return Err(other),
            };
            dir_stack.push(next);
        }
        Ok(dir_stack.pop().unwrap())
    }

    /// Sets the mount's default owner for newly created and newly loaded
    /// files, then recursively applies the new `(uid, gid)` to every
    /// currently loaded inode. Inodes the kernel still holds a live
    /// reference to (positive FUSE refcount) get an invalidate notification
    /// so their cached `stat` is refreshed; quiescent loaded inodes are
    /// updated silently. Unloaded inodes need no action at all: by the time
    /// an inode is unloaded its FUSE refcount is necessarily zero (see
    /// `TreeInode::unload_children_now`), so the next load picks up the
    /// mount defaults set above.
    #[instrument(skip(self))]
    pub fn chown(&self, uid: u32, gid: u32) {
        *self.defaults.lock() = (uid, gid);
        for (number, inode) in self.inode_map.all_loaded() {
            inode.chown(uid, gid, self.clock.as_ref());
            if inode.fuse_refcount() > 0 {
                tracing::debug!(inode = number, "invalidating live inode after chown");
                self.kernel.notify_invalidate_inode(number, 0, 0);
            }
        }
    }

    /// Applies an attribute change to the inode at `path` (a kernel
    /// `setattr` upcall). Unlike [Mount::chown], this only ever touches one
    /// inode and never changes the mount's defaults for future loads.
    #[instrument(skip(self, attr), fields(path = %path))]
    pub async fn set_attr(&self, path: &AbsolutePath, attr: SetAttrRequest) -> Result<crate::inode::InodeMetadata> {
        let inode = self.get_inode_no_follow(path).await?;
        match inode {
            Inode::File(f) => f.set_attr(attr, &self.cache, self.store.as_ref(), self.importer.as_ref(), self.clock.as_ref()).await,
            Inode::Tree(t) => Ok(t.set_attr(attr, self.clock.as_ref())),
        }
    }

    /// Periodic (or quiescence-triggered) sweep that collapses resident but
    /// unreferenced parts of the tree back to unloaded descriptors.
    pub fn unload_quiescent_inodes(&self) {
        self.root.unload_children_now(&self.inode_map);
    }

    pub fn current_parents(&self) -> Vec<Hash> {
        self.parents.lock().clone()
    }

    /// Records a new parent commit: persists it to the config store,
    /// appends a journal entry, and updates the in-memory pointer. Does not
    /// itself touch the loaded inode tree — replaying the working copy
    /// against the new parent's manifest is the embedder's checkout logic,
    /// not this crate's concern.
    pub fn reset_parent(&self, new_parent: Hash, file_changes: Vec<String>) {
        let mut parents = self.parents.lock();
        let from = parents.first().copied().unwrap_or(new_parent);
        *parents = vec![new_parent];
        drop(parents);
        self.config_store.persist_parent(new_parent);
        self.journal.append(JournalEntry {
            from_commit: from,
            to_commit: new_parent,
            file_changes,
        });
        *self.last_checkout.lock() = self.clock.now();
    }

    pub fn get_latest_journal_entry(&self) -> Option<JournalEntry> {
        self.journal.get_latest()
    }

    pub fn last_checkout_time(&self) -> Timestamp {
        *self.last_checkout.lock()
    }
}
