//! `FileInode`: a regular file or a symlink backed by either an
//! object-store blob or locally materialized bytes.
use super::{mode, InodeHeader, InodeMetadata, SetAttrRequest};
use crate::cache::{BlobCache, Interest};
use crate::clock::{Clock, Timestamp};
use crate::errors::{Error, Result};
use crate::hash::Hash;
use crate::importer::Importer;
use crate::inode::InodeNumber;
use crate::path::PathComponent;
use crate::store::ObjectStore;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Regular,
    Symlink,
}

#[derive(Clone)]
enum ContentState {
    /// Unmodified since it was loaded from the object store.
    Backing { hash: Hash },
    /// Diverged from the store, or created locally and never backed by one.
    Materialized { data: Vec<u8> },
}

struct FileInodeState {
    header: InodeHeader,
    content: ContentState,
    open_refcount: u64,
    /// The blob cache's interest handle for `content`'s hash, held only
    /// while at least one [FileHandle] is open on a `Backing` file.
    cache_handle: Option<crate::cache::BlobHandle>,
}

pub struct FileInode {
    kind: FileKind,
    state: Mutex<FileInodeState>,
}

fn slice_range(data: &Bytes, offset: u64, size: u64) -> Bytes {
    let len = data.len() as u64;
    let start = offset.min(len) as usize;
    let end = start.saturating_add(size.min(len)) as usize;
    let end = end.min(data.len());
    data.slice(start..end)
}

impl FileInode {
    /// `timestamp` is the mount's checkout time: a file materialized from
    /// the backing manifest reports `atime == ctime == mtime` as of the
    /// checkout that produced it, not the moment this lazy load happened to
    /// run.
    #[allow(clippy::too_many_arguments)]
    pub fn new_backing(
        number: InodeNumber,
        parent: InodeNumber,
        name: PathComponent,
        kind: FileKind,
        permission_bits: u32,
        uid: u32,
        gid: u32,
        hash: Hash,
        timestamp: Timestamp,
    ) -> Arc<Self> {
        let ifmt = match kind {
            FileKind::Regular => mode::S_IFREG,
            FileKind::Symlink => mode::S_IFLNK,
        };
        let metadata = InodeMetadata::new(ifmt | (permission_bits & mode::PERM_MASK), uid, gid, timestamp);
        Arc::new(Self {
            kind,
            state: Mutex::new(FileInodeState {
                header: InodeHeader::new(number, parent, Some(name), metadata),
                content: ContentState::Backing { hash },
                open_refcount: 0,
                cache_handle: None,
            }),
        })
    }

    pub fn new_materialized(
        number: InodeNumber,
        parent: InodeNumber,
        name: PathComponent,
        kind: FileKind,
        permission_bits: u32,
        uid: u32,
        gid: u32,
        data: Vec<u8>,
        clock: &dyn Clock,
    ) -> Arc<Self> {
        let ifmt = match kind {
            FileKind::Regular => mode::S_IFREG,
            FileKind::Symlink => mode::S_IFLNK,
        };
        let metadata = InodeMetadata::new(ifmt | (permission_bits & mode::PERM_MASK), uid, gid, clock.now());
        Arc::new(Self {
            kind,
            state: Mutex::new(FileInodeState {
                header: InodeHeader::new(number, parent, Some(name), metadata),
                content: ContentState::Materialized { data },
                open_refcount: 0,
                cache_handle: None,
            }),
        })
    }

    pub fn number(&self) -> InodeNumber {
        self.state.lock().header.number
    }

    pub fn kind(&self) -> FileKind {
        self.kind
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

    pub fn set_permission_bits(&self, permission_bits: u32, clock: &dyn Clock) {
        let mut state = self.state.lock();
        state.header.metadata.set_permission_bits(permission_bits);
        state.header.touch_metadata(clock);
    }

    pub fn chown(&self, uid: u32, gid: u32, clock: &dyn Clock) {
        let mut state = self.state.lock();
        state.header.metadata.uid = uid;
        state.header.metadata.gid = gid;
        state.header.touch_metadata(clock);
    }

    /// Applies a subset of `{mode, uid, gid, size, atime, mtime}`. `ctime`
    /// always moves; `mode` only ever touches permission bits, never the
    /// inode's kind. A `size` change goes through [FileInode::truncate],
    /// which may need to fetch the current backing content first.
    #[instrument(skip(self, cache, store, importer, clock), fields(inode = self.number()))]
    pub async fn set_attr(
        self: &Arc<Self>,
        attr: SetAttrRequest,
        cache: &Arc<BlobCache>,
        store: &dyn ObjectStore,
        importer: &dyn Importer,
        clock: &dyn Clock,
    ) -> Result<InodeMetadata> {
        if let Some(size) = attr.size {
            self.truncate(size, cache, store, importer, clock).await?;
        }
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
        Ok(state.header.metadata)
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

    pub fn open_refcount(&self) -> u64 {
        self.state.lock().open_refcount
    }

    /// Opens a new file handle, bumping the open refcount for the lifetime
    /// of the returned guard. Grounded in `EdenFileHandle.h`'s RAII handle
    /// wrapper; simpler here since Rust ownership already rules out the
    /// partial-construction hazard that type exists to guard against in C++.
    pub fn open(self: &Arc<Self>) -> FileHandle {
        self.state.lock().open_refcount += 1;
        FileHandle {
            inode: Arc::clone(self),
        }
    }

    fn close_one(&self) {
        let mut state = self.state.lock();
        state.open_refcount = state.open_refcount.saturating_sub(1);
        if state.open_refcount == 0 {
            // No reader is relying on this content staying resident; let the
            // cache reclaim it under its own policy.
            state.cache_handle = None;
        }
    }

    /// `Some(hash)` only if this file is unmodified since it was loaded and
    /// has no open handle — the conditions under which the inode map may
    /// demote it back to an unloaded descriptor.
    pub fn unload_descriptor(&self) -> Option<(Hash, u32)> {
        let state = self.state.lock();
        if state.open_refcount > 0 {
            return None;
        }
        match state.content {
            ContentState::Backing { hash } => Some((hash, state.header.metadata.mode)),
            ContentState::Materialized { .. } => None,
        }
    }

    /// Loads this file's backing content: cache, then the object store's
    /// own copy, then (on a full miss) the importer — whose result is
    /// written back into the object store so the next load skips it.
    #[instrument(level = "debug", skip(self, cache, store, importer))]
    async fn load_backing(&self, hash: &Hash, cache: &Arc<BlobCache>, store: &dyn ObjectStore, importer: &dyn Importer) -> Result<Bytes> {
        let (maybe, handle) = cache.get(hash, Interest::WantHandle);
        if let Some(blob) = maybe {
            tracing::trace!(%hash, "blob cache hit");
            self.state.lock().cache_handle = Some(handle);
            return Ok(blob.data().clone());
        }
        if let Some(blob) = store.get_blob(hash).await {
            let data = blob.data().clone();
            let handle = cache.insert(blob, Interest::WantHandle);
            self.state.lock().cache_handle = Some(handle);
            return Ok(data);
        }
        tracing::debug!(%hash, "blob not in object store, falling back to importer");
        let fetched = importer
            .import_file_contents(hash)
            .await
            .map_err(|e| {
                tracing::warn!(%hash, error = %e, "importer failed to produce blob contents");
                Error::ImporterFailure(e.to_string())
            })?;
        let data = fetched.data().clone();
        store.put_blob(fetched.clone()).await;
        let handle = cache.insert(fetched, Interest::WantHandle);
        self.state.lock().cache_handle = Some(handle);
        Ok(data)
    }

    #[instrument(level = "debug", skip(self, cache, store, importer, clock), fields(inode = self.number()))]
    pub async fn read(
        self: &Arc<Self>,
        offset: u64,
        size: u64,
        cache: &Arc<BlobCache>,
        store: &dyn ObjectStore,
        importer: &dyn Importer,
        clock: &dyn Clock,
    ) -> Result<Bytes> {
        let content = self.state.lock().content.clone();
        let bytes = match content {
            ContentState::Materialized { data } => Bytes::from(data),
            ContentState::Backing { hash } => self.load_backing(&hash, cache, store, importer).await?,
        };
        self.state.lock().header.touch_atime(clock);
        Ok(slice_range(&bytes, offset, size))
    }

    pub async fn read_link(
        self: &Arc<Self>,
        cache: &Arc<BlobCache>,
        store: &dyn ObjectStore,
        importer: &dyn Importer,
        clock: &dyn Clock,
    ) -> Result<Bytes> {
        if self.kind != FileKind::Symlink {
            return Err(Error::InvalidArgument("readlink on a non-symlink".to_string()));
        }
        self.read(0, u64::MAX, cache, store, importer, clock).await
    }

    async fn current_bytes(&self, cache: &Arc<BlobCache>, store: &dyn ObjectStore, importer: &dyn Importer) -> Result<Vec<u8>> {
        let content = self.state.lock().content.clone();
        match content {
            ContentState::Materialized { data } => Ok(data),
            ContentState::Backing { hash } => Ok(self.load_backing(&hash, cache, store, importer).await?.to_vec()),
        }
    }

    #[instrument(level = "debug", skip(self, data, cache, store, importer, clock), fields(inode = self.number(), len = data.len()))]
    pub async fn write(
        self: &Arc<Self>,
        offset: u64,
        data: &[u8],
        cache: &Arc<BlobCache>,
        store: &dyn ObjectStore,
        importer: &dyn Importer,
        clock: &dyn Clock,
    ) -> Result<usize> {
        let mut buf = self.current_bytes(cache, store, importer).await?;
        let end = offset as usize + data.len();
        if buf.len() < end {
            buf.resize(end, 0);
        }
        buf[offset as usize..end].copy_from_slice(data);
        let mut state = self.state.lock();
        state.content = ContentState::Materialized { data: buf };
        state.cache_handle = None;
        state.header.touch_content(clock);
        Ok(data.len())
    }

    #[instrument(level = "debug", skip(self, cache, store, importer, clock), fields(inode = self.number()))]
    pub async fn truncate(
        self: &Arc<Self>,
        len: u64,
        cache: &Arc<BlobCache>,
        store: &dyn ObjectStore,
        importer: &dyn Importer,
        clock: &dyn Clock,
    ) -> Result<()> {
        let mut buf = self.current_bytes(cache, store, importer).await?;
        buf.resize(len as usize, 0);
        let mut state = self.state.lock();
        state.content = ContentState::Materialized { data: buf };
        state.cache_handle = None;
        state.header.touch_content(clock);
        Ok(())
    }
}

/// An open reference to a [FileInode]. Dropping it releases the open
/// refcount; when it reaches zero the inode releases its blob cache
/// interest, making the content eligible for eviction again.
pub struct FileHandle {
    inode: Arc<FileInode>,
}

impl FileHandle {
    pub fn inode(&self) -> &Arc<FileInode> {
        &self.inode
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        self.inode.close_one();
    }
}
