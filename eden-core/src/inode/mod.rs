//! Inode base and metadata: the common header every inode variant carries,
//! and the tagged variant dispatch used throughout the mount.
mod file;
mod map;
mod tree;

pub use file::{FileHandle, FileInode, FileKind};
pub use map::{InodeMap, UnloadedDescriptor};
pub use tree::{ChildSlot, TreeInode};

use crate::clock::{Clock, Timestamp};
use crate::path::PathComponent;
use std::sync::Arc;

pub type InodeNumber = u64;
pub const ROOT_INODE_NUMBER: InodeNumber = 1;

pub mod mode {
    pub const S_IFDIR: u32 = 0o040000;
    pub const S_IFREG: u32 = 0o100000;
    pub const S_IFLNK: u32 = 0o120000;
    pub const S_IFMT: u32 = 0o170000;
    pub const PERM_MASK: u32 = 0o007777;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InodeMetadata {
    /// Includes the `S_IF*` kind bits as well as permission bits.
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: Timestamp,
    pub ctime: Timestamp,
    pub mtime: Timestamp,
}

impl InodeMetadata {
    pub fn new(mode: u32, uid: u32, gid: u32, now: Timestamp) -> Self {
        Self {
            mode,
            uid,
            gid,
            atime: now,
            ctime: now,
            mtime: now,
        }
    }

    pub fn permission_bits(&self) -> u32 {
        self.mode & mode::PERM_MASK
    }

    pub fn set_permission_bits(&mut self, perm: u32) {
        self.mode = (self.mode & mode::S_IFMT) | (perm & mode::PERM_MASK);
    }
}

/// A requested attribute change, mirroring a kernel `setattr` upcall's
/// `valid` bitmask as a set of `Option` fields instead. Only the fields
/// that are `Some` are applied; `ctime` is always bumped regardless of
/// which fields were requested.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetAttrRequest {
    /// Permission bits only; the inode's kind (`S_IFMT` bits) can never be
    /// changed by `set_attr`.
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub size: Option<u64>,
    pub atime: Option<Timestamp>,
    pub mtime: Option<Timestamp>,
}

/// The header shared by every inode variant.
#[derive(Debug, Clone)]
pub struct InodeHeader {
    pub number: InodeNumber,
    pub generation: u64,
    /// `0` if unlinked, or if this is the root.
    pub parent: InodeNumber,
    /// Empty for the root.
    pub name: Option<PathComponent>,
    pub metadata: InodeMetadata,
    /// Outstanding kernel references (incremented on `lookup` replies,
    /// decremented on `forget`).
    pub fuse_refcount: u64,
}

impl InodeHeader {
    pub fn new(
        number: InodeNumber,
        parent: InodeNumber,
        name: Option<PathComponent>,
        metadata: InodeMetadata,
    ) -> Self {
        Self {
            number,
            generation: 0,
            parent,
            name,
            metadata,
            fuse_refcount: 0,
        }
    }

    pub fn touch_atime(&mut self, clock: &dyn Clock) {
        self.metadata.atime = clock.now();
    }

    /// `ctime` and `mtime` both move on a content change.
    pub fn touch_content(&mut self, clock: &dyn Clock) {
        let now = clock.now();
        self.metadata.ctime = now;
        self.metadata.mtime = now;
    }

    /// Only `ctime` moves on a metadata-only change (e.g. `chown`).
    pub fn touch_metadata(&mut self, clock: &dyn Clock) {
        self.metadata.ctime = clock.now();
    }
}

/// The sum type over the three inode kinds, sharing the common header.
/// Generic operations (`get_attr`, `set_attr`, unload) dispatch on this tag;
/// kind-specific operations that don't apply to the wrong kind return
/// [crate::errors::Error::InvalidArgument].
#[derive(Clone)]
pub enum Inode {
    File(Arc<FileInode>),
    Tree(Arc<TreeInode>),
}

impl Inode {
    pub fn number(&self) -> InodeNumber {
        match self {
            Inode::File(f) => f.number(),
            Inode::Tree(t) => t.number(),
        }
    }

    pub fn get_attr(&self) -> InodeMetadata {
        match self {
            Inode::File(f) => f.get_attr(),
            Inode::Tree(t) => t.get_attr(),
        }
    }

    pub fn as_file(&self) -> Option<&Arc<FileInode>> {
        match self {
            Inode::File(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_tree(&self) -> Option<&Arc<TreeInode>> {
        match self {
            Inode::Tree(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self, Inode::File(f) if f.kind() == FileKind::Symlink)
    }

    pub fn increment_fuse_refcount(&self) {
        match self {
            Inode::File(f) => f.increment_fuse_refcount(),
            Inode::Tree(t) => t.increment_fuse_refcount(),
        }
    }

    /// Returns the new refcount.
    pub fn decrement_fuse_refcount(&self, delta: u64) -> u64 {
        match self {
            Inode::File(f) => f.decrement_fuse_refcount(delta),
            Inode::Tree(t) => t.decrement_fuse_refcount(delta),
        }
    }

    pub fn fuse_refcount(&self) -> u64 {
        match self {
            Inode::File(f) => f.fuse_refcount(),
            Inode::Tree(t) => t.fuse_refcount(),
        }
    }

    pub fn parent_number(&self) -> InodeNumber {
        match self {
            Inode::File(f) => f.parent_number(),
            Inode::Tree(t) => t.parent_number(),
        }
    }

    pub fn name_in_parent(&self) -> Option<PathComponent> {
        match self {
            Inode::File(f) => f.name_in_parent(),
            Inode::Tree(t) => t.name_in_parent(),
        }
    }

    /// Applies a new `(uid, gid)` to this inode, bumping `ctime`.
    pub fn chown(&self, uid: u32, gid: u32, clock: &dyn Clock) {
        match self {
            Inode::File(f) => f.chown(uid, gid, clock),
            Inode::Tree(t) => t.chown(uid, gid, clock),
        }
    }
}
