//! `InodeMap`: the mount-wide registry of loaded and unloaded inode
//! numbers. Allocation is monotonic and numbers are never reused, so an
//! inode number always identifies the same logical file for the lifetime
//! of the mount, loaded or not.
use super::{Inode, InodeNumber, ROOT_INODE_NUMBER};
use crate::path::PathComponent;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Where an unloaded inode number would be found again: its parent
/// directory's number and the name it's known by there.
#[derive(Clone)]
pub struct UnloadedDescriptor {
    pub parent: InodeNumber,
    pub name: PathComponent,
}

struct MapState {
    next_number: InodeNumber,
    loaded: HashMap<InodeNumber, Inode>,
    unloaded: HashMap<InodeNumber, UnloadedDescriptor>,
    /// Numbers handed out for a directory's children, keyed by
    /// `(parent, name)` rather than by number: a directory's child set is
    /// re-derived from its manifest entry every time it loads, and without
    /// this table that re-derivation would hand out a fresh number each
    /// time instead of the one a child was already known by.
    child_numbers: HashMap<(InodeNumber, PathComponent), InodeNumber>,
}

pub struct InodeMap {
    state: Mutex<MapState>,
}

impl InodeMap {
    pub fn new(root: Inode) -> Arc<Self> {
        let mut loaded = HashMap::new();
        loaded.insert(ROOT_INODE_NUMBER, root);
        Arc::new(Self {
            state: Mutex::new(MapState {
                next_number: ROOT_INODE_NUMBER + 1,
                loaded,
                unloaded: HashMap::new(),
                child_numbers: HashMap::new(),
            }),
        })
    }

    pub fn allocate_number(&self) -> InodeNumber {
        let mut state = self.state.lock();
        let number = state.next_number;
        state.next_number += 1;
        number
    }

    /// Returns the inode number previously assigned to `parent`'s child
    /// named `name`, allocating and recording one on first use. Calling
    /// this again for the same `(parent, name)` — whether the child is
    /// still loaded, has been unloaded, or the parent directory itself was
    /// unloaded and is being re-derived from its manifest entry — always
    /// hands back the same number.
    pub fn number_for_child(&self, parent: InodeNumber, name: &PathComponent) -> InodeNumber {
        let mut state = self.state.lock();
        if let Some(number) = state.child_numbers.get(&(parent, name.clone())) {
            return *number;
        }
        let number = state.next_number;
        state.next_number += 1;
        state.child_numbers.insert((parent, name.clone()), number);
        number
    }

    pub fn register_loaded(&self, number: InodeNumber, inode: Inode) {
        let mut state = self.state.lock();
        state.unloaded.remove(&number);
        state.loaded.insert(number, inode);
    }

    pub fn demote_to_unloaded(&self, number: InodeNumber, parent: InodeNumber, name: PathComponent) {
        let mut state = self.state.lock();
        state.loaded.remove(&number);
        state.unloaded.insert(number, UnloadedDescriptor { parent, name });
    }

    pub fn get_loaded(&self, number: InodeNumber) -> Option<Inode> {
        self.state.lock().loaded.get(&number).cloned()
    }

    pub fn get_unloaded(&self, number: InodeNumber) -> Option<UnloadedDescriptor> {
        self.state.lock().unloaded.get(&number).cloned()
    }

    /// Snapshot of every currently loaded inode. Used by mount-wide
    /// operations (`chown`) that must visit every live inode regardless of
    /// where it sits in the tree; unloaded inodes need no visit since they
    /// carry no header to update and the next load picks up current mount
    /// defaults.
    pub fn all_loaded(&self) -> Vec<(InodeNumber, Inode)> {
        self.state
            .lock()
            .loaded
            .iter()
            .map(|(number, inode)| (*number, inode.clone()))
            .collect()
    }

    pub fn loaded_count(&self) -> usize {
        self.state.lock().loaded.len()
    }

    pub fn unloaded_count(&self) -> usize {
        self.state.lock().unloaded.len()
    }
}
