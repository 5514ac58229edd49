//! The journal external collaborator: an append-only log of
//! observable state transitions, consulted by external tooling.
use crate::hash::Hash;
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub from_commit: Hash,
    pub to_commit: Hash,
    pub file_changes: Vec<String>,
}

pub trait Journal: Send + Sync {
    fn append(&self, entry: JournalEntry);
    fn get_latest(&self) -> Option<JournalEntry>;
}

/// An in-memory [Journal], keeping the full history (tests only need the
/// latest entry, but keeping history makes the fixture useful for debugging
/// a failing scenario).
#[derive(Default)]
pub struct MemoryJournal {
    entries: Mutex<Vec<JournalEntry>>,
}

impl Journal for MemoryJournal {
    fn append(&self, entry: JournalEntry) {
        self.entries.lock().push(entry);
    }

    fn get_latest(&self) -> Option<JournalEntry> {
        self.entries.lock().last().cloned()
    }
}
