//! The kernel filesystem transport external collaborator. Only
//! its init handshake and the one downcall the mount needs to emit
//! (`notify_invalidate_inode`) are modeled here; the upcall dispatch loop and
//! wire framing are out of scope and live in the embedder's FUSE binding.
use crate::inode::InodeNumber;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitRequest {
    pub major: u32,
    pub minor: u32,
    pub max_readahead: u32,
    pub flags: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitReply {
    pub major: u32,
    pub minor: u32,
    pub max_readahead: u32,
    pub flags: u32,
}

/// A fixed init response: the core doesn't negotiate capabilities, it simply
/// echoes back the protocol version the kernel proposed with no optional
/// flags enabled.
pub fn init_reply(request: InitRequest) -> InitReply {
    InitReply {
        major: request.major,
        minor: request.minor,
        max_readahead: request.max_readahead,
        flags: 0,
    }
}

/// The downcall the mount issues after mutating an inode's attributes out
/// from under a kernel reference (e.g. `chown` on a live inode).
pub trait KernelNotifier: Send + Sync {
    fn notify_invalidate_inode(&self, inode_number: InodeNumber, offset: i64, length: i64);
}

/// A notifier that records calls instead of talking to a kernel; used by
/// tests.
#[derive(Default)]
pub struct RecordingNotifier {
    calls: parking_lot::Mutex<Vec<InodeNumber>>,
}

impl KernelNotifier for RecordingNotifier {
    fn notify_invalidate_inode(&self, inode_number: InodeNumber, _offset: i64, _length: i64) {
        self.calls.lock().push(inode_number);
    }
}

impl RecordingNotifier {
    pub fn invalidated(&self) -> Vec<InodeNumber> {
        self.calls.lock().clone()
    }
}
