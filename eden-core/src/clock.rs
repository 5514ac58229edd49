//! The clock collaborator. The core never reads the system
//! clock directly — every timestamp comes from whatever [Clock] the host
//! supplies, so tests can substitute a [FakeClock] and advance it explicitly.
use parking_lot::Mutex;
use std::sync::Arc;

/// A POSIX timespec: seconds and nanoseconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Timestamp {
    pub sec: i64,
    pub nsec: u32,
}

impl Timestamp {
    pub const fn new(sec: i64, nsec: u32) -> Self {
        Self { sec, nsec }
    }

    pub fn checked_add_seconds(&self, seconds: i64) -> Timestamp {
        Timestamp {
            sec: self.sec + seconds,
            nsec: self.nsec,
        }
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

#[derive(Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp::new(now.as_secs() as i64, now.subsec_nanos())
    }
}

/// A clock that only moves when told to. Used by tests that need to assert
/// exact timestamps.
#[derive(Clone)]
pub struct FakeClock(Arc<Mutex<Timestamp>>);

impl FakeClock {
    pub fn new(initial: Timestamp) -> Self {
        Self(Arc::new(Mutex::new(initial)))
    }

    pub fn set(&self, t: Timestamp) {
        *self.0.lock() = t;
    }

    pub fn advance_seconds(&self, seconds: i64) {
        let mut guard = self.0.lock();
        *guard = guard.checked_add_seconds(seconds);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Timestamp {
        *self.0.lock()
    }
}
