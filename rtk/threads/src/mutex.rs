//! Raw blocking mutex
//!
//! [`RawMutex`] is plain storage with a fixed C layout: four bytes, all zero
//! when unlocked. Every transition happens inside a critical section through
//! the [`Kernel`](crate::Kernel), which owns the thread table the wait list
//! threads through. The fields are atomics only so that a `static` mutex is
//! `Sync` without `unsafe`; they are never used for lock-free updates.

use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

use critical_section::CriticalSection;
use rtk_core::ThreadId;

const TAG_UNLOCKED: u8 = 0x00;
const TAG_LOCKED: u8 = 0xFF;

/// Observable state of a mutex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutexState {
    Unlocked,
    LockedNoWaiters,
    LockedWithWaiters,
}

impl MutexState {
    pub const fn is_locked(self) -> bool {
        !matches!(self, MutexState::Unlocked)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for MutexState {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            MutexState::Unlocked => defmt::write!(fmt, "Unlocked"),
            MutexState::LockedNoWaiters => defmt::write!(fmt, "LockedNoWaiters"),
            MutexState::LockedWithWaiters => defmt::write!(fmt, "LockedWithWaiters"),
        }
    }
}

/// Mutex storage shared with C.
///
/// Byte 0 is the lock tag, bytes 1 and 2 the head and tail of the wait list,
/// byte 3 the owner. Thread references are stored as `pid + 1` so that zero
/// means "none".
#[repr(C)]
pub struct RawMutex {
    tag: AtomicU8,
    head: AtomicU8,
    tail: AtomicU8,
    owner: AtomicU8,
}

impl RawMutex {
    /// An unlocked mutex.
    pub const fn new() -> Self {
        Self {
            tag: AtomicU8::new(TAG_UNLOCKED),
            head: AtomicU8::new(0),
            tail: AtomicU8::new(0),
            owner: AtomicU8::new(0),
        }
    }

    /// A mutex that starts locked, with no owner and no waiters.
    ///
    /// The first `lock` blocks until someone, typically an interrupt
    /// handler or another thread, calls `unlock`.
    pub const fn new_locked() -> Self {
        Self {
            tag: AtomicU8::new(TAG_LOCKED),
            head: AtomicU8::new(0),
            tail: AtomicU8::new(0),
            owner: AtomicU8::new(0),
        }
    }

    /// Current state, read under its own critical section.
    pub fn state(&self) -> MutexState {
        critical_section::with(|cs| self.state_in(cs))
    }

    /// Current state while a critical section is already held.
    pub fn state_in(&self, cs: CriticalSection<'_>) -> MutexState {
        if !self.is_locked(cs) {
            MutexState::Unlocked
        } else if self.head(cs).is_none() {
            MutexState::LockedNoWaiters
        } else {
            MutexState::LockedWithWaiters
        }
    }

    /// Thread the lock was last granted to, if known.
    pub fn owner_in(&self, cs: CriticalSection<'_>) -> Option<ThreadId> {
        Self::decode(self.owner.load(Ordering::Relaxed), cs)
    }

    pub(crate) fn is_locked(&self, _cs: CriticalSection<'_>) -> bool {
        self.tag.load(Ordering::Relaxed) != TAG_UNLOCKED
    }

    pub(crate) fn set_locked(&self, owner: Option<ThreadId>, _cs: CriticalSection<'_>) {
        self.tag.store(TAG_LOCKED, Ordering::Relaxed);
        self.owner.store(Self::encode(owner), Ordering::Relaxed);
    }

    pub(crate) fn set_unlocked(&self, _cs: CriticalSection<'_>) {
        self.tag.store(TAG_UNLOCKED, Ordering::Relaxed);
        self.owner.store(0, Ordering::Relaxed);
    }

    pub(crate) fn head(&self, cs: CriticalSection<'_>) -> Option<ThreadId> {
        Self::decode(self.head.load(Ordering::Relaxed), cs)
    }

    pub(crate) fn tail(&self, cs: CriticalSection<'_>) -> Option<ThreadId> {
        Self::decode(self.tail.load(Ordering::Relaxed), cs)
    }

    pub(crate) fn set_head(&self, pid: Option<ThreadId>, _cs: CriticalSection<'_>) {
        self.head.store(Self::encode(pid), Ordering::Relaxed);
    }

    pub(crate) fn set_tail(&self, pid: Option<ThreadId>, _cs: CriticalSection<'_>) {
        self.tail.store(Self::encode(pid), Ordering::Relaxed);
    }

    fn encode(pid: Option<ThreadId>) -> u8 {
        pid.map_or(0, |pid| pid.raw() + 1)
    }

    fn decode(raw: u8, _cs: CriticalSection<'_>) -> Option<ThreadId> {
        raw.checked_sub(1).and_then(ThreadId::new)
    }

    /// Raw bytes, in layout order
    pub fn to_bytes(&self) -> [u8; 4] {
        critical_section::with(|_| {
            [
                self.tag.load(Ordering::Relaxed),
                self.head.load(Ordering::Relaxed),
                self.tail.load(Ordering::Relaxed),
                self.owner.load(Ordering::Relaxed),
            ]
        })
    }
}

impl Default for RawMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RawMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        critical_section::with(|cs| {
            f.debug_struct("RawMutex")
                .field("state", &self.state_in(cs))
                .field("owner", &self.owner_in(cs))
                .field("head", &self.head(cs))
                .finish()
        })
    }
}

const _: () = assert!(core::mem::size_of::<RawMutex>() == 4);
const _: () = assert!(core::mem::align_of::<RawMutex>() == 1);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_initializers_match_layout() {
        assert_eq!(RawMutex::new().to_bytes(), [0, 0, 0, 0]);
        assert_eq!(RawMutex::new_locked().to_bytes(), [0xFF, 0, 0, 0]);
        assert_eq!(RawMutex::new().state(), MutexState::Unlocked);
        assert_eq!(RawMutex::new_locked().state(), MutexState::LockedNoWaiters);
    }

    #[test]
    fn pids_are_stored_off_by_one() {
        let m = RawMutex::new();
        let pid = ThreadId::new(0).unwrap();
        critical_section::with(|cs| {
            m.set_locked(Some(pid), cs);
            m.set_head(Some(pid), cs);
            assert_eq!(m.owner_in(cs), Some(pid));
            assert_eq!(m.state_in(cs), MutexState::LockedWithWaiters);
        });
        assert_eq!(m.to_bytes(), [0xFF, 1, 0, 1]);
    }
}
