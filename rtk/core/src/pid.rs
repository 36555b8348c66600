//! Kernel thread identifiers and the numeric PID space seen by C callers

use core::fmt;

use crate::THREADS_NUMOF;

/// Signed PID as exchanged with C code; negative values carry errors.
pub type KernelPid = i16;

/// First allocatable PID
pub const KERNEL_PID_FIRST: KernelPid = 0;

/// One past the last allocatable PID
pub const KERNEL_PID_LAST: KernelPid = THREADS_NUMOF as KernelPid;

/// "No thread"; never handed out by allocation
pub const KERNEL_PID_UNDEF: KernelPid = KERNEL_PID_LAST;

/// Pseudo-PID reported while running in interrupt context
pub const KERNEL_PID_ISR: KernelPid = KERNEL_PID_UNDEF;

/// printf conversion for rendering a [`KernelPid`]
pub const PRI_KERNEL_PID: &str = "d";

/// Index of a thread control block.
///
/// A `ThreadId` always names a slot in `0..THREADS_NUMOF`; absence is spelled
/// `Option<ThreadId>` and only becomes [`KERNEL_PID_UNDEF`] at the C border.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(u8);

impl ThreadId {
    /// Creates an identifier, rejecting values outside the PID space.
    pub const fn new(raw: u8) -> Option<Self> {
        if (raw as usize) < THREADS_NUMOF {
            Some(Self(raw))
        } else {
            None
        }
    }

    /// Creates an identifier without range checking.
    pub const fn new_unchecked(raw: u8) -> Self {
        Self(raw)
    }

    /// Raw slot number
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Slot number as an array index
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Converts a C-side PID, mapping the sentinel and errors to `None`.
    pub fn from_pid(pid: KernelPid) -> Option<Self> {
        u8::try_from(pid).ok().and_then(Self::new)
    }

    /// Converts to a C-side PID, `None` becoming [`KERNEL_PID_UNDEF`].
    pub fn to_pid(id: Option<Self>) -> KernelPid {
        match id {
            Some(id) => KernelPid::from(id.0),
            None => KERNEL_PID_UNDEF,
        }
    }

    /// Iterates over every identifier of the PID space.
    pub fn all() -> impl Iterator<Item = ThreadId> {
        (0..THREADS_NUMOF as u8).map(ThreadId)
    }
}

impl From<ThreadId> for usize {
    fn from(id: ThreadId) -> Self {
        id.index()
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ThreadId {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{}", self.0);
    }
}
