#![no_std]
#![forbid(unsafe_code)]

//! # rtk core
//!
//! Identifiers, compile-time limits and the error type shared by every crate
//! of the rtk kernel. Nothing in here touches scheduler state; the types are
//! plain values that can cross the C binding unchanged.

pub mod flags;
pub mod pid;
pub mod priority;

pub use flags::CreateFlags;
pub use pid::*;
pub use priority::Priority;

/// Kernel version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Number of thread control blocks, and therefore of live threads.
pub const THREADS_NUMOF: usize = 16;

/// Number of distinct scheduling priorities.
pub const SCHED_PRIO_LEVELS: usize = 12;

// The run queue keeps one bit per level in a `u32`, the PID allocator one
// bit per slot; both must also fit the `u8` identifiers.
const _: () = assert!(SCHED_PRIO_LEVELS > 0 && SCHED_PRIO_LEVELS <= 32);
const _: () = assert!(THREADS_NUMOF > 0 && THREADS_NUMOF <= 32);

/// Result type used throughout the kernel
pub type KResult<T> = Result<T, KernelError>;

/// Errors reported by kernel operations.
///
/// Every failure is returned synchronously; the kernel never retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    /// All thread control blocks are in use
    #[error("thread table full ({slots} slots)", slots = THREADS_NUMOF)]
    TableFull,
    /// Priority outside `0..SCHED_PRIO_LEVELS`
    #[error("invalid priority {0}, levels are 0..{levels}", levels = SCHED_PRIO_LEVELS)]
    InvalidPriority(u8),
    /// Caller-supplied stack cannot hold the initial frame
    #[error("stack of {size} bytes is below the minimum of {min}")]
    StackTooSmall { size: usize, min: usize },
    /// No live thread with this identifier
    #[error("no thread with pid {0}")]
    InvalidPid(ThreadId),
    /// Thread exists but is not a zombie
    #[error("thread {0} is not a zombie")]
    NotZombie(ThreadId),
    /// Unlock by a thread other than the owner (owner tracking only)
    #[error("mutex is owned by another thread")]
    NotOwner,
    /// Unlock of a mutex that is not locked (owner tracking only)
    #[error("mutex is not locked")]
    NotLocked,
    /// The port could not set up an execution context for a new thread
    #[error("failed to prepare thread context")]
    Context,
}

#[cfg(feature = "defmt")]
impl defmt::Format for KernelError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            KernelError::TableFull => defmt::write!(fmt, "TableFull"),
            KernelError::InvalidPriority(prio) => defmt::write!(fmt, "InvalidPriority({})", prio),
            KernelError::StackTooSmall { size, min } => {
                defmt::write!(fmt, "StackTooSmall({} < {})", size, min)
            }
            KernelError::InvalidPid(pid) => defmt::write!(fmt, "InvalidPid({})", pid),
            KernelError::NotZombie(pid) => defmt::write!(fmt, "NotZombie({})", pid),
            KernelError::NotOwner => defmt::write!(fmt, "NotOwner"),
            KernelError::NotLocked => defmt::write!(fmt, "NotLocked"),
            KernelError::Context => defmt::write!(fmt, "Context"),
        }
    }
}
