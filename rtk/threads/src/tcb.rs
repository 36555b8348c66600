//! Thread control blocks

use core::ffi::c_void;
use core::fmt;

#[cfg(feature = "alloc")]
use alloc::boxed::Box;

use rtk_core::{CreateFlags, Priority, ThreadId};

/// Byte written over a stack created with [`CreateFlags::STACKTEST`].
pub const STACK_PAINT: u8 = 0xA5;

/// Lifecycle state of a thread.
///
/// A free TCB slot has no state at all; it is `None` in the thread table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadState {
    /// Slot claimed, not yet handed to the scheduler
    New,
    /// Queued in the run queue
    Ready,
    /// Owns the CPU
    Running,
    /// Waiting in exactly one mutex wait list
    Blocked,
    /// Suspended until an explicit wakeup
    Sleeping,
    /// Finished, slot kept until reaped
    Zombie,
}

impl ThreadState {
    /// True for states in which the thread may still run again.
    pub const fn is_alive(self) -> bool {
        !matches!(self, ThreadState::Zombie)
    }

    /// Short lowercase name, as printed by status listings
    pub const fn as_str(self) -> &'static str {
        match self {
            ThreadState::New => "new",
            ThreadState::Ready => "pending",
            ThreadState::Running => "running",
            ThreadState::Blocked => "bl mutex",
            ThreadState::Sleeping => "sleeping",
            ThreadState::Zombie => "zombie",
        }
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ThreadState {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{=str}", self.as_str());
    }
}

/// What a thread runs when it is first scheduled.
pub enum ThreadEntry {
    /// Plain function with a word-sized argument
    Fn { func: fn(usize), arg: usize },
    /// C entry point; its return value is discarded
    Extern {
        func: unsafe extern "C" fn(*mut c_void) -> *mut c_void,
        arg: usize,
    },
    /// Boxed closure
    #[cfg(feature = "alloc")]
    Boxed(Box<dyn FnOnce() + Send + 'static>),
}

impl ThreadEntry {
    /// Entry calling `func(arg)`.
    pub const fn new(func: fn(usize), arg: usize) -> Self {
        ThreadEntry::Fn { func, arg }
    }

    /// Entry calling a C function with an opaque argument.
    ///
    /// # Safety
    ///
    /// `func` must be sound to call with `arg` from the new thread, at any
    /// later point in time.
    pub unsafe fn from_extern(
        func: unsafe extern "C" fn(*mut c_void) -> *mut c_void,
        arg: *mut c_void,
    ) -> Self {
        ThreadEntry::Extern {
            func,
            arg: arg as usize,
        }
    }

    /// Entry running a closure.
    #[cfg(feature = "alloc")]
    pub fn boxed(f: impl FnOnce() + Send + 'static) -> Self {
        ThreadEntry::Boxed(Box::new(f))
    }

    pub(crate) fn invoke(self) {
        match self {
            ThreadEntry::Fn { func, arg } => func(arg),
            ThreadEntry::Extern { func, arg } => {
                // SAFETY: guaranteed by the caller of `from_extern`.
                let _ = unsafe { func(arg as *mut c_void) };
            }
            #[cfg(feature = "alloc")]
            ThreadEntry::Boxed(f) => f(),
        }
    }
}

impl fmt::Debug for ThreadEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadEntry::Fn { arg, .. } => f.debug_struct("Fn").field("arg", arg).finish(),
            ThreadEntry::Extern { arg, .. } => f.debug_struct("Extern").field("arg", arg).finish(),
            #[cfg(feature = "alloc")]
            ThreadEntry::Boxed(_) => f.write_str("Boxed"),
        }
    }
}

/// Location of a caller-supplied stack buffer.
///
/// The buffer is `'static` and never freed, but once the thread runs the
/// port owns its contents; the kernel keeps only the address range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackInfo {
    base: usize,
    len: usize,
}

impl StackInfo {
    pub(crate) fn of(stack: &[u8]) -> Self {
        Self {
            base: stack.as_ptr() as usize,
            len: stack.len(),
        }
    }

    /// Lowest address of the buffer
    pub const fn base(&self) -> usize {
        self.base
    }

    /// Size in bytes
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True for a zero-length buffer.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes at the low end that still hold [`STACK_PAINT`].
    ///
    /// Stacks grow down, so this is the headroom the thread never touched.
    pub(crate) fn unused(&self) -> usize {
        let mut unused = 0;
        while unused < self.len {
            // SAFETY: the range came from a `&'static mut [u8]` that is never
            // freed; the byte is only read, and a concurrent write by the
            // owning thread can at worst end the count early.
            let byte = unsafe { core::ptr::read_volatile((self.base + unused) as *const u8) };
            if byte != STACK_PAINT {
                break;
            }
            unused += 1;
        }
        unused
    }
}

/// Fill a stack with [`STACK_PAINT`].
pub(crate) fn paint(stack: &mut [u8]) {
    stack.fill(STACK_PAINT);
}

/// Thread control block
pub struct Thread<C> {
    pub(crate) pid: ThreadId,
    pub(crate) priority: Priority,
    pub(crate) state: ThreadState,
    pub(crate) flags: CreateFlags,
    pub(crate) stack: StackInfo,
    pub(crate) entry: Option<ThreadEntry>,
    pub(crate) context: C,
    /// Next thread in the mutex wait list this thread is blocked on
    pub(crate) wait_next: Option<ThreadId>,
}

impl<C> Thread<C> {
    pub(crate) fn new(
        pid: ThreadId,
        priority: Priority,
        flags: CreateFlags,
        stack: StackInfo,
        entry: ThreadEntry,
        context: C,
    ) -> Self {
        Self {
            pid,
            priority,
            state: ThreadState::New,
            flags,
            stack,
            entry: Some(entry),
            context,
            wait_next: None,
        }
    }

    pub fn pid(&self) -> ThreadId {
        self.pid
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn state(&self) -> ThreadState {
        self.state
    }

    pub fn flags(&self) -> CreateFlags {
        self.flags
    }

    pub fn stack(&self) -> StackInfo {
        self.stack
    }

    /// Architecture context saved for this thread
    pub fn context(&self) -> &C {
        &self.context
    }
}

impl<C> fmt::Debug for Thread<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("pid", &self.pid)
            .field("priority", &self.priority)
            .field("state", &self.state)
            .field("flags", &self.flags)
            .field("stack", &self.stack)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn painted_stack_is_fully_unused() {
        static mut STACK: [u8; 64] = [0; 64];
        // SAFETY: only this test touches STACK.
        let stack = unsafe { &mut *core::ptr::addr_of_mut!(STACK) };
        paint(stack);
        stack[48..].fill(0);

        let info = StackInfo::of(stack);
        assert_eq!(info.len(), 64);
        assert_eq!(info.unused(), 48);
    }

    #[test]
    fn entry_invokes_function() {
        use core::sync::atomic::{AtomicUsize, Ordering};
        static SEEN: AtomicUsize = AtomicUsize::new(0);

        fn record(arg: usize) {
            SEEN.store(arg, Ordering::SeqCst);
        }

        ThreadEntry::new(record, 7).invoke();
        assert_eq!(SEEN.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn zombie_is_not_alive() {
        assert!(!ThreadState::Zombie.is_alive());
        assert!(ThreadState::Blocked.is_alive());
        assert_eq!(ThreadState::Ready.to_string(), "pending");
    }
}
