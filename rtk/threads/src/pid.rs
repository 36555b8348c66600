//! Kernel PID allocator

use rtk_core::{KResult, KernelError, ThreadId, THREADS_NUMOF};

/// Occupancy bitmap over the PID space, one bit per TCB slot.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PidAllocator {
    used: u32,
}

impl PidAllocator {
    const FULL: u32 = if THREADS_NUMOF == 32 {
        u32::MAX
    } else {
        (1u32 << THREADS_NUMOF) - 1
    };

    /// Allocator with every PID free
    pub const fn new() -> Self {
        Self { used: 0 }
    }

    /// Claim the lowest free PID.
    pub fn allocate(&mut self) -> KResult<ThreadId> {
        if self.used == Self::FULL {
            return Err(KernelError::TableFull);
        }
        let slot = self.used.trailing_ones() as u8;
        self.used |= 1u32 << slot;
        Ok(ThreadId::new_unchecked(slot))
    }

    /// Release `pid` for reuse.
    ///
    /// The caller guarantees the TCB is already unlinked from every queue.
    pub fn free(&mut self, pid: ThreadId) {
        debug_assert!(self.is_used(pid), "double free of pid {pid}");
        self.used &= !(1u32 << pid.raw());
    }

    /// True if `pid` is currently allocated.
    pub fn is_used(&self, pid: ThreadId) -> bool {
        (self.used & (1u32 << pid.raw())) != 0
    }

    /// Number of allocated PIDs
    pub fn count(&self) -> usize {
        self.used.count_ones() as usize
    }
}
