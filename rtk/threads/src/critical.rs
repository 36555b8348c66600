//! Critical-section guard
//!
//! All kernel state is mutated while a [`CriticalSectionGuard`] is alive. The
//! guard is a thin RAII wrapper over the `critical-section` crate: interrupts
//! (or, on hosted builds, the process-wide lock) are released on every exit
//! path, including early returns through `?` and unwinding panics.
//!
//! Guards nest. Each guard remembers the depth at which it was taken so the
//! kernel can tell whether releasing it returns the CPU to plain thread
//! context, which is the only place a context switch may be taken.

use core::sync::atomic::{AtomicU8, Ordering};

use critical_section::{CriticalSection, RestoreState};

/// Nesting depth of the current execution context.
///
/// Only read or written while the critical section is held, so plain
/// load/store pairs are enough even on cores without atomic RMW.
static DEPTH: AtomicU8 = AtomicU8::new(0);

/// RAII guard for a kernel critical section
pub struct CriticalSectionGuard {
    restore: RestoreState,
    depth: u8,
}

impl CriticalSectionGuard {
    /// Enter a critical section.
    pub fn new() -> Self {
        // SAFETY: paired with the `release` in `Drop`, which runs exactly once
        // and in reverse nesting order because guards cannot be cloned.
        let restore = unsafe { critical_section::acquire() };
        let depth = DEPTH.load(Ordering::Relaxed).wrapping_add(1);
        assert!(depth != 0, "critical section nesting overflow");
        DEPTH.store(depth, Ordering::Relaxed);
        Self { restore, depth }
    }

    /// Token proving the critical section is held, valid for the guard's
    /// lifetime.
    pub fn token(&self) -> CriticalSection<'_> {
        // SAFETY: the critical section stays acquired until `self` is dropped,
        // and the returned token cannot outlive `self`.
        unsafe { CriticalSection::new() }
    }

    /// True if dropping this guard leaves every critical section.
    pub fn is_outermost(&self) -> bool {
        self.depth == 1
    }

    /// Nesting depth at which this guard was taken (1 = outermost)
    pub fn depth(&self) -> u8 {
        self.depth
    }
}

impl Default for CriticalSectionGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CriticalSectionGuard {
    fn drop(&mut self) {
        debug_assert_eq!(
            DEPTH.load(Ordering::Relaxed),
            self.depth,
            "critical sections released out of order"
        );
        DEPTH.store(self.depth - 1, Ordering::Relaxed);
        // SAFETY: `restore` came from the matching `acquire` in `new`.
        unsafe { critical_section::release(self.restore) };
    }
}

/// Run `f` inside a critical section.
#[inline]
pub fn with<R>(f: impl FnOnce(CriticalSection<'_>) -> R) -> R {
    let guard = CriticalSectionGuard::new();
    f(guard.token())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_nest_and_unwind() {
        let outer = CriticalSectionGuard::new();
        assert!(outer.is_outermost());
        {
            let inner = CriticalSectionGuard::new();
            assert!(!inner.is_outermost());
            assert_eq!(inner.depth(), outer.depth() + 1);
        }
        drop(outer);

        let again = CriticalSectionGuard::new();
        assert!(again.is_outermost());
    }

    #[test]
    fn with_releases_on_return() {
        let value = with(|_cs| 41) + 1;
        assert_eq!(value, 42);
        assert!(CriticalSectionGuard::new().is_outermost());
    }
}
