//! Context-switch trigger
//!
//! The kernel never swaps registers itself. It marks a switch as pending and
//! asks the port to honour it at a safe point; the port calls back into
//! [`Kernel::reschedule`] to learn which thread runs next.

use rtk_core::{KResult, ThreadId};

use crate::kernel::Kernel;

/// Architecture port.
///
/// One implementation per execution environment: a Cortex-M port that
/// switches with PendSV, a hosted port that backs every kernel thread with a
/// host thread, a mock for unit tests.
pub trait Arch: Sync + Sized + 'static {
    /// Per-thread saved execution context, stored in the TCB
    type Context: Send;

    /// Smallest stack a thread may be created with
    const MIN_STACK_SIZE: usize;

    /// Build the initial context of a new thread.
    ///
    /// When the thread is first dispatched it must call
    /// [`Kernel::run_thread`] with `pid`. Called with the scheduler locked:
    /// implementations must not call back into the kernel.
    fn prepare(
        &self,
        kernel: &'static Kernel<Self>,
        pid: ThreadId,
        stack: &'static mut [u8],
    ) -> KResult<Self::Context>;

    /// True while executing in interrupt context.
    fn in_interrupt(&self) -> bool;

    /// True if the caller already holds a critical section the kernel did
    /// not open, e.g. interrupts masked by the application. Blocking there
    /// can never be undone. Ports that cannot tell report `false`.
    fn in_critical_section(&self) -> bool {
        false
    }

    /// Arrange for a pending switch to be taken when the current interrupt
    /// returns. Called from interrupt context only.
    fn pend_switch(&self, kernel: &'static Kernel<Self>);

    /// Take a pending switch now. Called from thread context after the
    /// outermost critical section has been released; returns once the
    /// calling thread has been scheduled again.
    fn safe_point(&self, kernel: &'static Kernel<Self>);

    /// Begin multitasking. The scheduler is already marked started.
    fn start(&self, kernel: &'static Kernel<Self>);
}
