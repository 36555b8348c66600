//! The kernel instance behind the C functions

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, Ordering};

use critical_section::Mutex;
use log::{debug, warn};
use rtk_core::{CreateFlags, KResult, Priority, ThreadId};
use rtk_threads::{Arch, Kernel, RawMutex, ThreadEntry, ThreadState};

/// Kernel operations reachable from C, independent of the port type.
///
/// Implemented for every [`Kernel`]; the binding only ever sees it as a
/// trait object.
pub trait Binding: Sync {
    fn create(
        &'static self,
        stack: &'static mut [u8],
        priority: Priority,
        flags: CreateFlags,
        entry: ThreadEntry,
    ) -> KResult<ThreadId>;
    fn lock(&'static self, mutex: &RawMutex);
    fn try_lock(&self, mutex: &RawMutex) -> bool;
    fn unlock(&'static self, mutex: &RawMutex) -> KResult<()>;
    fn unlock_and_sleep(&'static self, mutex: &RawMutex) -> KResult<()>;
    fn yield_now(&'static self);
    fn yield_higher(&'static self);
    fn sleep(&'static self);
    fn wakeup(&'static self, pid: ThreadId) -> bool;
    fn zombify(&'static self) -> !;
    fn kill_zombie(&'static self, pid: ThreadId) -> KResult<()>;
    fn caller_pid(&self) -> Option<ThreadId>;
    fn state(&self, pid: ThreadId) -> Option<ThreadState>;
    fn switch_pending(&self) -> bool;
}

impl<A: Arch> Binding for Kernel<A> {
    fn create(
        &'static self,
        stack: &'static mut [u8],
        priority: Priority,
        flags: CreateFlags,
        entry: ThreadEntry,
    ) -> KResult<ThreadId> {
        Kernel::create(self, stack, priority, flags, entry)
    }

    fn lock(&'static self, mutex: &RawMutex) {
        Kernel::lock(self, mutex)
    }

    fn try_lock(&self, mutex: &RawMutex) -> bool {
        Kernel::try_lock(self, mutex)
    }

    fn unlock(&'static self, mutex: &RawMutex) -> KResult<()> {
        Kernel::unlock(self, mutex)
    }

    fn unlock_and_sleep(&'static self, mutex: &RawMutex) -> KResult<()> {
        Kernel::unlock_and_sleep(self, mutex)
    }

    fn yield_now(&'static self) {
        Kernel::yield_now(self)
    }

    fn yield_higher(&'static self) {
        Kernel::yield_higher(self)
    }

    fn sleep(&'static self) {
        Kernel::sleep(self)
    }

    fn wakeup(&'static self, pid: ThreadId) -> bool {
        Kernel::wakeup(self, pid)
    }

    fn zombify(&'static self) -> ! {
        Kernel::zombify(self)
    }

    fn kill_zombie(&'static self, pid: ThreadId) -> KResult<()> {
        Kernel::kill_zombie(self, pid)
    }

    fn caller_pid(&self) -> Option<ThreadId> {
        Kernel::caller_pid(self)
    }

    fn state(&self, pid: ThreadId) -> Option<ThreadState> {
        Kernel::state(self, pid)
    }

    fn switch_pending(&self) -> bool {
        Kernel::switch_pending(self)
    }
}

static KERNEL: Mutex<Cell<Option<&'static dyn Binding>>> = Mutex::new(Cell::new(None));

/// Mirror of the scheduler's pending-switch flag, refreshed whenever a
/// binding call returns.
#[no_mangle]
pub static sched_context_switch_request: AtomicBool = AtomicBool::new(false);

/// Register the kernel the C functions operate on.
///
/// Replaces any kernel installed before.
pub fn install(kernel: &'static dyn Binding) {
    let previous = critical_section::with(|cs| KERNEL.borrow(cs).replace(Some(kernel)));
    if previous.is_some() {
        warn!("rtk-c: replacing the installed kernel");
    } else {
        debug!("rtk-c: kernel installed");
    }
    sync_switch_request(kernel);
}

pub fn is_installed() -> bool {
    critical_section::with(|cs| KERNEL.borrow(cs).get().is_some())
}

/// The installed kernel.
///
/// # Panics
///
/// If [`install`] was never called.
pub(crate) fn kernel() -> &'static dyn Binding {
    match critical_section::with(|cs| KERNEL.borrow(cs).get()) {
        Some(kernel) => kernel,
        None => panic!("rtk-c: kernel used before install"),
    }
}

pub(crate) fn sync_switch_request(kernel: &dyn Binding) {
    sched_context_switch_request.store(kernel.switch_pending(), Ordering::Relaxed);
}
