//! Hosted rtk port
//!
//! Runs the kernel inside an ordinary process. Every kernel thread is backed
//! by a host thread, but only the thread the scheduler marked running is
//! allowed to execute: all others wait on their own [`Baton`]. A context
//! switch releases the next thread's baton and parks the current one on its
//! own, so the kernel observes exactly the single-CPU behaviour it would on
//! hardware.
//!
//! Any host thread that is not a kernel thread (a test's main thread, for
//! instance) plays the role of interrupt context. It may unlock mutexes,
//! wake threads and create threads, and [`Hosted::run_until_idle`] is its
//! "return from interrupt": it dispatches ready work and waits until the
//! kernel has nothing left to run.
//!
//! Preemption happens at kernel calls. A thread spinning without calling
//! into the kernel is not interrupted by a host thread that readies a more
//! urgent one; the switch is taken at that thread's next safe point.
//!
//! The port supplies the process's `critical-section` implementation (see
//! [`critical`]); do not also enable `critical-section/std`.

mod baton;
pub mod critical;

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use critical_section::CriticalSection;
use log::{error, trace};
use rtk_core::{KResult, KernelError, ThreadId};
use rtk_threads::{Arch, Kernel, ThreadState};

pub use baton::Baton;

/// Kernel type driven by this port
pub type HostedKernel = Kernel<Hosted>;

thread_local! {
    static CURRENT: Cell<Option<ThreadId>> = const { Cell::new(None) };
}

/// Kernel thread backing the calling host thread, `None` for interrupt
/// context.
pub fn current_thread() -> Option<ThreadId> {
    CURRENT.with(Cell::get)
}

/// Leak a zeroed buffer for use as a thread stack.
pub fn leak_stack(len: usize) -> &'static mut [u8] {
    Box::leak(vec![0u8; len].into_boxed_slice())
}

/// Who gets the CPU after a hand-off
enum Wake {
    Nobody,
    Idle,
    Thread(Arc<Baton>),
}

/// What the outgoing host thread does after handing the CPU on
enum Outgoing {
    Wait(Arc<Baton>),
    Park,
    Exit,
}

/// Hosted architecture port
#[derive(Debug, Default)]
pub struct Hosted {
    idle: Baton,
    poisoned: AtomicBool,
}

impl Hosted {
    pub const fn new() -> Self {
        Self {
            idle: Baton::new(),
            poisoned: AtomicBool::new(false),
        }
    }

    /// Dispatch ready threads and block until every kernel thread is
    /// blocked, sleeping or gone.
    ///
    /// # Panics
    ///
    /// If called from a kernel thread or before the kernel was started, or if
    /// a kernel thread panicked.
    pub fn run_until_idle(&self, kernel: &'static HostedKernel) {
        assert!(
            self.in_interrupt(),
            "run_until_idle called from a kernel thread"
        );
        assert!(kernel.is_started(), "run_until_idle before kernel start");

        self.dispatch_if_idle(kernel);
        loop {
            self.check_poisoned();
            if kernel.is_idle() {
                break;
            }
            self.idle.wait();
        }
        self.check_poisoned();
        if let Some(hook) = kernel.config().idle_hook {
            hook();
        }
    }

    fn check_poisoned(&self) {
        if self.poisoned.load(Ordering::SeqCst) {
            panic!("a kernel thread panicked");
        }
    }

    fn baton_of(kernel: &'static HostedKernel, cs: CriticalSection<'_>, pid: ThreadId) -> Option<Arc<Baton>> {
        kernel.with_context(cs, pid, |baton| Arc::clone(baton))
    }

    /// Interrupt-return path: if the CPU idles and work is pending, hand the
    /// CPU to the most urgent ready thread.
    fn dispatch_if_idle(&self, kernel: &'static HostedKernel) {
        let next = critical_section::with(|cs| {
            {
                let sched = kernel.scheduler(cs);
                if sched.current().is_some() || !sched.is_pending() {
                    return None;
                }
            }
            let switch = kernel.reschedule(cs);
            switch.next.and_then(|pid| Self::baton_of(kernel, cs, pid))
        });
        if let Some(baton) = next {
            baton.release();
        }
    }

    fn enter(&self, kernel: &'static HostedKernel, pid: ThreadId, start: Arc<Baton>) {
        CURRENT.with(|current| current.set(Some(pid)));
        start.wait();
        trace!("host thread of pid {pid} dispatched");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| kernel.run_thread(pid)));
        if outcome.is_err() {
            error!("kernel thread {pid} panicked");
            self.poisoned.store(true, Ordering::SeqCst);
            self.idle.release();
        }
    }
}

impl Arch for Hosted {
    type Context = Arc<Baton>;

    const MIN_STACK_SIZE: usize = 64;

    fn prepare(
        &self,
        kernel: &'static Kernel<Self>,
        pid: ThreadId,
        _stack: &'static mut [u8],
    ) -> KResult<Arc<Baton>> {
        let baton = Arc::new(Baton::new());
        let start = Arc::clone(&baton);
        thread::Builder::new()
            .name(format!("rtk-{pid}"))
            .spawn(move || kernel.arch().enter(kernel, pid, start))
            .map_err(|err| {
                error!("failed to spawn host thread for pid {pid}: {err}");
                KernelError::Context
            })?;
        Ok(baton)
    }

    fn in_interrupt(&self) -> bool {
        current_thread().is_none()
    }

    fn in_critical_section(&self) -> bool {
        critical::held() > 0
    }

    fn pend_switch(&self, kernel: &'static Kernel<Self>) {
        self.dispatch_if_idle(kernel);
    }

    fn safe_point(&self, kernel: &'static Kernel<Self>) {
        let Some(me) = current_thread() else {
            self.dispatch_if_idle(kernel);
            return;
        };

        let handoff = critical_section::with(|cs| {
            let (current, pending) = {
                let sched = kernel.scheduler(cs);
                (sched.current(), sched.is_pending())
            };
            if current == Some(me) && !pending {
                return None;
            }

            // Only the thread leaving the CPU may pick its successor. If an
            // interrupt already dispatched someone else after this thread
            // exited, there is nothing left to hand over.
            let wake = if pending && current.map_or(true, |pid| pid == me) {
                let switch = kernel.reschedule(cs);
                if switch.next == Some(me) {
                    return None;
                }
                match switch.next {
                    Some(pid) => Self::baton_of(kernel, cs, pid).map_or(Wake::Nobody, Wake::Thread),
                    None => Wake::Idle,
                }
            } else {
                Wake::Nobody
            };

            let state = kernel.scheduler(cs).state(me);
            let outgoing = match state {
                None => Outgoing::Exit,
                Some(ThreadState::Zombie) => Outgoing::Park,
                Some(_) => match Self::baton_of(kernel, cs, me) {
                    Some(baton) => Outgoing::Wait(baton),
                    None => Outgoing::Exit,
                },
            };
            Some((wake, outgoing))
        });

        let Some((wake, outgoing)) = handoff else {
            return;
        };
        match wake {
            Wake::Thread(baton) => baton.release(),
            Wake::Idle => self.idle.release(),
            Wake::Nobody => {}
        }
        match outgoing {
            Outgoing::Wait(baton) => baton.wait(),
            Outgoing::Park => {
                trace!("pid {me} parked as zombie");
                loop {
                    thread::park();
                }
            }
            Outgoing::Exit => trace!("host thread of pid {me} exits"),
        }
    }

    fn start(&self, kernel: &'static Kernel<Self>) {
        self.dispatch_if_idle(kernel);
    }
}

/// Leak a fresh kernel for this port.
pub fn leak_kernel(config: rtk_threads::KernelConfig) -> &'static HostedKernel {
    Box::leak(Box::new(Kernel::with_config(Hosted::new(), config)))
}
