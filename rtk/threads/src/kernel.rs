//! The kernel object
//!
//! [`Kernel`] ties the scheduler state to one architecture port. Every
//! operation follows the same shape: mutate the scheduler inside a critical
//! section, release it, then let the port take the pending switch if the
//! CPU is back in plain thread context.

use core::cell::{Ref, RefCell};

use critical_section::{CriticalSection, Mutex};
use log::{debug, trace, warn};
use rtk_core::{CreateFlags, KResult, KernelError, Priority, ThreadId, THREADS_NUMOF};

use crate::config::KernelConfig;
use crate::critical::CriticalSectionGuard;
use crate::mutex::RawMutex;
use crate::scheduler::{Release, Scheduler, Switch};
use crate::switch::Arch;
use crate::tcb::{self, StackInfo, Thread, ThreadEntry, ThreadState};

/// Preemptive priority kernel bound to an architecture port
pub struct Kernel<A: Arch> {
    arch: A,
    config: KernelConfig,
    sched: Mutex<RefCell<Scheduler<A::Context>>>,
}

impl<A: Arch> Kernel<A> {
    /// Kernel with the default configuration.
    pub const fn new(arch: A) -> Self {
        Self::with_config(arch, KernelConfig::DEFAULT)
    }

    /// Kernel with an explicit configuration.
    pub const fn with_config(arch: A, config: KernelConfig) -> Self {
        Self {
            arch,
            config,
            sched: Mutex::new(RefCell::new(Scheduler::new())),
        }
    }

    pub fn arch(&self) -> &A {
        &self.arch
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    fn with_sched<R>(
        &self,
        f: impl FnOnce(&mut Scheduler<A::Context>, CriticalSection<'_>) -> R,
    ) -> (R, bool) {
        let guard = CriticalSectionGuard::new();
        let cs = guard.token();
        let result = {
            let mut sched = self.sched.borrow_ref_mut(cs);
            f(&mut sched, cs)
        };
        (result, guard.is_outermost())
    }

    /// Honour a pending switch once the outermost critical section is gone.
    fn leave(&'static self, outermost: bool) {
        if !outermost {
            return;
        }
        if self.arch.in_interrupt() {
            if self.switch_pending() {
                self.arch.pend_switch(self);
            }
        } else {
            self.arch.safe_point(self);
        }
    }

    /// The thread a call from the current context acts on behalf of.
    fn caller(&self, sched: &Scheduler<A::Context>) -> Option<ThreadId> {
        if self.arch.in_interrupt() {
            None
        } else {
            sched.current()
        }
    }

    // ---- threads -------------------------------------------------------

    /// Create a thread running `entry` on `stack` at `priority`.
    ///
    /// The thread becomes ready immediately unless
    /// [`CreateFlags::SLEEPING`] is given. If it outranks the caller it
    /// runs before this returns, unless [`CreateFlags::WITHOUT_YIELD`] defers
    /// the switch to the caller's next kernel call.
    pub fn create(
        &'static self,
        stack: &'static mut [u8],
        priority: Priority,
        flags: CreateFlags,
        entry: ThreadEntry,
    ) -> KResult<ThreadId> {
        if stack.len() < A::MIN_STACK_SIZE {
            return Err(KernelError::StackTooSmall {
                size: stack.len(),
                min: A::MIN_STACK_SIZE,
            });
        }
        if flags.contains(CreateFlags::STACKTEST) {
            tcb::paint(stack);
        }
        let info = StackInfo::of(stack);

        let (result, outermost) = self.with_sched(|sched, _cs| {
            let pid = sched.allocate()?;
            let context = match self.arch.prepare(self, pid, stack) {
                Ok(context) => context,
                Err(err) => {
                    sched.release_unused(pid);
                    return Err(err);
                }
            };
            sched.insert(Thread::new(pid, priority, flags, info, entry, context));
            if flags.contains(CreateFlags::SLEEPING) {
                if let Some(thread) = sched.thread_mut(pid) {
                    thread.state = ThreadState::Sleeping;
                }
            } else {
                sched.enqueue_ready(pid);
            }
            Ok(pid)
        });

        let pid = result.inspect_err(|err| warn!("{}: create failed: {err}", self.config.name))?;
        debug!(
            "{}: created pid {pid} at {priority} ({:?}, {} byte stack)",
            self.config.name,
            flags,
            info.len()
        );
        if !flags.contains(CreateFlags::WITHOUT_YIELD) || self.arch.in_interrupt() {
            self.leave(outermost);
        }
        Ok(pid)
    }

    /// Body of every thread: run its entry, then exit.
    ///
    /// Ports call this on the new thread's own context the first time it is
    /// dispatched.
    pub fn run_thread(&'static self, pid: ThreadId) {
        let (entry, _) =
            self.with_sched(|sched, _cs| sched.thread_mut(pid).and_then(|thread| thread.entry.take()));
        match entry {
            Some(entry) => {
                trace!("{}: pid {pid} entering {entry:?}", self.config.name);
                entry.invoke();
            }
            None => warn!("{}: pid {pid} dispatched without an entry", self.config.name),
        }
        self.exit(pid);
    }

    /// Tear down a thread whose entry returned and hand the CPU on.
    fn exit(&'static self, pid: ThreadId) {
        let (thread, _) = self.with_sched(|sched, _cs| sched.exit(pid));
        // Dropped outside the critical section: the context may own port
        // resources.
        drop(thread);
        self.arch.safe_point(self);
    }

    /// Turn the calling thread into a zombie. Its TCB and PID stay
    /// allocated until [`kill_zombie`](Self::kill_zombie).
    pub fn zombify(&'static self) -> ! {
        assert!(
            !self.arch.in_interrupt(),
            "zombify called from interrupt context"
        );
        let (pid, _) = self.with_sched(|sched, _cs| sched.zombify_current());
        if pid.is_none() {
            panic!("zombify called outside of a thread");
        }
        loop {
            self.arch.safe_point(self);
        }
    }

    /// Reap a zombie, freeing its TCB and PID.
    pub fn kill_zombie(&'static self, pid: ThreadId) -> KResult<()> {
        let (result, _) = self.with_sched(|sched, _cs| sched.kill_zombie(pid));
        let thread = result?;
        debug!("{}: reaped pid {pid}", self.config.name);
        drop(thread);
        Ok(())
    }

    /// Give up the CPU to the next thread of the same priority.
    pub fn yield_now(&'static self) {
        let (_, outermost) = self.with_sched(|sched, _cs| sched.yield_current());
        self.leave(outermost);
    }

    /// Let a more urgent ready thread run now.
    pub fn yield_higher(&'static self) {
        let (_, outermost) = self.with_sched(|sched, _cs| sched.request_switch());
        self.leave(outermost);
    }

    /// Suspend the calling thread until [`wakeup`](Self::wakeup).
    ///
    /// Ignored in interrupt context.
    pub fn sleep(&'static self) {
        if self.arch.in_interrupt() {
            warn!("{}: sleep ignored in interrupt context", self.config.name);
            return;
        }
        let (_, outermost) = self.with_sched(|sched, _cs| sched.sleep_current());
        self.leave(outermost);
    }

    /// Make a sleeping thread ready. Returns `false` if `pid` was not
    /// sleeping.
    pub fn wakeup(&'static self, pid: ThreadId) -> bool {
        let (woken, outermost) = self.with_sched(|sched, _cs| sched.wakeup(pid));
        if woken {
            self.leave(outermost);
        }
        woken
    }

    /// Start scheduling. On bare metal this does not return.
    pub fn start(&'static self) {
        self.with_sched(|sched, _cs| sched.start());
        debug!("{}: scheduler started", self.config.name);
        self.arch.start(self);
    }

    // ---- mutex ---------------------------------------------------------

    /// Lock `mutex`, blocking the calling thread while it is held.
    ///
    /// Returns only once ownership has been handed to the caller.
    ///
    /// # Panics
    ///
    /// From interrupt context, inside a critical section, or outside of a
    /// thread when the mutex is held: none of those can block.
    pub fn lock(&'static self, mutex: &RawMutex) {
        assert!(
            !self.arch.in_interrupt(),
            "mutex lock called from interrupt context"
        );
        let masked = self.arch.in_critical_section();

        let blocked = {
            let guard = CriticalSectionGuard::new();
            let cs = guard.token();
            let mut sched = self.sched.borrow_ref_mut(cs);
            if !mutex.is_locked(cs) {
                mutex.set_locked(sched.current(), cs);
                None
            } else {
                assert!(
                    !masked && guard.is_outermost(),
                    "mutex lock would block inside a critical section"
                );
                match sched.block_current_on(mutex, cs) {
                    Some(pid) => Some(pid),
                    None => panic!("mutex lock would block outside of a thread"),
                }
            }
        };

        if let Some(pid) = blocked {
            trace!("{}: pid {pid} waits for mutex", self.config.name);
            // A port may return from a safe point before the hand-off.
            loop {
                self.arch.safe_point(self);
                if critical_section::with(|cs| mutex.owner_in(cs)) == Some(pid) {
                    break;
                }
            }
        }
    }

    /// Lock `mutex` if it is free. Usable from any context.
    pub fn try_lock(&self, mutex: &RawMutex) -> bool {
        let (locked, _) = self.with_sched(|sched, cs| {
            if mutex.is_locked(cs) {
                false
            } else {
                mutex.set_locked(self.caller(sched), cs);
                true
            }
        });
        locked
    }

    /// Unlock `mutex`, handing it to the most urgent waiter.
    ///
    /// With owner tracking enabled, unlocking a mutex held by someone else
    /// or not held at all is reported; otherwise such calls are accepted.
    pub fn unlock(&'static self, mutex: &RawMutex) -> KResult<()> {
        let (result, outermost) = self.with_sched(|sched, cs| self.release(sched, mutex, cs));
        self.leave(outermost);
        result
    }

    /// Unlock `mutex` and put the caller to sleep without letting any other
    /// thread run in between.
    pub fn unlock_and_sleep(&'static self, mutex: &RawMutex) -> KResult<()> {
        let (result, outermost) = self.with_sched(|sched, cs| {
            self.release(sched, mutex, cs)?;
            if !self.arch.in_interrupt() {
                sched.sleep_current();
            }
            Ok(())
        });
        self.leave(outermost);
        result
    }

    fn release(
        &self,
        sched: &mut Scheduler<A::Context>,
        mutex: &RawMutex,
        cs: CriticalSection<'_>,
    ) -> KResult<()> {
        let tracking = self.config.owner_tracking;
        if !mutex.is_locked(cs) {
            if tracking {
                warn!("{}: unlock of an unlocked mutex", self.config.name);
                return Err(KernelError::NotLocked);
            }
            trace!("{}: unlock of an unlocked mutex ignored", self.config.name);
            return Ok(());
        }

        if tracking {
            let caller = self.caller(sched);
            if let Some(owner) = mutex.owner_in(cs) {
                if Some(owner) != caller {
                    warn!(
                        "{}: unlock by {caller:?} of a mutex owned by pid {owner}",
                        self.config.name
                    );
                    return Err(KernelError::NotOwner);
                }
            }
        }

        match sched.release(mutex, cs) {
            Release::Unlocked => trace!("{}: mutex unlocked", self.config.name),
            Release::HandedOff(pid) => debug!("{}: mutex handed to pid {pid}", self.config.name),
        }
        Ok(())
    }

    /// Waiters of `mutex`, in wake-up order
    pub fn waiters(&self, mutex: &RawMutex) -> heapless::Vec<ThreadId, THREADS_NUMOF> {
        critical_section::with(|cs| {
            let sched = self.sched.borrow_ref(cs);
            sched.waiters(mutex, cs).collect()
        })
    }

    // ---- port interface ------------------------------------------------

    /// Consume the pending switch and select the thread to run.
    pub fn reschedule(&self, cs: CriticalSection<'_>) -> Switch {
        let switch = self.sched.borrow_ref_mut(cs).reschedule();
        if switch.next.is_none() && switch.is_switch() {
            trace!("{}: idle", self.config.name);
        }
        switch
    }

    /// Read access to the scheduler while a critical section is held
    pub fn scheduler<'cs>(&'cs self, cs: CriticalSection<'cs>) -> Ref<'cs, Scheduler<A::Context>> {
        self.sched.borrow_ref(cs)
    }

    /// Run `f` on the saved context of `pid`.
    pub fn with_context<R>(
        &self,
        cs: CriticalSection<'_>,
        pid: ThreadId,
        f: impl FnOnce(&mut A::Context) -> R,
    ) -> Option<R> {
        self.sched.borrow_ref_mut(cs).context_mut(pid).map(f)
    }

    // ---- queries -------------------------------------------------------

    /// The running thread, `None` while the CPU idles or before start
    pub fn current_pid(&self) -> Option<ThreadId> {
        critical_section::with(|cs| self.sched.borrow_ref(cs).current())
    }

    /// The thread making this call: `None` from interrupt context, even
    /// though a thread was running when the interrupt was taken.
    pub fn caller_pid(&self) -> Option<ThreadId> {
        critical_section::with(|cs| self.caller(&self.sched.borrow_ref(cs)))
    }

    pub fn state(&self, pid: ThreadId) -> Option<ThreadState> {
        critical_section::with(|cs| self.sched.borrow_ref(cs).state(pid))
    }

    pub fn priority(&self, pid: ThreadId) -> Option<Priority> {
        critical_section::with(|cs| self.sched.borrow_ref(cs).priority(pid))
    }

    /// True if `pid` names a live TCB (zombies included).
    pub fn is_valid_pid(&self, pid: ThreadId) -> bool {
        self.state(pid).is_some()
    }

    pub fn switch_pending(&self) -> bool {
        critical_section::with(|cs| self.sched.borrow_ref(cs).is_pending())
    }

    pub fn is_started(&self) -> bool {
        critical_section::with(|cs| self.sched.borrow_ref(cs).is_started())
    }

    pub fn thread_count(&self) -> usize {
        critical_section::with(|cs| self.sched.borrow_ref(cs).thread_count())
    }

    /// True if the CPU idles and nothing is ready.
    pub fn is_idle(&self) -> bool {
        critical_section::with(|cs| {
            let sched = self.sched.borrow_ref(cs);
            sched.current().is_none() && sched.runqueue().is_empty()
        })
    }

    /// Bytes of `pid`'s stack never written, for threads created with
    /// [`CreateFlags::STACKTEST`].
    pub fn stack_unused(&self, pid: ThreadId) -> Option<usize> {
        let stack = critical_section::with(|cs| {
            let sched = self.sched.borrow_ref(cs);
            let thread = sched.thread(pid)?;
            thread
                .flags()
                .contains(CreateFlags::STACKTEST)
                .then(|| thread.stack())
        })?;
        Some(stack.unused())
    }

    pub fn in_interrupt(&self) -> bool {
        self.arch.in_interrupt()
    }
}
