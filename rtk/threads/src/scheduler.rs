//! Thread table and scheduling state machine
//!
//! [`Scheduler`] owns every TCB, the PID allocator and the run queue. It is
//! plain data: callers hold the kernel's critical section while they touch
//! it, and nothing in here switches contexts. Decisions that need a context
//! switch only raise the pending flag; [`Scheduler::reschedule`] consumes it
//! at the next safe point.

use critical_section::CriticalSection;
use log::{debug, trace};
use rtk_core::{KResult, KernelError, Priority, ThreadId, THREADS_NUMOF};
use rtk_runqueue::RunQueue;

use crate::mutex::RawMutex;
use crate::pid::PidAllocator;
use crate::tcb::{Thread, ThreadState};

/// Outcome of a scheduling decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Switch {
    /// Thread that was running before, if it can run again later
    pub prev: Option<ThreadId>,
    /// Thread that runs now; `None` means the CPU idles
    pub next: Option<ThreadId>,
}

impl Switch {
    /// True if the CPU must change execution context.
    pub fn is_switch(&self) -> bool {
        self.prev != self.next
    }
}

/// Result of releasing a mutex
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// No waiter; the mutex is unlocked now
    Unlocked,
    /// Ownership passed to this waiter, which is ready again
    HandedOff(ThreadId),
}

/// Kernel scheduling state
pub struct Scheduler<C> {
    threads: [Option<Thread<C>>; THREADS_NUMOF],
    pids: PidAllocator,
    runqueue: RunQueue,
    current: Option<ThreadId>,
    pending: bool,
    started: bool,
}

impl<C> Scheduler<C> {
    /// Empty thread table; nothing runs until [`start`](Self::start).
    pub const fn new() -> Self {
        Self {
            threads: [const { None }; THREADS_NUMOF],
            pids: PidAllocator::new(),
            runqueue: RunQueue::new(),
            current: None,
            pending: false,
            started: false,
        }
    }

    // ---- table ---------------------------------------------------------

    /// Claim a PID for a thread about to be created.
    pub(crate) fn allocate(&mut self) -> KResult<ThreadId> {
        self.pids.allocate()
    }

    /// Return a PID claimed by [`allocate`](Self::allocate) that never got
    /// a TCB.
    pub(crate) fn release_unused(&mut self, pid: ThreadId) {
        debug_assert!(self.threads[pid.index()].is_none());
        self.pids.free(pid);
    }

    /// Store a fresh TCB; its slot must have been allocated.
    pub(crate) fn insert(&mut self, thread: Thread<C>) {
        let pid = thread.pid;
        debug_assert!(self.pids.is_used(pid));
        debug_assert!(self.threads[pid.index()].is_none());
        self.threads[pid.index()] = Some(thread);
    }

    pub fn thread(&self, pid: ThreadId) -> Option<&Thread<C>> {
        self.threads[pid.index()].as_ref()
    }

    pub(crate) fn thread_mut(&mut self, pid: ThreadId) -> Option<&mut Thread<C>> {
        self.threads[pid.index()].as_mut()
    }

    /// Live TCB of `pid`. Used where the caller already established that the
    /// slot is occupied; an empty slot here is a corrupted kernel.
    fn tcb(&mut self, pid: ThreadId) -> &mut Thread<C> {
        match self.threads[pid.index()].as_mut() {
            Some(thread) => thread,
            None => panic!("thread table has no entry for pid {pid}"),
        }
    }

    pub fn state(&self, pid: ThreadId) -> Option<ThreadState> {
        self.thread(pid).map(Thread::state)
    }

    pub fn priority(&self, pid: ThreadId) -> Option<Priority> {
        self.thread(pid).map(Thread::priority)
    }

    /// Saved context of `pid`
    pub fn context(&self, pid: ThreadId) -> Option<&C> {
        self.thread(pid).map(Thread::context)
    }

    pub(crate) fn context_mut(&mut self, pid: ThreadId) -> Option<&mut C> {
        self.thread_mut(pid).map(|thread| &mut thread.context)
    }

    /// Number of occupied TCB slots
    pub fn thread_count(&self) -> usize {
        self.pids.count()
    }

    /// Occupied slots in PID order
    pub fn iter(&self) -> impl Iterator<Item = &Thread<C>> {
        self.threads.iter().flatten()
    }

    pub fn current(&self) -> Option<ThreadId> {
        self.current
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn runqueue(&self) -> &RunQueue {
        &self.runqueue
    }

    // ---- ready queue ---------------------------------------------------

    /// Ask for a context switch at the next safe point.
    pub(crate) fn request_switch(&mut self) {
        self.pending = true;
    }

    /// Mark the scheduler started; the first safe point dispatches.
    pub(crate) fn start(&mut self) {
        self.started = true;
        self.pending = true;
    }

    /// Move a thread that is not running into the run queue.
    ///
    /// Raises the switch request when the thread outranks the running one,
    /// or when the CPU idles after start.
    pub(crate) fn enqueue_ready(&mut self, pid: ThreadId) {
        let thread = self.tcb(pid);
        debug_assert!(
            !matches!(thread.state, ThreadState::Ready | ThreadState::Running),
            "pid {pid} queued twice"
        );
        thread.state = ThreadState::Ready;
        let prio = thread.priority;
        if self.runqueue.push_back(pid, prio).is_err() {
            panic!("run queue level {prio} overflow");
        }
        trace!("pid {pid} ready at {prio}");

        if self.started && self.outranks_current(prio) {
            self.request_switch();
        }
    }

    fn outranks_current(&self, prio: Priority) -> bool {
        match self.current.and_then(|cur| self.priority(cur)) {
            Some(running) => prio.outranks(running),
            None => true,
        }
    }

    /// Head of the most urgent non-empty level; `None` means idle.
    pub fn select_next(&self) -> Option<ThreadId> {
        self.runqueue.peek_next().map(|(pid, _)| pid)
    }

    /// Unlink `pid` from the run queue and give it the CPU.
    pub(crate) fn mark_running(&mut self, pid: ThreadId) {
        let thread = self.tcb(pid);
        let prio = thread.priority;
        thread.state = ThreadState::Running;
        let queued = self.runqueue.remove(pid, prio);
        debug_assert!(queued, "pid {pid} was not ready");
        self.current = Some(pid);
    }

    /// Take the CPU from the running thread, leaving it in `state`.
    fn suspend_current(&mut self, state: ThreadState) -> Option<ThreadId> {
        let pid = self.current?;
        let thread = self.tcb(pid);
        debug_assert_eq!(thread.state, ThreadState::Running);
        thread.state = state;
        self.request_switch();
        Some(pid)
    }

    /// Consume the switch request and pick the thread that runs next.
    ///
    /// A running thread keeps the CPU unless a strictly more urgent thread
    /// is ready; if it is preempted it goes back to the *head* of its level.
    /// A thread that gave the CPU up (blocked, slept, yielded, exited) is
    /// replaced by the head of the most urgent level.
    pub fn reschedule(&mut self) -> Switch {
        self.pending = false;
        let prev = self.current;
        if !self.started {
            return Switch { prev, next: prev };
        }

        if let Some(cur) = prev {
            let (state, prio) = {
                let thread = self.tcb(cur);
                (thread.state, thread.priority)
            };
            if state == ThreadState::Running {
                match self.runqueue.highest() {
                    Some(best) if best.outranks(prio) => {
                        self.tcb(cur).state = ThreadState::Ready;
                        if self.runqueue.push_front(cur, prio).is_err() {
                            panic!("run queue level {prio} overflow");
                        }
                        trace!("pid {cur} preempted");
                    }
                    _ => return Switch { prev, next: prev },
                }
            }
        }

        let next = self.select_next();
        match next {
            Some(pid) => self.mark_running(pid),
            None => self.current = None,
        }

        let prev = prev.filter(|pid| self.state(*pid).is_some_and(ThreadState::is_alive));
        let switch = Switch { prev, next };
        if switch.is_switch() {
            debug!("switch {:?} -> {:?}", switch.prev, switch.next);
        }
        switch
    }

    /// Running thread goes to the tail of its level.
    pub(crate) fn yield_current(&mut self) {
        let Some(pid) = self.current else {
            return;
        };
        let thread = self.tcb(pid);
        if thread.state != ThreadState::Running {
            return;
        }
        thread.state = ThreadState::Ready;
        let prio = thread.priority;
        if self.runqueue.push_back(pid, prio).is_err() {
            panic!("run queue level {prio} overflow");
        }
        self.request_switch();
    }

    // ---- sleep / lifecycle ---------------------------------------------

    pub(crate) fn sleep_current(&mut self) -> Option<ThreadId> {
        let pid = self.suspend_current(ThreadState::Sleeping)?;
        trace!("pid {pid} sleeping");
        Some(pid)
    }

    /// Wake a sleeping thread. Returns `false` if it was not sleeping.
    pub(crate) fn wakeup(&mut self, pid: ThreadId) -> bool {
        match self.state(pid) {
            Some(ThreadState::Sleeping) => {
                self.enqueue_ready(pid);
                true
            }
            state => {
                trace!("wakeup of pid {pid} ignored in state {state:?}");
                false
            }
        }
    }

    pub(crate) fn zombify_current(&mut self) -> Option<ThreadId> {
        let pid = self.suspend_current(ThreadState::Zombie)?;
        debug!("pid {pid} zombie");
        Some(pid)
    }

    /// Release the TCB and PID of a zombie.
    pub(crate) fn kill_zombie(&mut self, pid: ThreadId) -> KResult<Thread<C>> {
        match self.state(pid) {
            None => Err(KernelError::InvalidPid(pid)),
            Some(ThreadState::Zombie) => Ok(self.remove(pid)),
            Some(_) => Err(KernelError::NotZombie(pid)),
        }
    }

    /// Entry function of `pid` returned: free its slot right away.
    pub(crate) fn exit(&mut self, pid: ThreadId) -> Option<Thread<C>> {
        let state = self.state(pid)?;
        debug_assert!(
            matches!(state, ThreadState::Running | ThreadState::New),
            "pid {pid} exiting in state {state:?}"
        );
        if self.current == Some(pid) {
            self.current = None;
        }
        self.request_switch();
        debug!("pid {pid} exited");
        Some(self.remove(pid))
    }

    fn remove(&mut self, pid: ThreadId) -> Thread<C> {
        match self.threads[pid.index()].take() {
            Some(thread) => {
                self.pids.free(pid);
                thread
            }
            None => panic!("thread table has no entry for pid {pid}"),
        }
    }

    // ---- mutex wait lists ----------------------------------------------

    /// Block the running thread on `mutex`.
    ///
    /// The thread is inserted behind every waiter of equal or higher
    /// priority, so the list stays priority ordered and FIFO within a level.
    pub(crate) fn block_current_on(&mut self, mutex: &RawMutex, cs: CriticalSection<'_>) -> Option<ThreadId> {
        let pid = self.suspend_current(ThreadState::Blocked)?;
        let prio = self.tcb(pid).priority;

        let mut before: Option<ThreadId> = None;
        let mut cursor = mutex.head(cs);
        while let Some(waiter) = cursor {
            let thread = self.tcb(waiter);
            if prio.outranks(thread.priority) {
                break;
            }
            before = Some(waiter);
            cursor = thread.wait_next;
        }

        self.tcb(pid).wait_next = cursor;
        match before {
            Some(prev) => self.tcb(prev).wait_next = Some(pid),
            None => mutex.set_head(Some(pid), cs),
        }
        if cursor.is_none() {
            mutex.set_tail(Some(pid), cs);
        }
        trace!("pid {pid} blocked on mutex");
        Some(pid)
    }

    /// Unlock `mutex`, handing it to the first waiter if there is one.
    pub(crate) fn release(&mut self, mutex: &RawMutex, cs: CriticalSection<'_>) -> Release {
        let Some(waiter) = mutex.head(cs) else {
            mutex.set_unlocked(cs);
            return Release::Unlocked;
        };

        let thread = self.tcb(waiter);
        let next = thread.wait_next.take();
        debug_assert_eq!(thread.state, ThreadState::Blocked);
        mutex.set_head(next, cs);
        if next.is_none() {
            mutex.set_tail(None, cs);
        }
        mutex.set_locked(Some(waiter), cs);
        self.enqueue_ready(waiter);
        trace!("mutex handed to pid {waiter}");
        Release::HandedOff(waiter)
    }

    /// Waiters of `mutex`, in the order they will be woken
    pub fn waiters<'a>(&'a self, mutex: &'a RawMutex, cs: CriticalSection<'a>) -> impl Iterator<Item = ThreadId> + 'a {
        let mut cursor = mutex.head(cs);
        core::iter::from_fn(move || {
            let pid = cursor?;
            cursor = self.thread(pid).and_then(|thread| thread.wait_next);
            Some(pid)
        })
    }
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}
