//! `thread_create` and the thread helpers

use core::ffi::{c_char, c_int, c_void, CStr};
use core::slice;

use log::{debug, warn};
use rtk_core::{CreateFlags, Priority, ThreadId};
use rtk_threads::{ThreadEntry, ThreadState};

use crate::binding::{kernel, sync_switch_request};
use crate::{errno_of, kernel_pid_t, EINVAL};

/// Entry point of a thread created from C
pub type thread_task_func_t = Option<unsafe extern "C" fn(arg: *mut c_void) -> *mut c_void>;

pub const THREAD_CREATE_SLEEPING: c_int = CreateFlags::SLEEPING.bits() as c_int;
pub const THREAD_CREATE_WOUT_YIELD: c_int = CreateFlags::WITHOUT_YIELD.bits() as c_int;
pub const THREAD_CREATE_STACKTEST: c_int = CreateFlags::STACKTEST.bits() as c_int;

/// Thread status as reported by [`thread_getstatus`]
pub type thread_status_t = c_int;

pub const STATUS_NOT_FOUND: thread_status_t = -1;
pub const STATUS_ZOMBIE: thread_status_t = 1;
pub const STATUS_SLEEPING: thread_status_t = 2;
pub const STATUS_MUTEX_BLOCKED: thread_status_t = 3;
pub const STATUS_RUNNING: thread_status_t = 11;
pub const STATUS_PENDING: thread_status_t = 12;

pub const fn status_of(state: ThreadState) -> thread_status_t {
    match state {
        ThreadState::Zombie => STATUS_ZOMBIE,
        ThreadState::Sleeping => STATUS_SLEEPING,
        ThreadState::Blocked => STATUS_MUTEX_BLOCKED,
        ThreadState::Running => STATUS_RUNNING,
        ThreadState::New | ThreadState::Ready => STATUS_PENDING,
    }
}

/// Create a thread on a caller-provided stack.
///
/// `priority` is on the C scale, 0 being the most urgent level. Returns the
/// new PID, `-EOVERFLOW` if no thread control block is free, or `-EINVAL`
/// for an out-of-range priority, a missing entry or an unusable stack.
///
/// # Safety
///
/// `stack` must point to `stacksize` writable bytes that are handed over to
/// the new thread for good. `task_func` must be sound to call with `arg` on
/// the new thread. `name` is null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn thread_create(
    stack: *mut c_char,
    stacksize: c_int,
    priority: u8,
    flags: c_int,
    task_func: thread_task_func_t,
    arg: *mut c_void,
    name: *const c_char,
) -> kernel_pid_t {
    let Some(func) = task_func else {
        warn!("thread_create: no entry function");
        return -(EINVAL as kernel_pid_t);
    };
    let len = match usize::try_from(stacksize) {
        Ok(len) if len > 0 && !stack.is_null() => len,
        _ => {
            warn!("thread_create: bad stack {stack:p}/{stacksize}");
            return -(EINVAL as kernel_pid_t);
        }
    };
    let priority = match Priority::from_external(priority) {
        Ok(priority) => priority,
        Err(err) => {
            warn!("thread_create: {err}");
            return errno_of(err) as kernel_pid_t;
        }
    };
    let flags = CreateFlags::from_bits_truncate(flags as u8);

    // SAFETY: the caller hands `len` bytes at `stack` over to the thread.
    let stack = unsafe { slice::from_raw_parts_mut(stack.cast::<u8>(), len) };
    // SAFETY: guaranteed by the caller.
    let entry = unsafe { ThreadEntry::from_extern(func, arg) };

    let k = kernel();
    let pid = match k.create(stack, priority, flags, entry) {
        Ok(pid) => {
            if !name.is_null() {
                // SAFETY: non-null names are NUL-terminated.
                let name = unsafe { CStr::from_ptr(name) };
                debug!("thread_create: pid {pid} is {:?}", name);
            }
            ThreadId::to_pid(Some(pid))
        }
        Err(err) => errno_of(err) as kernel_pid_t,
    };
    sync_switch_request(k);
    pid
}

/// Let the next thread of the same priority run.
#[no_mangle]
pub extern "C" fn thread_yield() {
    let k = kernel();
    k.yield_now();
    sync_switch_request(k);
}

/// Let a more urgent ready thread run now.
#[no_mangle]
pub extern "C" fn thread_yield_higher() {
    let k = kernel();
    k.yield_higher();
    sync_switch_request(k);
}

/// PID of the calling thread, `KERNEL_PID_ISR` from interrupt context.
#[no_mangle]
pub extern "C" fn thread_getpid() -> kernel_pid_t {
    ThreadId::to_pid(kernel().caller_pid())
}

/// Suspend the calling thread until [`thread_wakeup`].
#[no_mangle]
pub extern "C" fn thread_sleep() {
    let k = kernel();
    k.sleep();
    sync_switch_request(k);
}

/// Wake a sleeping thread. Returns 1 if it was woken, 0 if it was not
/// sleeping and [`STATUS_NOT_FOUND`] if there is no such thread.
#[no_mangle]
pub extern "C" fn thread_wakeup(pid: kernel_pid_t) -> c_int {
    let k = kernel();
    let Some(id) = ThreadId::from_pid(pid).filter(|id| k.state(*id).is_some()) else {
        return STATUS_NOT_FOUND;
    };
    let woken = k.wakeup(id);
    sync_switch_request(k);
    c_int::from(woken)
}

/// Stop the calling thread without releasing its PID.
#[no_mangle]
pub extern "C" fn thread_zombify() -> ! {
    kernel().zombify()
}

/// Release a zombie's PID. Returns 1 on success, 0 if the thread is not a
/// zombie and [`STATUS_NOT_FOUND`] if there is no such thread.
#[no_mangle]
pub extern "C" fn thread_kill_zombie(pid: kernel_pid_t) -> c_int {
    let k = kernel();
    let Some(id) = ThreadId::from_pid(pid) else {
        return STATUS_NOT_FOUND;
    };
    match k.state(id) {
        None => STATUS_NOT_FOUND,
        Some(ThreadState::Zombie) => match k.kill_zombie(id) {
            Ok(()) => 1,
            Err(err) => {
                warn!("thread_kill_zombie: {err}");
                0
            }
        },
        Some(_) => 0,
    }
}

#[no_mangle]
pub extern "C" fn thread_getstatus(pid: kernel_pid_t) -> thread_status_t {
    ThreadId::from_pid(pid)
        .and_then(|id| kernel().state(id))
        .map_or(STATUS_NOT_FOUND, status_of)
}

/// 1 if `pid` names a live thread, 0 otherwise.
#[no_mangle]
pub extern "C" fn thread_is_valid_pid(pid: kernel_pid_t) -> c_int {
    c_int::from(ThreadId::from_pid(pid).is_some_and(|id| kernel().state(id).is_some()))
}
