//! `mutex_t` and its functions

use core::ffi::c_int;
use core::fmt;
use core::mem::{align_of, size_of};

use log::error;
use rtk_threads::{MutexState, RawMutex};

use crate::binding::{kernel, sync_switch_request};

/// Mutex storage as laid out for C: the kernel's [`RawMutex`] verbatim.
#[repr(transparent)]
pub struct mutex_t(RawMutex);

impl mutex_t {
    pub const fn new() -> Self {
        Self(RawMutex::new())
    }

    pub const fn new_locked() -> Self {
        Self(RawMutex::new_locked())
    }

    pub fn raw(&self) -> &RawMutex {
        &self.0
    }

    pub fn state(&self) -> MutexState {
        self.0.state()
    }
}

impl Default for mutex_t {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for mutex_t {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

/// `sizeof(mutex_t)`
pub const MUTEX_T_SIZEOF: usize = size_of::<RawMutex>();

/// `_Alignof(mutex_t)`
pub const MUTEX_T_ALIGNOF: usize = align_of::<RawMutex>();

const _: () = assert!(size_of::<mutex_t>() == MUTEX_T_SIZEOF);
const _: () = assert!(align_of::<mutex_t>() == MUTEX_T_ALIGNOF);

/// Static initialiser of an unlocked mutex (all bytes zero)
#[no_mangle]
pub static MUTEX_INIT: mutex_t = mutex_t::new();

/// Static initialiser of a mutex that starts out locked
#[no_mangle]
pub static MUTEX_INIT_LOCKED: mutex_t = mutex_t::new_locked();

/// # Safety
///
/// `mutex` must point to a valid `mutex_t` that outlives the returned
/// reference.
unsafe fn raw<'a>(mutex: *mut mutex_t) -> &'a RawMutex {
    assert!(!mutex.is_null(), "null mutex_t");
    // SAFETY: non-null, validity guaranteed by the caller.
    unsafe { &(*mutex).0 }
}

/// Initialise `mutex` as unlocked.
///
/// # Safety
///
/// `mutex` must be valid for writes and not in use by any thread.
#[no_mangle]
pub unsafe extern "C" fn mutex_init(mutex: *mut mutex_t) {
    assert!(!mutex.is_null(), "null mutex_t");
    // SAFETY: guaranteed by the caller.
    unsafe { mutex.write(mutex_t::new()) }
}

/// Initialise `mutex` as locked with no owner and no waiters.
///
/// # Safety
///
/// As for [`mutex_init`].
#[no_mangle]
pub unsafe extern "C" fn mutex_init_locked(mutex: *mut mutex_t) {
    assert!(!mutex.is_null(), "null mutex_t");
    // SAFETY: guaranteed by the caller.
    unsafe { mutex.write(mutex_t::new_locked()) }
}

/// Lock `mutex`, blocking the calling thread while it is held.
///
/// # Safety
///
/// `mutex` must point to an initialised `mutex_t` that stays in place while
/// the caller is queued on it.
#[no_mangle]
pub unsafe extern "C" fn mutex_lock(mutex: *mut mutex_t) {
    let k = kernel();
    // SAFETY: guaranteed by the caller.
    k.lock(unsafe { raw(mutex) });
    sync_switch_request(k);
}

/// Lock `mutex` if it is free. Returns 1 on success, 0 if it is held.
///
/// Callable from interrupt context.
///
/// # Safety
///
/// `mutex` must point to an initialised `mutex_t`.
#[no_mangle]
pub unsafe extern "C" fn mutex_trylock(mutex: *mut mutex_t) -> c_int {
    // SAFETY: guaranteed by the caller.
    c_int::from(kernel().try_lock(unsafe { raw(mutex) }))
}

/// Unlock `mutex`, handing it to the most urgent waiter if there is one.
///
/// # Safety
///
/// `mutex` must point to an initialised `mutex_t`.
#[no_mangle]
pub unsafe extern "C" fn mutex_unlock(mutex: *mut mutex_t) {
    let k = kernel();
    // SAFETY: guaranteed by the caller.
    if let Err(err) = k.unlock(unsafe { raw(mutex) }) {
        error!("mutex_unlock: {err}");
    }
    sync_switch_request(k);
}

/// Unlock `mutex` and put the calling thread to sleep in one step, so that
/// no wakeup can slip in between.
///
/// # Safety
///
/// `mutex` must point to an initialised `mutex_t`.
#[no_mangle]
pub unsafe extern "C" fn mutex_unlock_and_sleep(mutex: *mut mutex_t) {
    let k = kernel();
    // SAFETY: guaranteed by the caller.
    if let Err(err) = k.unlock_and_sleep(unsafe { raw(mutex) }) {
        error!("mutex_unlock_and_sleep: {err}");
    }
    sync_switch_request(k);
}
