//! Data-carrying mutex on top of [`RawMutex`]

use core::cell::UnsafeCell;
use core::fmt;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};

use log::error;

use crate::kernel::Kernel;
use crate::mutex::{MutexState, RawMutex};
use crate::switch::Arch;

/// Mutex protecting a value of type `T`.
///
/// Locking blocks the calling kernel thread; the guard unlocks on drop.
pub struct Mutex<T> {
    raw: RawMutex,
    data: UnsafeCell<T>,
}

// SAFETY: `data` is only reachable through a `MutexGuard`, and the raw lock
// admits one guard at a time.
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    /// Creates an unlocked mutex.
    pub const fn new(value: T) -> Self {
        Self {
            raw: RawMutex::new(),
            data: UnsafeCell::new(value),
        }
    }

    /// Acquires the mutex, blocking the calling thread until it is free.
    pub fn lock<A: Arch>(&self, kernel: &'static Kernel<A>) -> MutexGuard<'_, T, A> {
        kernel.lock(&self.raw);
        MutexGuard::new(self, kernel)
    }

    /// Acquires the mutex if it is free.
    pub fn try_lock<A: Arch>(&self, kernel: &'static Kernel<A>) -> Option<MutexGuard<'_, T, A>> {
        kernel
            .try_lock(&self.raw)
            .then(|| MutexGuard::new(self, kernel))
    }

    pub fn state(&self) -> MutexState {
        self.raw.state()
    }

    /// Underlying lock
    pub fn raw(&self) -> &RawMutex {
        &self.raw
    }

    /// Mutable access without locking; the borrow proves exclusivity.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex")
            .field("state", &self.raw.state())
            .finish_non_exhaustive()
    }
}

/// Exclusive access to the value of a locked [`Mutex`].
///
/// Not `Send`: the lock belongs to the thread that took it.
pub struct MutexGuard<'a, T, A: Arch> {
    mutex: &'a Mutex<T>,
    kernel: &'static Kernel<A>,
    _not_send: PhantomData<*const ()>,
}

impl<'a, T, A: Arch> MutexGuard<'a, T, A> {
    fn new(mutex: &'a Mutex<T>, kernel: &'static Kernel<A>) -> Self {
        Self {
            mutex,
            kernel,
            _not_send: PhantomData,
        }
    }
}

impl<T, A: Arch> Deref for MutexGuard<'_, T, A> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard holds the lock.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T, A: Arch> DerefMut for MutexGuard<'_, T, A> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard holds the lock and is borrowed mutably.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T, A: Arch> Drop for MutexGuard<'_, T, A> {
    fn drop(&mut self) {
        if let Err(err) = self.kernel.unlock(&self.mutex.raw) {
            error!("mutex guard release failed: {err}");
        }
    }
}

impl<T: fmt::Debug, A: Arch> fmt::Debug for MutexGuard<'_, T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
