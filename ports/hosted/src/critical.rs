//! Process-wide critical section for hosted builds
//!
//! One host thread at a time may hold it. Nested acquisitions by the holder
//! just count, so the port can ask how deep the caller already is before it
//! lets a kernel thread block.

use std::cell::Cell;
use std::sync::{Condvar, Mutex, PoisonError};

use critical_section::RawRestoreState;

static TAKEN: Mutex<bool> = Mutex::new(false);
static FREED: Condvar = Condvar::new();

thread_local! {
    static HELD: Cell<usize> = const { Cell::new(0) };
}

/// Critical sections the calling host thread currently holds
pub fn held() -> usize {
    HELD.with(Cell::get)
}

struct HostCriticalSection;
critical_section::set_impl!(HostCriticalSection);

unsafe impl critical_section::Impl for HostCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let depth = held();
        if depth == 0 {
            let mut taken = TAKEN.lock().unwrap_or_else(PoisonError::into_inner);
            while *taken {
                taken = FREED.wait(taken).unwrap_or_else(PoisonError::into_inner);
            }
            *taken = true;
        }
        HELD.with(|held| held.set(depth + 1));
        // Nested: the outer section stays in charge of the lock.
        depth > 0
    }

    unsafe fn release(nested: RawRestoreState) {
        HELD.with(|held| held.set(held.get().saturating_sub(1)));
        if !nested {
            *TAKEN.lock().unwrap_or_else(PoisonError::into_inner) = false;
            FREED.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nesting_is_counted_per_thread() {
        assert_eq!(held(), 0);
        critical_section::with(|_| {
            assert_eq!(held(), 1);
            critical_section::with(|_| assert_eq!(held(), 2));
            let other = std::thread::spawn(held).join().unwrap();
            assert_eq!(other, 0);
            assert_eq!(held(), 1);
        });
        assert_eq!(held(), 0);
    }

    #[test]
    fn test_other_threads_wait_for_the_holder() {
        let (tx, rx) = std::sync::mpsc::channel();
        let waiter = critical_section::with(|_| {
            let waiter = std::thread::spawn(move || {
                critical_section::with(|_| tx.send(held()).unwrap());
            });
            std::thread::sleep(std::time::Duration::from_millis(20));
            assert!(rx.try_recv().is_err());
            waiter
        });
        waiter.join().unwrap();
        assert_eq!(rx.recv().unwrap(), 1);
    }
}
