//! Binary hand-off semaphore

use std::sync::{Condvar, Mutex, PoisonError};

/// A one-slot permit. `release` stores it, `wait` blocks until it can take
/// it. A release that happens before the matching wait is not lost.
#[derive(Debug, Default)]
pub struct Baton {
    ready: Mutex<bool>,
    cv: Condvar,
}

impl Baton {
    pub const fn new() -> Self {
        Self {
            ready: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    pub fn release(&self) {
        let mut ready = self.ready.lock().unwrap_or_else(PoisonError::into_inner);
        *ready = true;
        self.cv.notify_one();
    }

    pub fn wait(&self) {
        let mut ready = self.ready.lock().unwrap_or_else(PoisonError::into_inner);
        while !*ready {
            ready = self.cv.wait(ready).unwrap_or_else(PoisonError::into_inner);
        }
        *ready = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn release_before_wait_is_kept() {
        let baton = Baton::new();
        baton.release();
        baton.wait();
    }

    #[test]
    fn wait_blocks_until_release() {
        let baton = Arc::new(Baton::new());
        let other = Arc::clone(&baton);
        let handle = thread::spawn(move || other.wait());
        baton.release();
        handle.join().unwrap();
    }
}
