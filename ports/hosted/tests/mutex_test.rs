//! End-to-end mutex behaviour on the hosted port

mod common;

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

use common::{kernel, leak_mutex, run, spawn, Trace};
use rtk_core::CreateFlags;
use rtk_port_hosted::critical;
use rtk_threads::{Mutex, MutexState, RawMutex, ThreadState};

#[test]
fn test_lock_hand_off_between_two_threads() {
    let kernel = kernel();
    let m = leak_mutex(RawMutex::new());
    let trace = Trace::default();

    let a_trace = trace.clone();
    spawn(kernel, 3, CreateFlags::empty(), move || {
        kernel.lock(m);
        assert_eq!(m.state(), MutexState::LockedNoWaiters);
        a_trace.push("a locked");

        let b_trace = a_trace.clone();
        spawn(kernel, 6, CreateFlags::empty(), move || {
            b_trace.push("b waiting");
            kernel.lock(m);
            assert_eq!(m.state(), MutexState::LockedNoWaiters);
            b_trace.push("b holds");
            kernel.unlock(m).unwrap();
        });

        assert_eq!(m.state(), MutexState::LockedWithWaiters);
        a_trace.push("a unlocking");
        kernel.unlock(m).unwrap();
        a_trace.push("a done");
    });

    kernel.start();
    run(kernel);

    assert_eq!(
        trace.events(),
        vec!["a locked", "b waiting", "a unlocking", "b holds", "a done"]
    );
    assert_eq!(m.state(), MutexState::Unlocked);
}

#[test]
fn test_prelocked_mutex_is_a_rendezvous() {
    let kernel = kernel();
    let m = leak_mutex(RawMutex::new_locked());
    let trace = Trace::default();

    let t = trace.clone();
    let waiter = spawn(kernel, 4, CreateFlags::empty(), move || {
        t.push("waiting");
        kernel.lock(m);
        t.push("released");
    });

    kernel.start();
    run(kernel);
    assert_eq!(trace.events(), vec!["waiting"]);
    assert_eq!(kernel.state(waiter), Some(ThreadState::Blocked));
    assert_eq!(m.state(), MutexState::LockedWithWaiters);

    kernel.unlock(m).unwrap();
    run(kernel);
    assert_eq!(trace.events(), vec!["waiting", "released"]);
    assert_eq!(m.state(), MutexState::LockedNoWaiters);
}

#[test]
fn test_waiters_are_served_by_priority_then_fifo() {
    let kernel = kernel();
    let m = leak_mutex(RawMutex::new_locked());
    let trace = Trace::default();

    let mut pids = Vec::new();
    for (level, name) in [(3, "w1"), (3, "w2"), (3, "w3"), (6, "high")] {
        let t = trace.clone();
        pids.push(spawn(kernel, level, CreateFlags::empty(), move || {
            kernel.lock(m);
            t.push(name);
            kernel.unlock(m).unwrap();
        }));
    }

    kernel.start();
    run(kernel);
    let expected = vec![pids[3], pids[0], pids[1], pids[2]];
    assert_eq!(kernel.waiters(m).as_slice(), expected.as_slice());

    kernel.unlock(m).unwrap();
    run(kernel);
    assert_eq!(trace.events(), vec!["high", "w1", "w2", "w3"]);
    assert_eq!(m.state(), MutexState::Unlocked);
}

#[test]
fn test_each_unlock_wakes_exactly_one_waiter() {
    let kernel = kernel();
    let m = leak_mutex(RawMutex::new_locked());
    let trace = Trace::default();

    for name in ["first", "second", "third"] {
        let t = trace.clone();
        spawn(kernel, 2, CreateFlags::empty(), move || {
            kernel.lock(m);
            // Exit while still holding the lock.
            t.push(name);
        });
    }

    kernel.start();
    run(kernel);
    assert!(trace.events().is_empty());

    kernel.unlock(m).unwrap();
    run(kernel);
    assert_eq!(trace.events(), vec!["first"]);
    assert_eq!(m.state(), MutexState::LockedWithWaiters);
    assert_eq!(kernel.waiters(m).len(), 2);

    kernel.unlock(m).unwrap();
    run(kernel);
    assert_eq!(trace.events(), vec!["first", "second"]);
    assert_eq!(m.state(), MutexState::LockedWithWaiters);
    assert_eq!(kernel.waiters(m).len(), 1);
}

#[test]
fn test_mutual_exclusion_under_contention() {
    const ROUNDS: u32 = 20;
    static INSIDE: AtomicBool = AtomicBool::new(false);

    let kernel = kernel();
    let counter: &'static Mutex<u32> = Box::leak(Box::new(Mutex::new(0)));

    let levels = [2u8, 2, 4, 4, 7];
    for level in levels {
        spawn(kernel, level, CreateFlags::empty(), move || {
            for _ in 0..ROUNDS {
                let mut value = counter.lock(kernel);
                assert!(!INSIDE.swap(true, Ordering::SeqCst), "two holders at once");
                let seen = *value;
                kernel.yield_now();
                *value = seen + 1;
                INSIDE.store(false, Ordering::SeqCst);
                drop(value);
                kernel.yield_now();
            }
        });
    }

    kernel.start();
    run(kernel);

    let total = counter.try_lock(kernel).map(|value| *value);
    assert_eq!(total, Some(ROUNDS * levels.len() as u32));
}

#[test]
fn test_unlock_and_sleep_is_atomic() {
    let kernel = kernel();
    let m = leak_mutex(RawMutex::new());
    let trace = Trace::default();

    let t = trace.clone();
    let sleeper = spawn(kernel, 5, CreateFlags::empty(), move || {
        kernel.lock(m);
        kernel.unlock_and_sleep(m).unwrap();
        t.push("woken");
    });

    kernel.start();
    run(kernel);
    assert_eq!(kernel.state(sleeper), Some(ThreadState::Sleeping));
    assert_eq!(m.state(), MutexState::Unlocked);

    kernel.wakeup(sleeper);
    run(kernel);
    assert_eq!(trace.events(), vec!["woken"]);
}

#[test]
fn test_try_lock_from_interrupt_context() {
    let kernel = kernel();
    let m = leak_mutex(RawMutex::new());
    assert!(kernel.try_lock(m));
    assert!(!kernel.try_lock(m));
    assert_eq!(m.state(), MutexState::LockedNoWaiters);
    kernel.unlock(m).unwrap();
    assert_eq!(m.state(), MutexState::Unlocked);
}

#[test]
#[should_panic(expected = "mutex lock called from interrupt context")]
fn test_lock_from_interrupt_context_panics() {
    let kernel = kernel();
    let m = leak_mutex(RawMutex::new());
    kernel.lock(m);
}

#[test]
fn test_blocking_lock_inside_critical_section_traps() {
    let kernel = kernel();
    let free = leak_mutex(RawMutex::new());
    let held = leak_mutex(RawMutex::new_locked());
    let trace = Trace::default();

    let t = trace.clone();
    spawn(kernel, 4, CreateFlags::empty(), move || {
        // Taking a free mutex never blocks, so it is fine here.
        critical_section::with(|_| kernel.lock(free));
        kernel.unlock(free).unwrap();
        t.push("free taken");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            critical_section::with(|_| kernel.lock(held));
        }));
        if outcome.is_err() {
            t.push("trapped");
        }
        assert_eq!(critical::held(), 0);
    });

    kernel.start();
    run(kernel);

    assert_eq!(trace.events(), vec!["free taken", "trapped"]);
    assert_eq!(held.state(), MutexState::LockedNoWaiters);
    assert_eq!(free.state(), MutexState::Unlocked);
}

#[test]
#[should_panic(expected = "a kernel thread panicked")]
fn test_blocking_lock_inside_critical_section_is_reported() {
    let kernel = kernel();
    let held = leak_mutex(RawMutex::new_locked());
    spawn(kernel, 4, CreateFlags::empty(), move || {
        critical_section::with(|_| kernel.lock(held));
    });
    kernel.start();
    run(kernel);
}
