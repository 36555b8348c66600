//! Random lock/unlock/yield schedules on the hosted port

mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use common::{kernel, leak_mutex, run, spawn};
use proptest::prelude::*;
use rtk_core::CreateFlags;
use rtk_port_hosted::HostedKernel;
use rtk_threads::{MutexState, RawMutex};

#[derive(Debug, Clone)]
enum Op {
    /// Lock, yield `n` times while holding the mutex, unlock
    Hold(u8),
    /// Like `Hold`, but only if `try_lock` finds the mutex free
    TryHold(u8),
    Yield,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u8..3).prop_map(Op::Hold),
        1 => (0u8..3).prop_map(Op::TryHold),
        1 => Just(Op::Yield),
    ]
}

/// Internal priority level and the ops one thread runs. Two levels only, so
/// equal priorities meet and yield to each other while holding the lock.
fn script() -> impl Strategy<Value = (u8, Vec<Op>)> {
    (prop_oneof![Just(3u8), Just(5u8)], prop::collection::vec(op(), 1..6))
}

#[derive(Default)]
struct Shared {
    inside: AtomicBool,
    violations: AtomicUsize,
    entered: AtomicUsize,
}

impl Shared {
    fn hold(&self, kernel: &'static HostedKernel, m: &RawMutex, yields: u8) {
        if self.inside.swap(true, Ordering::SeqCst) {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
        self.entered.fetch_add(1, Ordering::SeqCst);
        for _ in 0..yields {
            kernel.yield_now();
            if m.state() == MutexState::Unlocked {
                self.violations.fetch_add(1, Ordering::SeqCst);
            }
        }
        self.inside.store(false, Ordering::SeqCst);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_random_schedules_keep_mutual_exclusion(scripts in prop::collection::vec(script(), 1..5)) {
        let kernel = kernel();
        let m = leak_mutex(RawMutex::new());
        let shared = Arc::new(Shared::default());

        let mut blocking_holds = 0;
        for (level, ops) in scripts {
            blocking_holds += ops.iter().filter(|op| matches!(op, Op::Hold(_))).count();
            let shared = Arc::clone(&shared);
            spawn(kernel, level, CreateFlags::empty(), move || {
                for op in ops {
                    match op {
                        Op::Hold(yields) => {
                            kernel.lock(m);
                            shared.hold(kernel, m, yields);
                            kernel.unlock(m).unwrap();
                        }
                        Op::TryHold(yields) => {
                            if kernel.try_lock(m) {
                                shared.hold(kernel, m, yields);
                                kernel.unlock(m).unwrap();
                            }
                        }
                        Op::Yield => kernel.yield_now(),
                    }
                }
            });
        }

        kernel.start();
        run(kernel);

        prop_assert_eq!(shared.violations.load(Ordering::SeqCst), 0);
        prop_assert!(shared.entered.load(Ordering::SeqCst) >= blocking_holds);
        prop_assert_eq!(m.state(), MutexState::Unlocked);
        prop_assert!(kernel.is_idle());
    }
}
