#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

//! # rtk threads
//!
//! The kernel proper: thread control blocks, the PID allocator, the
//! priority scheduler, the blocking mutex and the critical-section guard
//! that orders every mutation of their state.
//!
//! Threads run at fixed priorities. The most urgent ready thread always
//! runs; equal priorities never preempt each other. Only [`Kernel::lock`]
//! suspends a thread involuntarily; `sleep`, `yield_now` and `zombify`
//! give the CPU up on request.
//!
//! Register swapping belongs to an [`Arch`] port. The kernel raises a
//! pending switch and the port takes it at a safe point.

#[cfg(feature = "alloc")]
extern crate alloc;

// Host tests take their critical sections from the hosted port.
#[cfg(test)]
use rtk_port_hosted as _;

pub mod config;
pub mod critical;
pub mod kernel;
pub mod mutex;
pub mod pid;
pub mod scheduler;
pub mod switch;
pub mod sync;
pub mod tcb;

pub use config::{KernelConfig, KernelConfigBuilder};
pub use critical::CriticalSectionGuard;
pub use kernel::Kernel;
pub use mutex::{MutexState, RawMutex};
pub use pid::PidAllocator;
pub use scheduler::{Release, Scheduler, Switch};
pub use switch::Arch;
pub use sync::{Mutex, MutexGuard};
pub use tcb::{StackInfo, Thread, ThreadEntry, ThreadState, STACK_PAINT};

pub use rtk_core::{
    CreateFlags, KResult, KernelError, Priority, ThreadId, SCHED_PRIO_LEVELS, THREADS_NUMOF,
};
