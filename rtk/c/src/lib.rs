#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![allow(non_camel_case_types, non_upper_case_globals)]

//! # rtk C binding
//!
//! The names, layouts and numeric conventions C code expects from the
//! kernel: `mutex_t` storage with its initialisers, `thread_create` and the
//! thread helpers, PID constants and creation flags.
//!
//! The binding drives a single kernel, registered once at boot with
//! [`install`]. Priorities cross this border on the C scale, where `0` is
//! the most urgent level; see [`rtk_core::Priority::from_external`].

mod binding;
pub mod mutex;
pub mod thread;

use core::ffi::c_int;

#[cfg(test)]
use rtk_port_hosted as _;

pub use binding::{install, is_installed, Binding};
pub use mutex::*;
pub use thread::*;

pub use rtk_core::{KERNEL_PID_FIRST, KERNEL_PID_ISR, KERNEL_PID_LAST, KERNEL_PID_UNDEF};
use rtk_core::{KernelError, PRI_KERNEL_PID};

/// PID as seen by C code
pub type kernel_pid_t = rtk_core::KernelPid;

/// printf conversion for [`kernel_pid_t`], used as `"%" PRIkernel_pid`
pub const PRIkernel_pid: &str = PRI_KERNEL_PID;

pub const THREADS_NUMOF: u32 = rtk_core::THREADS_NUMOF as u32;
pub const SCHED_PRIO_LEVELS: u32 = rtk_core::SCHED_PRIO_LEVELS as u32;

/// Invalid argument
pub const EINVAL: c_int = 22;
/// No thread control block left
pub const EOVERFLOW: c_int = 75;

/// Negative errno reported to C for a kernel error.
pub const fn errno_of(err: KernelError) -> c_int {
    match err {
        KernelError::TableFull => -EOVERFLOW,
        KernelError::InvalidPriority(_)
        | KernelError::StackTooSmall { .. }
        | KernelError::InvalidPid(_)
        | KernelError::NotZombie(_)
        | KernelError::NotOwner
        | KernelError::NotLocked
        | KernelError::Context => -EINVAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtk_core::{Priority, ThreadId};

    #[test]
    fn errno_values() {
        assert_eq!(errno_of(KernelError::TableFull), -EOVERFLOW);
        assert_eq!(errno_of(KernelError::InvalidPriority(40)), -EINVAL);
        assert_eq!(
            errno_of(KernelError::StackTooSmall { size: 8, min: 64 }),
            -EINVAL
        );
        assert_eq!(
            errno_of(KernelError::InvalidPid(ThreadId::new_unchecked(3))),
            -EINVAL
        );
    }

    #[test]
    fn exported_limits_match_the_kernel() {
        assert_eq!(THREADS_NUMOF as usize, rtk_core::THREADS_NUMOF);
        assert_eq!(SCHED_PRIO_LEVELS as usize, rtk_core::SCHED_PRIO_LEVELS);
        assert_eq!(PRIkernel_pid, "d");
        assert_eq!(KERNEL_PID_UNDEF, THREADS_NUMOF as kernel_pid_t);
    }

    #[test]
    fn c_priority_zero_is_most_urgent() {
        let top = Priority::from_external(0).unwrap();
        let bottom = Priority::from_external(SCHED_PRIO_LEVELS as u8 - 1).unwrap();
        assert!(top.outranks(bottom));
        assert_eq!(top, Priority::HIGHEST);
        assert_eq!(bottom, Priority::LOWEST);
        assert!(Priority::from_external(SCHED_PRIO_LEVELS as u8).is_err());
    }
}
