//! PID space tests for rtk-core

use proptest::prelude::*;
use rtk_core::{
    KernelPid, ThreadId, KERNEL_PID_FIRST, KERNEL_PID_ISR, KERNEL_PID_LAST, KERNEL_PID_UNDEF,
    PRI_KERNEL_PID, THREADS_NUMOF,
};

#[test]
fn test_pid_constants() {
    assert_eq!(KERNEL_PID_FIRST, 0);
    assert_eq!(KERNEL_PID_LAST, THREADS_NUMOF as KernelPid);
    assert_eq!(KERNEL_PID_UNDEF, KERNEL_PID_LAST);
    assert_eq!(KERNEL_PID_ISR, KERNEL_PID_UNDEF);
    assert_eq!(PRI_KERNEL_PID, "d");
}

#[test]
fn test_thread_id_display() {
    let id = ThreadId::new(9).unwrap();
    assert_eq!(id.to_string(), "9");
}

#[test]
fn test_undef_never_maps_to_a_slot() {
    assert_eq!(ThreadId::from_pid(KERNEL_PID_UNDEF), None);
    assert_eq!(ThreadId::from_pid(KERNEL_PID_ISR), None);
}

proptest! {
    #[test]
    fn pid_round_trip(raw in 0u8..THREADS_NUMOF as u8) {
        let id = ThreadId::new(raw).unwrap();
        let pid = ThreadId::to_pid(Some(id));
        prop_assert!(pid >= KERNEL_PID_FIRST && pid < KERNEL_PID_LAST);
        prop_assert_eq!(ThreadId::from_pid(pid), Some(id));
    }

    #[test]
    fn foreign_pids_are_rejected(pid in any::<i16>()) {
        let inside = pid >= KERNEL_PID_FIRST && pid < KERNEL_PID_LAST;
        prop_assert_eq!(ThreadId::from_pid(pid).is_some(), inside);
    }
}
