#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use rtk_core::{CreateFlags, Priority, ThreadId};
use rtk_port_hosted::{leak_kernel, leak_stack, HostedKernel};
use rtk_threads::{KernelConfig, RawMutex, ThreadEntry};

pub fn kernel() -> &'static HostedKernel {
    let _ = env_logger::builder().is_test(true).try_init();
    leak_kernel(KernelConfig::builder().name("test").build())
}

pub fn spawn(
    kernel: &'static HostedKernel,
    level: u8,
    flags: CreateFlags,
    f: impl FnOnce() + Send + 'static,
) -> ThreadId {
    kernel
        .create(
            leak_stack(256),
            Priority::new(level).unwrap(),
            flags,
            ThreadEntry::boxed(f),
        )
        .unwrap()
}

pub fn run(kernel: &'static HostedKernel) {
    kernel.arch().run_until_idle(kernel);
}

pub fn leak_mutex(mutex: RawMutex) -> &'static RawMutex {
    Box::leak(Box::new(mutex))
}

/// Ordered record of what the threads did
#[derive(Clone, Default)]
pub struct Trace(Arc<Mutex<Vec<&'static str>>>);

impl Trace {
    pub fn push(&self, event: &'static str) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }
}
