//! Three threads at three priorities sharing one mutex.
//!
//! Run with `RUST_LOG=debug` to watch the scheduler's decisions.

use rtk_core::{CreateFlags, Priority};
use rtk_port_hosted::{leak_kernel, leak_stack, HostedKernel};
use rtk_threads::{KernelConfig, Mutex, ThreadEntry};

static SHARED: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

fn spawn(kernel: &'static HostedKernel, level: u8, name: &'static str) {
    let entry = ThreadEntry::boxed(move || {
        for _ in 0..2 {
            SHARED.lock(kernel).push(name);
            kernel.yield_now();
        }
    });
    match Priority::new(level) {
        Ok(priority) => {
            if let Err(err) = kernel.create(leak_stack(1024), priority, CreateFlags::WITHOUT_YIELD, entry) {
                eprintln!("cannot create {name}: {err}");
            }
        }
        Err(err) => eprintln!("{name}: {err}"),
    }
}

fn main() {
    env_logger::init();

    let kernel = leak_kernel(
        KernelConfig::builder()
            .name("demo")
            .owner_tracking(true)
            .idle_hook(|| log::info!("idle"))
            .build(),
    );
    spawn(kernel, 2, "low");
    spawn(kernel, 6, "mid");
    spawn(kernel, 10, "high");

    kernel.start();
    kernel.arch().run_until_idle(kernel);

    if let Some(order) = SHARED.try_lock(kernel) {
        println!("run order: {:?}", *order);
    }
}
