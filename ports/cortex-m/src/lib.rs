#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

//! rtk port for ARMv7-M and ARMv8-M Mainline
//!
//! Threads run in thread mode on the process stack (PSP); the kernel, the
//! interrupt handlers and the idle loop run on the main stack. A context
//! switch is always taken in `PendSV`, configured as the least urgent
//! exception, so it happens once every other handler has returned.
//!
//! A thread's saved context is its PSP. Below it lie the callee-saved
//! registers `r4`-`r11` pushed by `PendSV`, and below those the frame the
//! hardware stacked on exception entry. Floating-point registers are not
//! saved: threads must not use the FPU.
//!
//! ```rust,ignore
//! use rtk_port_cortex_m::{CortexM, CortexMKernel};
//!
//! static KERNEL: CortexMKernel = CortexMKernel::new(CortexM::new());
//!
//! #[cortex_m_rt::entry]
//! fn main() -> ! {
//!     KERNEL.create(stack, priority, CreateFlags::empty(), entry).ok();
//!     KERNEL.start();
//!     unreachable!()
//! }
//! ```

mod frame;

use core::arch::global_asm;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use cortex_m::asm;
use cortex_m::peripheral::scb::{SystemHandler, VectActive};
use cortex_m::peripheral::SCB;
use log::{debug, trace};
use rtk_core::{KResult, ThreadId};
use rtk_threads::{Arch, Kernel};

// Links the vector table that routes the `PendSV` exception to the handler
// defined below.
use cortex_m_rt as _;

pub use frame::{FRAME_SIZE, XPSR_THUMB};

/// Kernel type driven by this port
pub type CortexMKernel = Kernel<CortexM>;

static KERNEL: AtomicPtr<CortexMKernel> = AtomicPtr::new(ptr::null_mut());

fn register(kernel: &'static CortexMKernel) {
    KERNEL.store(ptr::from_ref(kernel).cast_mut(), Ordering::Release);
}

fn kernel() -> Option<&'static CortexMKernel> {
    let kernel = KERNEL.load(Ordering::Acquire);
    // SAFETY: only ever set from a `&'static CortexMKernel`.
    unsafe { kernel.as_ref() }
}

/// Cortex-M architecture port
#[derive(Debug, Default)]
pub struct CortexM {
    _private: (),
}

impl CortexM {
    pub const fn new() -> Self {
        Self { _private: () }
    }
}

impl Arch for CortexM {
    type Context = usize;

    const MIN_STACK_SIZE: usize = 256;

    fn prepare(
        &self,
        kernel: &'static Kernel<Self>,
        pid: ThreadId,
        stack: &'static mut [u8],
    ) -> KResult<usize> {
        register(kernel);
        let psp = frame::initial(stack, pid, thread_trampoline as usize, thread_exit_trap as usize)?;
        trace!("pid {pid} initial psp {psp:#010x}");
        Ok(psp)
    }

    fn in_interrupt(&self) -> bool {
        SCB::vect_active() != VectActive::ThreadMode
    }

    /// PRIMASK set in thread mode: `PendSV` cannot be taken until the
    /// application unmasks interrupts again.
    fn in_critical_section(&self) -> bool {
        cortex_m::register::primask::read().is_inactive()
    }

    fn pend_switch(&self, _kernel: &'static Kernel<Self>) {
        SCB::set_pendsv();
    }

    fn safe_point(&self, kernel: &'static Kernel<Self>) {
        if kernel.switch_pending() {
            SCB::set_pendsv();
            // Take the exception before the next instruction.
            asm::dsb();
            asm::isb();
        }
    }

    fn start(&self, kernel: &'static Kernel<Self>) {
        register(kernel);
        // SAFETY: PendSV at the lowest urgency cannot break any priority
        // based critical section of the application.
        unsafe {
            let mut peripherals = cortex_m::Peripherals::steal();
            peripherals.SCB.set_priority(SystemHandler::PendSV, 0xFF);
        }
        // `PendSV` reads a zero PSP as "no thread to save".
        // SAFETY: thread mode still runs on the main stack.
        unsafe { cortex_m::register::psp::write(0) };
        debug!("dispatching first thread");
        SCB::set_pendsv();
        asm::dsb();
        asm::isb();
        loop {
            asm::wfi();
        }
    }
}

/// First code a thread executes; `pid` arrives in `r0`.
extern "C" fn thread_trampoline(pid: u32) -> ! {
    if let Some(kernel) = kernel() {
        kernel.run_thread(ThreadId::new_unchecked(pid as u8));
    }
    // `run_thread` hands the CPU on for good once the thread has exited.
    thread_exit_trap()
}

extern "C" fn thread_exit_trap() -> ! {
    loop {
        asm::wfi();
    }
}

/// Rust half of `PendSV`.
///
/// `psp` is the outgoing thread's stack pointer after `r4`-`r11` were
/// pushed, or zero if no thread ran yet. Returns the stack pointer to
/// restore them from. Idles with `wfi` until a thread is ready.
#[no_mangle]
extern "C" fn rtk_pendsv_entry(psp: usize) -> usize {
    let Some(kernel) = kernel() else {
        return psp;
    };
    loop {
        let next = critical_section::with(|cs| {
            let switch = kernel.reschedule(cs);
            if let Some(prev) = switch.prev {
                if psp != 0 {
                    kernel.with_context(cs, prev, |saved| *saved = psp);
                }
            }
            switch
                .next
                .and_then(|pid| kernel.with_context(cs, pid, |saved| *saved))
        });
        if let Some(next) = next {
            return next;
        }
        if let Some(hook) = kernel.config().idle_hook {
            hook();
        }
        asm::wfi();
    }
}

global_asm! {"
    .section .text.PendSV
    .globl PendSV
    .type PendSV,function
    .thumb_func
    PendSV:
        mrs r0, psp
        cbz r0, 1f
        stmdb r0!, {{r4-r11}}
    1:
        bl rtk_pendsv_entry
        ldmia r0!, {{r4-r11}}
        msr psp, r0
        ldr lr, =0xFFFFFFFD
        bx lr
"}
