//! Initial stack frame of a new thread

use rtk_core::{KResult, KernelError, ThreadId};

/// `xPSR` with only the Thumb bit set
pub const XPSR_THUMB: u32 = 0x0100_0000;

/// Bytes of the initial frame: `r4`-`r11` below the hardware frame
/// `r0`-`r3`, `r12`, `lr`, `pc`, `xPSR`.
pub const FRAME_SIZE: usize = 16 * 4;

const STACK_ALIGN: usize = 8;

/// Lay out a frame at the top of `stack` that starts `pc(pid)` on the first
/// exception return, returning into `lr`. Returns the initial PSP.
pub(crate) fn initial(stack: &mut [u8], pid: ThreadId, pc: usize, lr: usize) -> KResult<usize> {
    let base = stack.as_ptr() as usize;
    let top = (base + stack.len()) & !(STACK_ALIGN - 1);
    let sp = top
        .checked_sub(FRAME_SIZE)
        .filter(|sp| *sp >= base)
        .ok_or(KernelError::StackTooSmall {
            size: stack.len(),
            min: FRAME_SIZE + STACK_ALIGN,
        })?;

    let mut words = [0u32; 16];
    // Software frame r4-r11 stays zero.
    words[8] = u32::from(pid.raw()); // r0
    words[13] = lr as u32;
    // Exception return requires an even PC.
    words[14] = (pc as u32) & !1;
    words[15] = XPSR_THUMB;

    let offset = sp - base;
    for (chunk, word) in stack[offset..offset + FRAME_SIZE]
        .chunks_exact_mut(4)
        .zip(words)
    {
        chunk.copy_from_slice(&word.to_ne_bytes());
    }
    Ok(sp)
}
