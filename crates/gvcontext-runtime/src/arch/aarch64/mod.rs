//! aarch64 context switching implementation (AAPCS64)
//!
//! Saved state: sp, x19-x28, fp, lr and the low halves of d8-d15.

use crate::context::ContextInner;
use gvcontext_core::regs::aarch64::SavedRegs;
use std::arch::naked_asm;

/// Initialize a built context's registers
///
/// The first switch branches to `context_trampoline` with sp at the 16-byte
/// aligned stack top and the context pointer in x19.
///
/// # Safety
///
/// `regs` must point to valid SavedRegs memory. `stack_top` must be the top
/// of a writable stack.
#[inline]
pub unsafe fn init_context(regs: *mut SavedRegs, stack_top: *mut u8, ctx: *const ContextInner) {
    let regs = &mut *regs;
    *regs = SavedRegs::default();
    regs.sp = ((stack_top as usize) & !0xF) as u64;
    regs.pc = context_trampoline as usize as u64;
    regs.x19_x28[0] = ctx as usize as u64;
}

/// First frame of every built context
#[unsafe(naked)]
pub unsafe extern "C" fn context_trampoline() {
    naked_asm!(
        "mov x0, x19",
        "bl {entry}",
        "brk #0x1",
        entry = sym crate::switch::context_entry,
    );
}

/// Save the running context into `old` and resume `new`
#[unsafe(naked)]
pub unsafe extern "C" fn context_switch(_old: *mut SavedRegs, _new: *const SavedRegs) {
    naked_asm!(
        // Save to old (x0)
        "mov x9, sp",
        "str x9, [x0, #0x00]",
        "adr x10, 2f",
        "str x10, [x0, #0x08]",
        "stp x19, x20, [x0, #0x10]",
        "stp x21, x22, [x0, #0x20]",
        "stp x23, x24, [x0, #0x30]",
        "stp x25, x26, [x0, #0x40]",
        "stp x27, x28, [x0, #0x50]",
        "stp x29, x30, [x0, #0x60]",
        "stp d8, d9, [x0, #0x70]",
        "stp d10, d11, [x0, #0x80]",
        "stp d12, d13, [x0, #0x90]",
        "stp d14, d15, [x0, #0xa0]",
        // Load from new (x1)
        "ldr x9, [x1, #0x00]",
        "mov sp, x9",
        "ldr x10, [x1, #0x08]",
        "ldp x19, x20, [x1, #0x10]",
        "ldp x21, x22, [x1, #0x20]",
        "ldp x23, x24, [x1, #0x30]",
        "ldp x25, x26, [x1, #0x40]",
        "ldp x27, x28, [x1, #0x50]",
        "ldp x29, x30, [x1, #0x60]",
        "ldp d8, d9, [x1, #0x70]",
        "ldp d10, d11, [x1, #0x80]",
        "ldp d12, d13, [x1, #0x90]",
        "ldp d14, d15, [x1, #0xa0]",
        "br x10",
        // Resume point for a saved context
        "2:",
        "ret",
    );
}

/// Misalignment of the caller's stack (0 when aligned)
#[unsafe(naked)]
pub extern "C" fn stack_misalignment() -> usize {
    naked_asm!(
        "mov x0, sp",
        "and x0, x0, #15",
        "ret",
    );
}
