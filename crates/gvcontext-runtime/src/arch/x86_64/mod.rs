//! x86_64 context switching implementation (System V AMD64)
//!
//! Saved state is the callee-saved set: rsp, rbx, rbp, r12-r15, plus the
//! MXCSR and x87 control words. Everything else is caller-saved and already
//! spilled by the compiler around the `context_switch` call.

use crate::context::ContextInner;
use gvcontext_core::regs::x86_64::{SavedRegs, DEFAULT_FPUCW, DEFAULT_MXCSR};
use std::arch::naked_asm;

/// Initialize a built context's registers
///
/// The first switch into the context lands in `context_trampoline` with
/// rsp at the 16-byte aligned stack top and the context pointer in r12.
/// Nothing is written to the stack here; the trampoline's `call` pushes the
/// first word just below the top.
///
/// # Safety
///
/// `regs` must point to valid SavedRegs memory. `stack_top` must be the top
/// of a writable stack.
#[inline]
pub unsafe fn init_context(regs: *mut SavedRegs, stack_top: *mut u8, ctx: *const ContextInner) {
    let aligned_sp = (stack_top as usize) & !0xF;

    let regs = &mut *regs;
    regs.rsp = aligned_sp as u64;
    regs.rip = context_trampoline as usize as u64;
    regs.rbx = 0;
    regs.rbp = 0; // terminates frame-pointer walks
    regs.r12 = ctx as usize as u64;
    regs.r13 = 0;
    regs.r14 = 0;
    regs.r15 = 0;
    regs.mxcsr = DEFAULT_MXCSR;
    regs.fpucw = DEFAULT_FPUCW;
}

/// First frame of every built context
///
/// Entered by `jmp` with rsp 16-byte aligned, so the `call` leaves the
/// callee with the ABI entry alignment (rsp + 8 aligned). The entry never
/// returns: it falls through to the successor or terminates the process.
#[unsafe(naked)]
pub unsafe extern "C" fn context_trampoline() {
    naked_asm!(
        "mov rdi, r12",
        "call {entry}",
        "ud2",
        entry = sym crate::switch::context_entry,
    );
}

/// Save the running context into `old` and resume `new`
///
/// Returns when some later switch resumes `old`.
#[unsafe(naked)]
pub unsafe extern "C" fn context_switch(_old: *mut SavedRegs, _new: *const SavedRegs) {
    naked_asm!(
        // Save callee-saved registers to old (RDI)
        "mov [rdi + 0x00], rsp",
        "lea rax, [rip + 2f]",
        "mov [rdi + 0x08], rax",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], rbp",
        "mov [rdi + 0x20], r12",
        "mov [rdi + 0x28], r13",
        "mov [rdi + 0x30], r14",
        "mov [rdi + 0x38], r15",
        "stmxcsr dword ptr [rdi + 0x40]",
        "fnstcw word ptr [rdi + 0x44]",
        // Load callee-saved registers from new (RSI)
        "mov rsp, [rsi + 0x00]",
        "mov rbx, [rsi + 0x10]",
        "mov rbp, [rsi + 0x18]",
        "mov r12, [rsi + 0x20]",
        "mov r13, [rsi + 0x28]",
        "mov r14, [rsi + 0x30]",
        "mov r15, [rsi + 0x38]",
        "ldmxcsr dword ptr [rsi + 0x40]",
        "fldcw word ptr [rsi + 0x44]",
        // Jump to the resume address
        "jmp qword ptr [rsi + 0x08]",
        // Resume point for a saved context
        "2:",
        "ret",
    );
}

/// Misalignment of the caller's stack at the call site (0 when aligned)
///
/// At entry rsp points at the return address, so rsp + 8 is the caller's
/// stack pointer before the `call`.
#[unsafe(naked)]
pub extern "C" fn stack_misalignment() -> usize {
    naked_asm!(
        "lea rax, [rsp + 8]",
        "and rax, 15",
        "ret",
    );
}
