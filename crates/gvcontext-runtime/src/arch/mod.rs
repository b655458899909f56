//! Architecture-specific context switching
//!
//! Each backend provides the same four items:
//!
//! - `init_context` - prepare saved registers so the first switch enters
//!   the trampoline on a fresh stack
//! - `context_switch` - save callee-saved state into `old`, load `new`, jump
//! - `context_trampoline` - first frame of every built context
//! - `stack_misalignment` - leaf probe reporting the caller's stack alignment

cfg_if::cfg_if! {
    if #[cfg(all(unix, target_arch = "x86_64"))] {
        pub mod x86_64;
        pub use self::x86_64::*;

        /// Switching is implemented for this target
        pub const SUPPORTED: bool = true;
    } else if #[cfg(all(unix, target_arch = "aarch64"))] {
        pub mod aarch64;
        pub use self::aarch64::*;

        /// Switching is implemented for this target
        pub const SUPPORTED: bool = true;
    } else {
        use crate::context::ContextInner;
        use gvcontext_core::regs::SavedRegs;

        /// Switching is implemented for this target
        pub const SUPPORTED: bool = false;

        // Unreachable: capture() reports UnsupportedPlatform first.
        pub unsafe fn init_context(
            _regs: *mut SavedRegs,
            _stack_top: *mut u8,
            _ctx: *const ContextInner,
        ) {
        }

        pub unsafe extern "C" fn context_switch(_old: *mut SavedRegs, _new: *const SavedRegs) {
            std::process::abort()
        }

        pub extern "C" fn stack_misalignment() -> usize {
            0
        }
    }
}
