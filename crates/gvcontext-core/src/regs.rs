//! Saved register layouts
//!
//! These structures have fixed layouts (repr(C)) for direct access from the
//! switch assembly in `gvcontext-runtime::arch`. Only callee-saved state is
//! kept: a switch is an ordinary function call from the compiler's point of
//! view, so caller-saved registers are already spilled by the caller.

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        pub use self::x86_64::SavedRegs;
    } else if #[cfg(target_arch = "aarch64")] {
        pub use self::aarch64::SavedRegs;
    } else {
        /// Placeholder on architectures without a switch implementation
        #[repr(C)]
        #[derive(Debug, Default, Clone)]
        pub struct SavedRegs {
            _unused: u64,
        }
    }
}

pub mod x86_64 {
    /// Default MXCSR: all exceptions masked, round-to-nearest
    pub const DEFAULT_MXCSR: u32 = 0x1F80;

    /// Default x87 control word: extended precision, exceptions masked
    pub const DEFAULT_FPUCW: u16 = 0x037F;

    /// Callee-saved registers per System V AMD64 ABI
    ///
    /// Layout (offsets are stable for ASM access):
    /// ```text
    /// 0x00: rsp
    /// 0x08: rip     - resume address
    /// 0x10: rbx
    /// 0x18: rbp
    /// 0x20: r12     - context pointer for a fresh context
    /// 0x28: r13
    /// 0x30: r14
    /// 0x38: r15
    /// 0x40: mxcsr   (u32)
    /// 0x44: fpucw   (u16)
    /// ```
    #[repr(C)]
    #[derive(Debug, Clone)]
    pub struct SavedRegs {
        pub rsp: u64,
        pub rip: u64,
        pub rbx: u64,
        pub rbp: u64,
        pub r12: u64,
        pub r13: u64,
        pub r14: u64,
        pub r15: u64,
        pub mxcsr: u32,
        pub fpucw: u16,
        _pad: u16,
    }

    impl Default for SavedRegs {
        fn default() -> Self {
            Self {
                rsp: 0,
                rip: 0,
                rbx: 0,
                rbp: 0,
                r12: 0,
                r13: 0,
                r14: 0,
                r15: 0,
                mxcsr: DEFAULT_MXCSR,
                fpucw: DEFAULT_FPUCW,
                _pad: 0,
            }
        }
    }

    const _: () = assert!(core::mem::size_of::<SavedRegs>() == 0x48);
    const _: () = assert!(core::mem::offset_of!(SavedRegs, r12) == 0x20);
    const _: () = assert!(core::mem::offset_of!(SavedRegs, mxcsr) == 0x40);
    const _: () = assert!(core::mem::offset_of!(SavedRegs, fpucw) == 0x44);
}

pub mod aarch64 {
    /// Callee-saved registers per AAPCS64
    ///
    /// Layout (offsets are stable for ASM access):
    /// ```text
    /// 0x00: sp
    /// 0x08: pc       - resume address
    /// 0x10: x19..x28 - x19 holds the context pointer for a fresh context
    /// 0x60: x29 (fp)
    /// 0x68: x30 (lr)
    /// 0x70: d8..d15  - low 64 bits only, per ABI
    /// ```
    #[repr(C)]
    #[derive(Debug, Default, Clone)]
    pub struct SavedRegs {
        pub sp: u64,
        pub pc: u64,
        pub x19_x28: [u64; 10],
        pub fp: u64,
        pub lr: u64,
        pub d8_d15: [u64; 8],
    }

    const _: () = assert!(core::mem::size_of::<SavedRegs>() == 0xB0);
    const _: () = assert!(core::mem::offset_of!(SavedRegs, fp) == 0x60);
    const _: () = assert!(core::mem::offset_of!(SavedRegs, d8_d15) == 0x70);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saved_regs_default_is_zeroed_state() {
        let regs = x86_64::SavedRegs::default();
        assert_eq!(regs.rsp, 0);
        assert_eq!(regs.rip, 0);
        assert_eq!(regs.mxcsr, x86_64::DEFAULT_MXCSR);
        assert_eq!(regs.fpucw, x86_64::DEFAULT_FPUCW);

        let regs = aarch64::SavedRegs::default();
        assert_eq!(regs.sp, 0);
        assert!(regs.x19_x28.iter().all(|&r| r == 0));
    }

    #[test]
    fn test_layout_sizes() {
        assert_eq!(core::mem::size_of::<x86_64::SavedRegs>(), 0x48);
        assert_eq!(core::mem::size_of::<aarch64::SavedRegs>(), 0xB0);
    }
}
