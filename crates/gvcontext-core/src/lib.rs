//! # gvcontext-core
//!
//! Core types for GVContext user-space context switching.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! Stacks, signal masks and the switch assembly live in `gvcontext-runtime`.
//!
//! ## Modules
//!
//! - `id` - Context identifier type
//! - `state` - Context lifecycle state
//! - `regs` - Saved register layouts (repr(C))
//! - `entry` - Entry function + bound argument list
//! - `error` - Error types
//! - `kprint` - Kernel-style debug printing macros
//! - `env` - Environment variable utilities

pub mod id;
pub mod state;
pub mod regs;
pub mod entry;
pub mod error;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use id::ContextId;
pub use state::ContextState;
pub use regs::SavedRegs;
pub use entry::{EntryArgs, EntryBinding, EntryFn};
pub use error::{
    AllocationError, ContextError, ContextResult, InvalidContextError, SwitchError,
};
pub use env::{env_get, env_get_bool, env_get_size, env_get_str};

/// Constants for stack layout
pub mod constants {
    /// Minimum stack alignment required by the x86_64 and aarch64 ABIs
    pub const STACK_ALIGN: usize = 16;

    /// Smallest stack region accepted by `StackRegion::allocate`
    pub const MIN_STACK_SIZE: usize = 4096;

    /// Default stack size for `StackRegion::with_default_size`
    pub const DEFAULT_STACK_SIZE: usize = 256 * 1024;

    /// Guard page size (4 KB)
    pub const GUARD_SIZE: usize = 4096;

    /// Byte written over unused stack by the probe tooling
    pub const POISON_BYTE: u8 = 0x55;
}
