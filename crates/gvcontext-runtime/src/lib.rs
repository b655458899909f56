//! # gvcontext-runtime
//!
//! Platform-specific runtime implementation for GVContext.
//!
//! This crate provides:
//! - Stack regions (heap or mmap with guard page)
//! - Signal mask capture and switching
//! - Context switching (architecture-specific assembly)
//! - Context capture, build and switch operations

pub mod config;
pub mod memory;
pub mod signal;
pub mod arch;
pub mod tls;
pub mod context;
pub mod builder;
pub mod switch;

// Re-exports
pub use config::{ContextConfig, OrphanPolicy};
pub use memory::StackRegion;
pub use signal::SignalMask;
pub use context::ExecutionContext;
pub use builder::{build, ContextBuilder};
pub use switch::switch;

/// Is the calling frame's stack 16-byte aligned at its call sites?
///
/// Always true on targets without a switch implementation.
#[inline]
pub fn stack_is_aligned() -> bool {
    arch::stack_misalignment() == 0
}
