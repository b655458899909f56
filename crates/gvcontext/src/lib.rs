//! # gvcontext - user-space execution contexts
//!
//! Capture the running flow of control, build new contexts that run an entry
//! function on their own stack, and switch between them.
//!
//! ## Quick Start
//!
//! ```no_run
//! use gvcontext::{capture, ContextBuilder, ExecutionContext, StackRegion};
//!
//! fn cf(a: i32, b: i32) {
//!     assert_eq!((a, b), (78, 274));
//! }
//!
//! fn main() -> Result<(), gvcontext::ContextError> {
//!     let main_ctx = capture()?;
//!     let mut ctx = ExecutionContext::new();
//!
//!     ContextBuilder::new()
//!         .stack(StackRegion::allocate(64 * 1024, 16)?)
//!         .successor(&main_ctx)
//!         .entry_with_args(cf, (78, 274))
//!         .build(&mut ctx)?;
//!
//!     // Runs cf on the new stack, then falls through back here.
//!     unsafe { gvcontext::switch(&main_ctx, &ctx)? };
//!     Ok(())
//! }
//! ```
//!
//! ## Layout
//!
//! ```text
//!    capture()         ContextBuilder::build()        switch(save, resume)
//!        │                       │                            │
//!        ▼                       ▼                            ▼
//!  ┌────────────────────────────────────────────────────────────────────┐
//!  │                        ExecutionContext                            │
//!  │   saved registers · signal mask · successor · stack · entry        │
//!  └────────────────────────────────────────────────────────────────────┘
//!        │                       │                            │
//!        ▼                       ▼                            ▼
//!    SignalMask             StackRegion               arch::context_switch
//!  (pthread_sigmask)   (heap or mmap + guard)       (x86_64 / aarch64 asm)
//! ```

// Re-export core types
pub use gvcontext_core::{
    AllocationError,
    ContextError,
    ContextId,
    ContextResult,
    ContextState,
    EntryArgs,
    EntryBinding,
    EntryFn,
    InvalidContextError,
    SwitchError,
};

// Re-export kprint macros for debug logging
pub use gvcontext_core::{kprintln, kerror, kwarn, kinfo, kdebug, ktrace};
pub use gvcontext_core::kprint::{LogLevel, init as init_logging, set_log_level, set_flush_enabled};

// Re-export env utilities
pub use gvcontext_core::{env_get, env_get_bool, env_get_size, env_get_str};
pub use gvcontext_core::constants;

// Re-export runtime types
pub use gvcontext_runtime::{
    build,
    config,
    switch,
    ContextBuilder,
    ContextConfig,
    ExecutionContext,
    OrphanPolicy,
    SignalMask,
    StackRegion,
};

/// Snapshot the calling flow
///
/// See [`ExecutionContext::capture`].
#[inline]
pub fn capture() -> ContextResult<ExecutionContext> {
    ExecutionContext::capture()
}

/// Is context switching implemented for this target?
#[inline]
pub fn is_supported() -> bool {
    gvcontext_runtime::arch::SUPPORTED
}

/// Check if a tracked context is running on this thread
#[inline]
pub fn in_context() -> bool {
    gvcontext_runtime::tls::in_context()
}

/// Is the caller's stack ABI-aligned?
#[inline]
pub fn stack_is_aligned() -> bool {
    gvcontext_runtime::stack_is_aligned()
}
