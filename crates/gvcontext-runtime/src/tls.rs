//! Thread-local current-context tracking
//!
//! Each OS thread has at most one active context. Before the thread's root
//! flow has been saved into a context nothing is tracked (null).

use crate::context::ContextInner;
use gvcontext_core::id::ContextId;
use gvcontext_core::kprint;
use std::cell::Cell;

thread_local! {
    /// Context currently executing on this thread
    static CURRENT: Cell<*const ContextInner> = const { Cell::new(std::ptr::null()) };
}

/// Record `ctx` as the running context
#[inline]
pub(crate) fn set_current(ctx: *const ContextInner, id: ContextId) {
    CURRENT.with(|cell| cell.set(ctx));
    kprint::set_context_tag(id.as_u64());
}

/// Running context, null when untracked
#[inline]
pub(crate) fn current() -> *const ContextInner {
    CURRENT.with(|cell| cell.get())
}

/// Forget the running context if it is `ctx` (it is being dropped)
#[inline]
pub(crate) fn forget(ctx: *const ContextInner) {
    CURRENT.with(|cell| {
        if cell.get() == ctx {
            cell.set(std::ptr::null());
            kprint::set_context_tag(0);
        }
    });
}

/// Check if a tracked context is running on this thread
#[inline]
pub fn in_context() -> bool {
    !current().is_null()
}
