//! Execution contexts
//!
//! An `ExecutionContext` is a handle to a heap-allocated record holding the
//! saved registers, signal mask, successor link, bound stack and entry of one
//! flow of control. The record never moves, so the switch assembly, the
//! trampoline and successor links can refer to it by address while the
//! handle itself is moved around freely.

use crate::arch;
use crate::config;
use crate::memory::StackRegion;
use crate::signal::{self, SignalMask};
use crate::tls;
use gvcontext_core::entry::EntryBinding;
use gvcontext_core::error::{ContextError, ContextResult, InvalidContextError};
use gvcontext_core::id::ContextId;
use gvcontext_core::regs::SavedRegs;
use gvcontext_core::state::ContextState;
use gvcontext_core::kdebug;
use std::cell::{Cell, UnsafeCell};
use std::fmt;
use std::ptr::NonNull;
use std::rc::{Rc, Weak};

/// Non-owning link to a successor record
///
/// Goes dead when the successor is dropped, so a stale link is never
/// followed.
#[derive(Clone)]
pub(crate) struct SuccessorLink {
    target: NonNull<ContextInner>,
    alive: Weak<()>,
}

impl SuccessorLink {
    pub(crate) fn to(successor: &ExecutionContext) -> Self {
        Self {
            target: successor.inner,
            alive: Rc::downgrade(&successor.inner().liveness),
        }
    }

    /// Linked record, unless it has been dropped
    #[inline]
    pub(crate) fn target(&self) -> Option<NonNull<ContextInner>> {
        (self.alive.strong_count() > 0).then_some(self.target)
    }
}

/// Context record shared with the switch assembly
pub struct ContextInner {
    pub(crate) id: ContextId,
    pub(crate) regs: UnsafeCell<SavedRegs>,
    pub(crate) state: Cell<ContextState>,
    pub(crate) mask: Cell<Option<SignalMask>>,
    pub(crate) successor: Cell<Option<SuccessorLink>>,
    pub(crate) entry: Cell<Option<EntryBinding>>,
    pub(crate) stack: Cell<Option<StackRegion>>,
    pub(crate) captured_sp: Cell<usize>,
    pub(crate) resumptions: Cell<u64>,
    liveness: Rc<()>,
}

impl ContextInner {
    fn new(state: ContextState) -> Self {
        Self {
            id: ContextId::next(),
            regs: UnsafeCell::new(SavedRegs::default()),
            state: Cell::new(state),
            mask: Cell::new(None),
            successor: Cell::new(None),
            entry: Cell::new(None),
            stack: Cell::new(None),
            captured_sp: Cell::new(0),
            resumptions: Cell::new(0),
            liveness: Rc::new(()),
        }
    }

    /// Live successor record, if any
    pub(crate) fn successor(&self) -> Option<NonNull<ContextInner>> {
        let link = self.successor.take();
        let target = link.as_ref().and_then(SuccessorLink::target);
        self.successor.set(link);
        target
    }

    /// Run `f` on the bound stack, if any
    pub(crate) fn with_stack<R>(&self, f: impl FnOnce(Option<&StackRegion>) -> R) -> R {
        let stack = self.stack.take();
        let out = f(stack.as_ref());
        self.stack.set(stack);
        out
    }
}

/// Opaque snapshot of a flow of control
///
/// Not `Send`: a context belongs to the OS thread whose stack and signal
/// mask it describes.
pub struct ExecutionContext {
    inner: NonNull<ContextInner>,
}

impl ExecutionContext {
    /// Freshly declared context, holding nothing
    pub fn new() -> Self {
        Self::with_state(ContextState::Unbound)
    }

    fn with_state(state: ContextState) -> Self {
        let inner = Box::new(ContextInner::new(state));
        Self {
            // SAFETY: Box::into_raw never returns null.
            inner: unsafe { NonNull::new_unchecked(Box::into_raw(inner)) },
        }
    }

    /// Snapshot the calling flow
    ///
    /// Records the thread's signal mask and stack pointer. The register set
    /// is written by the first switch that saves into this context, which
    /// is also the point execution resumes at.
    ///
    /// Fails with `UnsupportedPlatform` when this target has no switch
    /// implementation or the kernel lacks signal-mask support.
    pub fn capture() -> ContextResult<Self> {
        if !arch::SUPPORTED {
            return Err(ContextError::UnsupportedPlatform);
        }

        let mask = signal::current_mask()?;
        let ctx = Self::with_state(ContextState::Captured);
        let inner = ctx.inner();
        inner.mask.set(Some(mask));

        let marker = 0u8;
        inner.captured_sp.set(&marker as *const u8 as usize);

        if config::current().debug_logging {
            kdebug!("captured context {} (sp {:#x})", inner.id, inner.captured_sp.get());
        }
        Ok(ctx)
    }

    #[inline]
    pub(crate) fn inner(&self) -> &ContextInner {
        // SAFETY: the record lives until this handle is dropped.
        unsafe { self.inner.as_ref() }
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *const ContextInner {
        self.inner.as_ptr()
    }

    #[inline]
    pub fn id(&self) -> ContextId {
        self.inner().id
    }

    #[inline]
    pub fn state(&self) -> ContextState {
        self.inner().state.get()
    }

    /// Is this the context running on the calling thread?
    #[inline]
    pub fn is_current(&self) -> bool {
        tls::current() == self.as_ptr()
    }

    /// Stack pointer observed by `capture` (0 for other contexts)
    #[inline]
    pub fn captured_stack_pointer(&self) -> usize {
        self.inner().captured_sp.get()
    }

    /// Number of times control has been transferred into this context
    #[inline]
    pub fn resumptions(&self) -> u64 {
        self.inner().resumptions.get()
    }

    #[inline]
    pub fn has_successor(&self) -> bool {
        self.inner().successor().is_some()
    }

    #[inline]
    pub fn has_stack(&self) -> bool {
        self.inner().with_stack(|s| s.is_some())
    }

    /// Initial stack pointer of the bound stack
    pub fn stack_top(&self) -> Option<*mut u8> {
        self.inner().with_stack(|s| s.map(StackRegion::top_pointer))
    }

    /// Link the context to resume when this one's entry returns
    ///
    /// The link does not own `successor`. Dropping the successor breaks the
    /// link, and the context then retires as if none was set. Links that
    /// would close a loop are rejected.
    pub fn set_successor(&mut self, successor: &ExecutionContext) -> ContextResult<()> {
        let link = SuccessorLink::to(successor);
        check_chain(self.as_ptr(), link.target())?;
        self.inner().successor.set(Some(link));
        Ok(())
    }

    pub fn clear_successor(&mut self) {
        self.inner().successor.set(None);
    }

    /// Reclaim the bound stack
    ///
    /// Only a built-but-never-started or retired context gives its stack
    /// back; a suspended entry still lives on it. A built context loses its
    /// entry and becomes unbound.
    pub fn take_stack(&mut self) -> ContextResult<StackRegion> {
        let inner = self.inner();
        match inner.state.get() {
            ContextState::Built => {
                inner.entry.set(None);
                inner.state.set(ContextState::Unbound);
            }
            ContextState::Retired => {}
            ContextState::Active | ContextState::Suspended => {
                if inner.with_stack(|s| s.is_some()) {
                    return Err(InvalidContextError::StackInUse.into());
                }
            }
            ContextState::Unbound | ContextState::Captured => {}
        }
        inner
            .stack
            .take()
            .ok_or(ContextError::InvalidContext(InvalidContextError::MissingStack))
    }
}

/// Walk the chain starting at `next` and fail if it reaches `ctx`
pub(crate) fn check_chain(
    ctx: *const ContextInner,
    mut next: Option<NonNull<ContextInner>>,
) -> ContextResult<()> {
    while let Some(link) = next {
        if link.as_ptr() as *const ContextInner == ctx {
            return Err(InvalidContextError::SuccessorCycle.into());
        }
        // SAFETY: successor() only yields records that have not been dropped.
        next = unsafe { link.as_ref() }.successor();
    }
    Ok(())
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        tls::forget(self.as_ptr());
        // SAFETY: allocated by Box::into_raw in with_state, freed only here.
        unsafe { drop(Box::from_raw(self.inner.as_ptr())) };
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner();
        f.debug_struct("ExecutionContext")
            .field("id", &inner.id)
            .field("state", &inner.state.get())
            .field("has_successor", &self.has_successor())
            .field("has_stack", &self.has_stack())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_unbound() {
        let ctx = ExecutionContext::new();
        assert_eq!(ctx.state(), ContextState::Unbound);
        assert!(!ctx.has_successor());
        assert!(!ctx.has_stack());
        assert!(!ctx.is_current());
        assert_eq!(ctx.resumptions(), 0);
    }

    #[test]
    fn test_capture() {
        let ctx = match ExecutionContext::capture() {
            Ok(ctx) => ctx,
            Err(ContextError::UnsupportedPlatform) => return,
            Err(e) => panic!("capture failed: {}", e),
        };
        assert_eq!(ctx.state(), ContextState::Captured);
        assert_ne!(ctx.captured_stack_pointer(), 0);
        assert!(ctx.inner().mask.take().is_some());
    }

    #[test]
    fn test_successor_link() {
        let main = ExecutionContext::new();
        let mut ctx = ExecutionContext::new();
        ctx.set_successor(&main).unwrap();
        assert!(ctx.has_successor());
        ctx.clear_successor();
        assert!(!ctx.has_successor());
    }

    #[test]
    fn test_successor_cycle_rejected() {
        let mut a = ExecutionContext::new();
        let mut b = ExecutionContext::new();
        let mut c = ExecutionContext::new();
        b.set_successor(&a).unwrap();
        c.set_successor(&b).unwrap();

        // a -> c -> b -> a would loop.
        assert_eq!(
            a.set_successor(&c),
            Err(ContextError::InvalidContext(InvalidContextError::SuccessorCycle))
        );
        assert!(!a.has_successor());

        c.clear_successor();
        a.set_successor(&c).unwrap();
    }

    #[test]
    fn test_dropped_successor_breaks_link() {
        let mut a = ExecutionContext::new();
        {
            let b = ExecutionContext::new();
            a.set_successor(&b).unwrap();
            assert!(a.has_successor());
        }
        assert!(!a.has_successor());

        // A record allocated where b lived is not reachable from a.
        let mut c = ExecutionContext::new();
        c.set_successor(&a).unwrap();
        assert!(c.has_successor());
        a.set_successor(&ExecutionContext::new()).unwrap();
    }

    #[test]
    fn test_take_stack_without_stack() {
        let mut ctx = ExecutionContext::new();
        assert_eq!(
            ctx.take_stack().unwrap_err(),
            ContextError::InvalidContext(InvalidContextError::MissingStack)
        );
    }

    #[test]
    fn test_ids_differ() {
        let a = ExecutionContext::new();
        let b = ExecutionContext::new();
        assert_ne!(a.id(), b.id());
    }
}
