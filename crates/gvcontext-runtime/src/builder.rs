//! Context builder
//!
//! Configures an `ExecutionContext` so the first switch into it runs an
//! entry binding on a given stack, then falls through to a successor.
//!
//! ```ignore
//! let main = ExecutionContext::capture()?;
//! let mut ctx = ExecutionContext::new();
//! ContextBuilder::new()
//!     .stack(StackRegion::allocate(64 * 1024, 16)?)
//!     .successor(&main)
//!     .entry_with_args(cf, (78, 274))
//!     .build(&mut ctx)?;
//! unsafe { switch(&main, &ctx)? };
//! ```

use crate::arch;
use crate::config;
use crate::context::{check_chain, ExecutionContext, SuccessorLink};
use crate::memory::StackRegion;
use crate::signal;
use gvcontext_core::entry::{EntryArgs, EntryBinding, EntryFn};
use gvcontext_core::error::{ContextResult, InvalidContextError};
use gvcontext_core::state::ContextState;
use gvcontext_core::{kdebug, ktrace};

/// Collects stack, successor and entry, then binds them to a context
#[derive(Default)]
pub struct ContextBuilder {
    stack: Option<StackRegion>,
    successor: Option<SuccessorLink>,
    entry: Option<EntryBinding>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stack the entry runs on; ownership moves into the context
    pub fn stack(mut self, stack: StackRegion) -> Self {
        self.stack = Some(stack);
        self
    }

    /// Context to resume when the entry returns
    ///
    /// Not owned: if `successor` is dropped first, the built context retires
    /// as if it had none.
    pub fn successor(mut self, successor: &ExecutionContext) -> Self {
        self.successor = Some(SuccessorLink::to(successor));
        self
    }

    /// Entry closure capturing its own arguments
    pub fn entry<F>(mut self, f: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        self.entry = Some(EntryBinding::new(f));
        self
    }

    /// Entry function with an argument tuple fixed now
    pub fn entry_with_args<F, Args>(mut self, f: F, args: Args) -> Self
    where
        F: EntryFn<Args>,
        Args: EntryArgs,
    {
        self.entry = Some(EntryBinding::with_args(f, args));
        self
    }

    /// Pre-made entry binding
    pub fn binding(mut self, binding: EntryBinding) -> Self {
        self.entry = Some(binding);
        self
    }

    /// Bind everything to `ctx`, replacing whatever it held
    ///
    /// The stack itself is not written: the first frame is pushed by the
    /// trampoline on the first switch, strictly below `top_pointer()`.
    pub fn build(self, ctx: &mut ExecutionContext) -> ContextResult<()> {
        let inner = ctx.inner();

        if !inner.state.get().is_buildable() || ctx.is_current() {
            return Err(InvalidContextError::InUse.into());
        }
        let stack = self.stack.ok_or(InvalidContextError::MissingStack)?;
        let entry = self.entry.ok_or(InvalidContextError::MissingEntry)?;
        let next = self.successor.as_ref().and_then(SuccessorLink::target);
        check_chain(ctx.as_ptr(), next)?;

        // A fresh context starts with the builder's mask.
        match inner.mask.take() {
            Some(mask) => inner.mask.set(Some(mask)),
            None => inner.mask.set(Some(signal::current_mask()?)),
        }

        let top = stack.top_pointer();
        let arity = entry.arity();

        inner.entry.set(Some(entry));
        inner.successor.set(self.successor);
        inner.stack.set(Some(stack));

        // SAFETY: regs belongs to this idle context; top is the top of the
        // stack region it now owns.
        unsafe { arch::init_context(inner.regs.get(), top, ctx.as_ptr()) };
        inner.state.set(ContextState::Built);

        if config::current().debug_logging {
            kdebug!(
                "built context {} (top {:p}, {} args, successor {})",
                inner.id,
                top,
                arity,
                if next.is_some() { "linked" } else { "none" },
            );
        } else {
            ktrace!("built context {}", inner.id);
        }
        Ok(())
    }
}

/// Free-function form of [`ContextBuilder`]
pub fn build(
    ctx: &mut ExecutionContext,
    stack: StackRegion,
    successor: Option<&ExecutionContext>,
    entry: EntryBinding,
) -> ContextResult<()> {
    let mut builder = ContextBuilder::new().stack(stack).binding(entry);
    if let Some(successor) = successor {
        builder = builder.successor(successor);
    }
    builder.build(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gvcontext_core::error::ContextError;

    fn small_stack() -> StackRegion {
        StackRegion::allocate_heap(16 * 1024, 16).unwrap()
    }

    #[test]
    fn test_build_binds_stack_and_successor() {
        let main = ExecutionContext::new();
        let mut ctx = ExecutionContext::new();
        let stack = small_stack();
        let top = stack.top_pointer();

        ContextBuilder::new()
            .stack(stack)
            .successor(&main)
            .entry_with_args(|_: i32, _: i32| {}, (78, 274))
            .build(&mut ctx)
            .unwrap();

        assert_eq!(ctx.state(), ContextState::Built);
        assert!(ctx.has_successor());
        assert_eq!(ctx.stack_top(), Some(top));
    }

    #[test]
    fn test_build_leaves_stack_untouched() {
        let mut stack = small_stack();
        stack.poison(0x55);
        let mut ctx = ExecutionContext::new();

        build(&mut ctx, stack, None, EntryBinding::new(|| {})).unwrap();

        let stack = ctx.take_stack().unwrap();
        assert_eq!(stack.high_water_mark(0x55), 0);
        assert_eq!(ctx.state(), ContextState::Unbound);
    }

    #[test]
    fn test_build_missing_parts() {
        let mut ctx = ExecutionContext::new();
        let err = ContextBuilder::new().entry(|| {}).build(&mut ctx).unwrap_err();
        assert_eq!(err, ContextError::InvalidContext(InvalidContextError::MissingStack));

        let err = ContextBuilder::new().stack(small_stack()).build(&mut ctx).unwrap_err();
        assert_eq!(err, ContextError::InvalidContext(InvalidContextError::MissingEntry));
        assert_eq!(ctx.state(), ContextState::Unbound);
    }

    #[test]
    fn test_build_with_dropped_successor() {
        let mut ctx = ExecutionContext::new();
        let builder = {
            let gone = ExecutionContext::new();
            ContextBuilder::new().stack(small_stack()).successor(&gone).entry(|| {})
        };
        let other = ExecutionContext::new();
        builder.build(&mut ctx).unwrap();
        assert!(!ctx.has_successor());

        ctx.set_successor(&other).unwrap();
        assert!(ctx.has_successor());
    }

    #[test]
    fn test_rebuild_after_take_stack() {
        let mut ctx = ExecutionContext::new();
        build(&mut ctx, small_stack(), None, EntryBinding::new(|| {})).unwrap();
        let stack = ctx.take_stack().unwrap();
        build(&mut ctx, stack, None, EntryBinding::new(|| {})).unwrap();
        assert_eq!(ctx.state(), ContextState::Built);
    }
}
