//! Switching between contexts
//!
//! `switch` saves the running flow into one context and resumes another.
//! Every built context starts in `context_entry` (called by the arch
//! trampoline), runs its entry binding and then retires into its successor.

use crate::arch;
use crate::config::{self, OrphanPolicy};
use crate::context::{ContextInner, ExecutionContext};
use crate::signal;
use crate::tls;
use gvcontext_core::error::{ContextError, ContextResult, InvalidContextError, SwitchError};
use gvcontext_core::state::ContextState;
use gvcontext_core::{kdebug, kerror, ktrace};
use std::panic::{self, AssertUnwindSafe};
use std::process;

/// Save the running flow into `save_into` and resume `resume_from`
///
/// Returns `Ok(())` when some later switch (or a retiring entry whose
/// successor is `save_into`) resumes `save_into`. On error nothing has been
/// switched and both contexts are unchanged.
///
/// `save_into` must be the context running on this thread, or, before any
/// context is tracked, an unbound or captured context that will stand for
/// the thread's original flow. `resume_from` must be built or suspended.
///
/// # Safety
///
/// Both contexts must stay alive until control comes back here. Frames left
/// suspended on a context's stack are never unwound; their destructors do
/// not run if the context is dropped without being resumed.
pub unsafe fn switch(save_into: &ExecutionContext, resume_from: &ExecutionContext) -> ContextResult<()> {
    if !arch::SUPPORTED {
        return Err(ContextError::UnsupportedPlatform);
    }

    check_save(save_into)?;
    check_resume(resume_from)?;

    unsafe { transfer(save_into.as_ptr(), resume_from.as_ptr(), ContextState::Suspended)? };
    Ok(())
}

fn check_save(save_into: &ExecutionContext) -> ContextResult<()> {
    let current = tls::current();
    if current.is_null() {
        if !save_into.state().accepts_root_save() {
            return Err(InvalidContextError::NotCurrent.into());
        }
    } else if current != save_into.as_ptr() {
        return Err(InvalidContextError::NotCurrent.into());
    }
    Ok(())
}

fn check_resume(resume_from: &ExecutionContext) -> ContextResult<()> {
    match resume_from.state() {
        ContextState::Built | ContextState::Suspended => Ok(()),
        ContextState::Active => Err(InvalidContextError::AlreadyActive.into()),
        ContextState::Retired => Err(InvalidContextError::Retired.into()),
        ContextState::Unbound | ContextState::Captured => {
            Err(InvalidContextError::NotResumable.into())
        }
    }
}

/// Hand the thread from `save` to `resume`
///
/// `save` is left in `departing` state. Returns once `save` is resumed.
///
/// # Safety
///
/// Both records must be alive; `save` must be the flow executing now and
/// `resume` must hold resumable registers.
pub(crate) unsafe fn transfer(
    save: *const ContextInner,
    resume: *const ContextInner,
    departing: ContextState,
) -> Result<(), SwitchError> {
    let cfg = config::current();
    let (save_ref, resume_ref) = unsafe { (&*save, &*resume) };

    if cfg.switch_sigmask {
        if let Some(incoming) = resume_ref.mask.take() {
            let swapped = signal::swap_mask(&incoming);
            resume_ref.mask.set(Some(incoming));
            save_ref.mask.set(Some(swapped?));
        }
    }

    if cfg.debug_logging {
        kdebug!(
            "switch {} -> {} ({}, {})",
            save_ref.id,
            resume_ref.id,
            departing,
            resume_ref.state.get()
        );
    } else {
        ktrace!("switch {} -> {}", save_ref.id, resume_ref.id);
    }

    save_ref.state.set(departing);
    resume_ref.state.set(ContextState::Active);
    resume_ref.resumptions.set(resume_ref.resumptions.get() + 1);
    tls::set_current(resume, resume_ref.id);

    unsafe { arch::context_switch(save_ref.regs.get(), resume_ref.regs.get()) };

    // Resumed: whoever switched here already marked us active.
    Ok(())
}

/// First Rust frame of every built context
///
/// Never returns: the trampoline has no caller to return to.
pub(crate) extern "C" fn context_entry(ctx: *const ContextInner) -> ! {
    // SAFETY: init_context stored this context's own record for the
    // trampoline, and a context is alive while it runs.
    let inner = unsafe { &*ctx };

    match inner.entry.take() {
        Some(entry) => {
            if panic::catch_unwind(AssertUnwindSafe(|| entry.invoke())).is_err() {
                kerror!("entry of context {} panicked, aborting", inner.id);
                process::abort();
            }
        }
        None => {
            kerror!("context {} started without an entry, aborting", inner.id);
            process::abort();
        }
    }

    retire(ctx)
}

/// Leave a finished context for its successor, or apply the orphan policy
fn retire(ctx: *const ContextInner) -> ! {
    // SAFETY: still running on this context's stack.
    let inner = unsafe { &*ctx };

    // A dropped successor counts as none.
    let Some(next) = inner.successor() else {
        match config::current().orphan_policy {
            OrphanPolicy::Abort => {
                kerror!("context {} returned with no successor, aborting", inner.id);
                process::abort();
            }
            OrphanPolicy::Exit(code) => {
                kerror!("context {} returned with no successor, exiting with {}", inner.id, code);
                process::exit(code);
            }
        }
    };

    let next = next.as_ptr() as *const ContextInner;
    // SAFETY: successor() only yields records that have not been dropped.
    let next_ref = unsafe { &*next };
    if !next_ref.state.get().is_resumable() {
        kerror!(
            "context {} retired into successor {} in state {}, aborting",
            inner.id,
            next_ref.id,
            next_ref.state.get()
        );
        process::abort();
    }

    // SAFETY: both records are alive and this context is the running one.
    if let Err(e) = unsafe { transfer(ctx, next, ContextState::Retired) } {
        kerror!("context {} could not retire: {}", inner.id, e);
        process::abort();
    }

    // A retired context is never a valid switch target.
    kerror!("retired context {} was resumed, aborting", inner.id);
    process::abort()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{build, ContextBuilder};
    use crate::memory::StackRegion;
    use gvcontext_core::entry::EntryBinding;
    use std::cell::{Cell, RefCell};
    use std::hint::black_box;
    use std::os::unix::process::ExitStatusExt;
    use std::process::{Command, ExitStatus};
    use std::rc::Rc;

    const CHILD_ENV: &str = "GVC_SWITCH_TEST_CHILD";

    fn in_child() -> bool {
        std::env::var_os(CHILD_ENV).is_some()
    }

    /// Re-run a single test of this binary in a fresh process
    fn run_in_child(test: &str, envs: &[(&str, &str)]) -> ExitStatus {
        let mut cmd = Command::new(std::env::current_exe().unwrap());
        cmd.args([test, "--exact", "--test-threads=1", "--nocapture"])
            .env(CHILD_ENV, "1")
            .env_remove("GVC_ORPHAN_POLICY");
        for (key, value) in envs {
            cmd.env(key, value);
        }
        cmd.status().unwrap()
    }

    /// Switch into a context whose entry returns with no live successor
    fn retire_without_successor(drop_successor: bool) {
        let Some(main) = capture_or_skip() else { return };
        let mut ctx = ExecutionContext::new();
        let mut builder = ContextBuilder::new()
            .stack(StackRegion::allocate_heap(32 * 1024, 16).unwrap())
            .entry(|| {});
        if drop_successor {
            let gone = ExecutionContext::new();
            builder = builder.successor(&gone);
        }
        builder.build(&mut ctx).unwrap();

        unsafe { switch(&main, &ctx).unwrap() };
        panic!("orphaned context returned to main");
    }

    fn capture_or_skip() -> Option<ExecutionContext> {
        match ExecutionContext::capture() {
            Ok(ctx) => Some(ctx),
            Err(e) if e.is_unsupported() => None,
            Err(e) => panic!("capture failed: {}", e),
        }
    }

    #[inline(never)]
    fn burn_stack(depth: usize) -> u64 {
        let buf = black_box([depth as u8; 256]);
        if depth == 0 {
            buf[0] as u64
        } else {
            burn_stack(depth - 1) + buf[255] as u64
        }
    }

    #[test]
    fn test_entry_runs_then_falls_through() {
        let Some(main) = capture_or_skip() else { return };

        let seen = Rc::new(Cell::new((0, 0, usize::MAX)));
        let out = seen.clone();

        let mut stack = StackRegion::allocate_heap(262144, 16).unwrap();
        stack.truncate(262144 - 40).unwrap();
        stack.poison_tail(0x55);

        let mut ctx = ExecutionContext::new();
        ContextBuilder::new()
            .stack(stack)
            .successor(&main)
            .entry_with_args(
                move |a: i32, b: i32| out.set((a, b, arch::stack_misalignment())),
                (78, 274),
            )
            .build(&mut ctx)
            .unwrap();

        unsafe { switch(&main, &ctx).unwrap() };

        assert_eq!(seen.get(), (78, 274, 0));
        assert_eq!(ctx.state(), ContextState::Retired);
        assert_eq!(ctx.resumptions(), 1);
        assert_eq!(main.state(), ContextState::Active);
        assert!(main.is_current());

        let stack = ctx.take_stack().unwrap();
        assert_eq!(stack.tail_damage(0x55), None);
    }

    #[test]
    fn test_every_truncation_keeps_tail() {
        let Some(main) = capture_or_skip() else { return };

        let seen = Rc::new(Cell::new((0, 0, usize::MAX)));
        let calls = Rc::new(Cell::new(0u32));
        let mut ctx = ExecutionContext::new();
        let mut stack = StackRegion::allocate_heap(262144, 16).unwrap();
        let mut rounds = 0;

        for j in (32..64).step_by(std::mem::size_of::<usize>()) {
            stack.reset();
            stack.truncate(262144 - j).unwrap();
            stack.poison_tail(0x55);

            let (out, count) = (seen.clone(), calls.clone());
            ContextBuilder::new()
                .stack(stack)
                .successor(&main)
                .entry_with_args(
                    move |a: i32, b: i32| {
                        count.set(count.get() + 1);
                        out.set((a, b, arch::stack_misalignment()));
                    },
                    (78, 274),
                )
                .build(&mut ctx)
                .unwrap();

            unsafe { switch(&main, &ctx).unwrap() };
            rounds += 1;

            assert_eq!(seen.get(), (78, 274, 0), "j = {}", j);
            assert_eq!(calls.get(), rounds, "j = {}", j);
            assert_eq!(ctx.state(), ContextState::Retired);

            stack = ctx.take_stack().unwrap();
            assert_eq!(stack.tail_damage(0x55), None, "j = {}", j);
            seen.set((0, 0, usize::MAX));
        }

        assert_eq!(main.resumptions(), rounds as u64);
    }

    #[test]
    fn test_orphan_exit_code() {
        if in_child() {
            return retire_without_successor(false);
        }
        if capture_or_skip().is_none() {
            return;
        }
        let status = run_in_child(
            "switch::tests::test_orphan_exit_code",
            &[("GVC_ORPHAN_POLICY", "exit:3")],
        );
        assert_eq!(status.code(), Some(3));
    }

    #[test]
    fn test_orphan_abort() {
        if in_child() {
            return retire_without_successor(false);
        }
        if capture_or_skip().is_none() {
            return;
        }
        let status = run_in_child(
            "switch::tests::test_orphan_abort",
            &[("GVC_ORPHAN_POLICY", "abort")],
        );
        assert_eq!(status.signal(), Some(libc::SIGABRT));
    }

    #[test]
    fn test_dropped_successor_is_orphan() {
        if in_child() {
            return retire_without_successor(true);
        }
        if capture_or_skip().is_none() {
            return;
        }
        let status = run_in_child(
            "switch::tests::test_dropped_successor_is_orphan",
            &[("GVC_ORPHAN_POLICY", "exit:4")],
        );
        assert_eq!(status.code(), Some(4));
    }

    #[test]
    fn test_panicking_entry_aborts() {
        if in_child() {
            let Some(main) = capture_or_skip() else { return };
            let mut ctx = ExecutionContext::new();
            ContextBuilder::new()
                .stack(StackRegion::allocate_heap(32 * 1024, 16).unwrap())
                .successor(&main)
                .entry(|| panic!("entry failed"))
                .build(&mut ctx)
                .unwrap();
            unsafe { switch(&main, &ctx).unwrap() };
            return;
        }
        if capture_or_skip().is_none() {
            return;
        }
        let status = run_in_child("switch::tests::test_panicking_entry_aborts", &[]);
        assert_eq!(status.signal(), Some(libc::SIGABRT));
    }

    #[test]
    fn test_ping_pong() {
        let Some(main) = capture_or_skip() else { return };
        let mut ctx = ExecutionContext::new();

        let handles: Rc<Cell<(*const ExecutionContext, *const ExecutionContext)>> =
            Rc::new(Cell::new((std::ptr::null(), std::ptr::null())));
        let log = Rc::new(RefCell::new(Vec::new()));

        let (h, l) = (handles.clone(), log.clone());
        let entry = move || {
            let (main, me) = h.get();
            for i in 0..3 {
                l.borrow_mut().push(i);
                unsafe { switch(&*me, &*main).unwrap() };
            }
        };
        build(&mut ctx, StackRegion::allocate_heap(64 * 1024, 16).unwrap(), Some(&main), EntryBinding::new(entry))
            .unwrap();
        handles.set((&main as *const _, &ctx as *const _));

        let mut rounds = 0;
        loop {
            unsafe { switch(&main, &ctx).unwrap() };
            rounds += 1;
            if ctx.state() == ContextState::Retired {
                break;
            }
            assert_eq!(ctx.state(), ContextState::Suspended);
        }

        assert_eq!(rounds, 4);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert_eq!(ctx.resumptions(), 4);
        assert_eq!(main.resumptions(), 4);
    }

    #[test]
    fn test_successor_chain() {
        let Some(main) = capture_or_skip() else { return };
        let order = Rc::new(RefCell::new(Vec::new()));

        let mut second = ExecutionContext::new();
        let o = order.clone();
        build(
            &mut second,
            StackRegion::allocate_heap(32 * 1024, 16).unwrap(),
            Some(&main),
            EntryBinding::new(move || o.borrow_mut().push("second")),
        )
        .unwrap();

        let mut first = ExecutionContext::new();
        let o = order.clone();
        build(
            &mut first,
            StackRegion::allocate_heap(32 * 1024, 16).unwrap(),
            Some(&second),
            EntryBinding::new(move || o.borrow_mut().push("first")),
        )
        .unwrap();

        unsafe { switch(&main, &first).unwrap() };

        assert_eq!(*order.borrow(), vec!["first", "second"]);
        assert_eq!(first.state(), ContextState::Retired);
        assert_eq!(second.state(), ContextState::Retired);
    }

    #[test]
    fn test_invalid_switches_leave_state() {
        let Some(main) = capture_or_skip() else { return };
        let blank = ExecutionContext::new();

        let err = unsafe { switch(&main, &blank) }.unwrap_err();
        assert_eq!(err, ContextError::InvalidContext(InvalidContextError::NotResumable));
        assert_eq!(main.state(), ContextState::Captured);
        assert!(!tls::in_context());

        let mut ctx = ExecutionContext::new();
        build(&mut ctx, StackRegion::allocate_heap(32 * 1024, 16).unwrap(), Some(&main), EntryBinding::new(|| {}))
            .unwrap();
        unsafe { switch(&main, &ctx).unwrap() };

        // main is now tracked and active
        let err = unsafe { switch(&main, &main) }.unwrap_err();
        assert_eq!(err, ContextError::InvalidContext(InvalidContextError::AlreadyActive));

        let err = unsafe { switch(&main, &ctx) }.unwrap_err();
        assert_eq!(err, ContextError::InvalidContext(InvalidContextError::Retired));

        let mut other = ExecutionContext::new();
        build(&mut other, StackRegion::allocate_heap(32 * 1024, 16).unwrap(), Some(&main), EntryBinding::new(|| {}))
            .unwrap();
        let err = unsafe { switch(&blank, &other) }.unwrap_err();
        assert_eq!(err, ContextError::InvalidContext(InvalidContextError::NotCurrent));
        assert_eq!(other.state(), ContextState::Built);
    }

    #[test]
    fn test_signal_mask_restored() {
        use nix::sys::signal::{SigSet, Signal};

        let Some(main) = capture_or_skip() else { return };
        if !config::current().switch_sigmask {
            return;
        }
        let before = signal::current_mask().unwrap();

        let mut ctx = ExecutionContext::new();
        let entry = || {
            let mut set = SigSet::empty();
            set.add(Signal::SIGUSR2);
            set.thread_block().unwrap();
        };
        build(&mut ctx, StackRegion::allocate_heap(32 * 1024, 16).unwrap(), Some(&main), EntryBinding::new(entry))
            .unwrap();
        unsafe { switch(&main, &ctx).unwrap() };

        assert_eq!(signal::current_mask().unwrap(), before);
    }

    #[test]
    fn test_guarded_stack_usage() {
        let Some(main) = capture_or_skip() else { return };

        let mut stack = StackRegion::allocate_mapped(128 * 1024, 16, true).unwrap();
        assert!(stack.has_guard_page());
        stack.poison(0x55);

        let sum = Rc::new(Cell::new(0));
        let s = sum.clone();
        let mut ctx = ExecutionContext::new();
        build(&mut ctx, stack, Some(&main), EntryBinding::new(move || s.set(burn_stack(32))))
            .unwrap();
        unsafe { switch(&main, &ctx).unwrap() };

        assert_eq!(sum.get(), (1..=32).sum::<u64>());
        let stack = ctx.take_stack().unwrap();
        assert!(stack.high_water_mark(0x55) >= 32 * 256);
    }

    #[test]
    fn test_rebuild_reclaimed_stack() {
        let Some(main) = capture_or_skip() else { return };
        let runs = Rc::new(Cell::new(0));
        let mut ctx = ExecutionContext::new();
        let mut stack = StackRegion::allocate_heap(32 * 1024, 16).unwrap();

        for round in 1..=2 {
            let r = runs.clone();
            build(&mut ctx, stack, Some(&main), EntryBinding::new(move || r.set(r.get() + 1))).unwrap();
            unsafe { switch(&main, &ctx).unwrap() };
            assert_eq!(runs.get(), round);
            stack = ctx.take_stack().unwrap();
        }
        assert_eq!(ctx.resumptions(), 2);
    }
}
