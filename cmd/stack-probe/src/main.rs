//! Stack probe
//!
//! Builds a context on a 262144-byte region whose usable size shrinks by one
//! word per round, poisons the bytes above the usable size, runs
//! `cf(78, 274)` in the context and checks that the poisoned bytes survive
//! the trip back to main.
//!
//! # Exit codes
//!
//! - 0 - all rounds passed, or context handling is not supported here
//! - 1 - a primitive failed, the entry saw wrong arguments, or a poisoned
//!   byte was overwritten
//! - 2 - the entry ran on a misaligned stack
//!
//! # Environment Variables
//!
//! - `GVC_LOG_LEVEL=debug` - Log every build and switch (with `GVC_DEBUG=1`)
//! - `GVC_GUARD_PAGE=1` - Run on an mmap'd region with a guard page

use gvcontext::{capture, constants::POISON_BYTE, ContextBuilder, ExecutionContext, StackRegion};
use gvcontext::{kdebug, kerror, kinfo};
use std::mem::size_of;
use std::process;

const REGION_SIZE: usize = 262144;

fn cf(i: i32, j: i32) {
    if i != 78 || j != 274 {
        println!("error: i {} j {}", i, j);
        process::exit(1);
    } else if !gvcontext::stack_is_aligned() {
        println!("insufficiently aligned stack");
        process::exit(2);
    }
}

fn run() -> i32 {
    let main_ctx = match capture() {
        Ok(ctx) => ctx,
        Err(e) if e.is_unsupported() => {
            println!("{}", e);
            return 0;
        }
        Err(e) => {
            println!("capture failed: {}", e);
            return 1;
        }
    };

    let mut stack = match StackRegion::allocate(REGION_SIZE, 16) {
        Ok(stack) => stack,
        Err(e) => {
            println!("stack allocation failed: {}", e);
            return 1;
        }
    };
    kdebug!("probe region {:?}", stack);

    let mut ctx = ExecutionContext::new();
    let mut status = 0;

    for j in (32..64).step_by(size_of::<usize>()) {
        stack.reset();
        if let Err(e) = stack.truncate(REGION_SIZE - j) {
            println!("truncate failed: {}", e);
            return 1;
        }
        stack.poison_tail(POISON_BYTE);

        let built = ContextBuilder::new()
            .stack(stack)
            .successor(&main_ctx)
            .entry_with_args(cf, (78, 274))
            .build(&mut ctx);
        if let Err(e) = built {
            println!("build failed: {}", e);
            return 1;
        }

        // SAFETY: main_ctx and ctx live on this frame until after the switch
        // comes back through the successor link.
        if let Err(e) = unsafe { gvcontext::switch(&main_ctx, &ctx) } {
            println!("switch failed: {}", e);
            return 1;
        }

        stack = match ctx.take_stack() {
            Ok(stack) => stack,
            Err(e) => {
                kerror!("could not reclaim probe stack: {}", e);
                return 1;
            }
        };

        // Offset counted from the bottom of the poisoned tail, 1-based.
        if let Some(damaged) = stack.tail_damage(POISON_BYTE) {
            println!("fail {} {}", damaged + 1, j);
            status = 1;
        } else {
            kinfo!("round j={} ok (top {:p})", j, stack.top_pointer());
        }
    }

    status
}

// GVC_LOG_LEVEL=info cargo run -p gvcontext-stack-probe
fn main() {
    process::exit(run());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_rounds_pass() {
        assert_eq!(run(), 0);
    }
}
