//! Ping-pong example
//!
//! Two contexts hand control back and forth, then unwind through their
//! successor chain: ping retires into pong, pong retires into main.
//!
//! # Environment Variables
//!
//! - `GVC_PINGPONG_ROUNDS=5` - Number of exchanges
//! - `GVC_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)
//! - `GVC_DEBUG=1` - Log every build and switch

use gvcontext::{capture, config, env_get, env_get_bool, ContextBuilder, ContextResult, ExecutionContext, StackRegion};
use gvcontext::{kdebug, kinfo};
use std::cell::Cell;
use std::rc::Rc;

type Players = Rc<Cell<(*const ExecutionContext, *const ExecutionContext)>>;

fn player(name: &'static str, rounds: u32, players: Players, hits: Rc<Cell<u32>>) -> impl FnOnce() {
    move || {
        for round in 0..rounds {
            let (ping, pong) = players.get();
            let (me, other) = if name == "ping" { (ping, pong) } else { (pong, ping) };
            hits.set(hits.get() + 1);
            println!("{} {}", name, round);
            // SAFETY: both contexts live in main's frame until main is resumed.
            if let Err(e) = unsafe { gvcontext::switch(&*me, &*other) } {
                println!("{}: switch failed: {}", name, e);
                std::process::exit(1);
            }
        }
        kdebug!("{} done", name);
    }
}

fn run(rounds: u32) -> ContextResult<()> {
    let main_ctx = capture()?;
    let players: Players = Rc::new(Cell::new((std::ptr::null(), std::ptr::null())));
    let hits = Rc::new(Cell::new(0));

    let mut pong = ExecutionContext::new();
    ContextBuilder::new()
        .stack(StackRegion::with_default_size()?)
        .successor(&main_ctx)
        .entry(player("pong", rounds, players.clone(), hits.clone()))
        .build(&mut pong)?;

    let mut ping = ExecutionContext::new();
    ContextBuilder::new()
        .stack(StackRegion::with_default_size()?)
        .successor(&pong)
        .entry(player("ping", rounds, players.clone(), hits.clone()))
        .build(&mut ping)?;

    players.set((&ping as *const _, &pong as *const _));

    // SAFETY: ping, pong and main_ctx outlive the whole exchange.
    unsafe { gvcontext::switch(&main_ctx, &ping)? };

    kinfo!(
        "back in main: ping resumed {}x, pong resumed {}x, {} hits",
        ping.resumptions(),
        pong.resumptions(),
        hits.get()
    );
    println!("ping {}, pong {}", ping.state(), pong.state());
    Ok(())
}

// GVC_LOG_LEVEL=debug GVC_DEBUG=1 cargo run -p gvcontext-pingpong
fn main() {
    println!("=== GVContext Ping-Pong ===\n");

    if env_get_bool("GVC_DEBUG", false) {
        config::current().print();
    }
    let rounds: u32 = env_get("GVC_PINGPONG_ROUNDS", 5);

    match run(rounds) {
        Ok(()) => println!("\n=== Example Complete ==="),
        Err(e) if e.is_unsupported() => println!("{}", e),
        Err(e) => {
            println!("error: {}", e);
            std::process::exit(1);
        }
    }
}
