//! Event dispatch core: the dispatch task, handlers, suspension, timers.
//!
//! This module contains the embedded implementation of the famulus dispatch
//! core. The public API re-exported from here is the handler extension
//! point ([`Handler`], [`HandlerFn`], [`HandlerRef`], [`HandlerSync`]) and
//! the [`TimerId`] type; everything else is an internal building block that
//! [`Runtime`](crate::Runtime) wires together.
//!
//! ## Files & responsibilities
//! - **edt.rs**: the event dispatch task; owns the handler slot and the
//!   interrupted stack, polls the queue, preempts by priority, fires
//!   timers, reaps finished handlers, drives shutdown cleanup.
//! - **handler.rs**: the `Handler` trait, the `HandlerFn` closure adapter,
//!   the per-dispatch `HandlerContext`, and the spawn/reap protocol.
//! - **sync.rs**: `HandlerSync` — suspend-request / suspended-ack /
//!   syscall-origin bits with Notify-based signaling.
//! - **timers.rs**: the timer table with its monotonic id counter.
//! - **commands.rs**: the built-in `TIMER` and `DELTIMER` commands.
//!
//! ## Wiring (module-level flow)
//! ```text
//! Producers (any task)                  Event dispatch task (one per runtime)
//!   Runtime::generate ──► [queue] ──►   poll: head eligible?
//!   Runtime::delay     ─┐                 │     (strictly greater priority
//!   Runtime::add_timer ─┼► [timers]       │      preempts the running handler)
//!   Runtime::schedule  ─┘     │           ▼
//!                             │         dispatch: suspend current ─► interrupted (LIFO)
//!                             │                   spawn handler task ─► current slot
//!                             │                   (no subscriber → discard event)
//!                tick ◄───────┘         reap: running == false → release context
//!                 │                     resume: pop interrupted, wake its sync
//!                 └── due timers ──► Runtime::generate(topic, args.clone())
//!
//! Handler task
//!   handler.handle(runtime, event, sync)
//!     ├─ sync.checkpoint().await at cooperative points
//!     └─ on return: reap flag set → clean up self
//!                   otherwise     → running := false, EDT reaps
//! ```
//!
//! ## Shutdown timeline
//! ```text
//! Runtime::quit → status := StopRequested, stop token cancelled
//! → EDT exits loop → dispose current handler
//!     (quit came from inside it → set reap flag, do not wait)
//! → drain interrupted stack (resume, wait, release)
//! → drop queued events, erase timers
//! → Runtime::quit unregisters built-in commands, tears down plugins,
//!   status := Stopped
//! ```

mod commands;
mod edt;
mod handler;
mod sync;
mod timers;

pub use handler::{Handler, HandlerFn, HandlerRef};
pub use sync::HandlerSync;
pub use timers::TimerId;

pub(crate) use commands::{built_ins, BUILT_IN_NAMES};
pub(crate) use edt::{Dispatch, EventDispatchTask};
pub(crate) use handler::ACTIVE_SYNC;
