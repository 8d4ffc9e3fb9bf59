//! # famulus
//!
//! **Famulus** is a modular personal-assistant runtime.
//!
//! It is organized around a priority event-dispatch core with cooperative
//! handler preemption, a timer service, and a plugin manager that extends
//! commands, input/output devices, and agent properties at run time.
//!
//! ## Features
//!
//! | Area             | Description                                                       | Key types / traits                       |
//! |------------------|-------------------------------------------------------------------|------------------------------------------|
//! | **Dispatch**     | Priority queue + single dispatch task; strictly-greater preemption | [`Runtime`], [`Topic`], [`Event`]        |
//! | **Handlers**     | One async handler per topic, suspendable at cooperative points     | [`Handler`], [`HandlerFn`], [`HandlerSync`] |
//! | **Timers**       | One-shot and recurring timers that synthesize events               | [`TimerId`], [`Runtime::delay`], [`Runtime::add_timer`] |
//! | **Plugins**      | Load/enable/disable/unload of external code bundles                | [`PluginInfo`], [`FunctionTable`]        |
//! | **Commands**     | Built-in `TIMER`/`DELTIMER` plus plugin contributions              | [`Command`], [`CommandRegistry`]         |
//! | **Errors**       | Typed errors with stable labels and exit codes                     | [`RuntimeError`], [`TimerError`], [`PluginError`] |
//! | **Configuration**| Validated event/plugin settings                                    | [`Config`]                               |
//!
//! ## Example
//!
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//! use famulus::{Args, Config, Event, HandlerFn, HandlerSync, NullRegistry, Runtime, Topic};
//!
//! #[tokio::main]
//! async fn main() {
//!     let rt = Runtime::init(Config::default(), Arc::new(NullRegistry)).unwrap();
//!
//!     // One handler per topic; re-subscribing overwrites.
//!     rt.subscribe(
//!         Topic::TextInput,
//!         HandlerFn::arc(|rt: Runtime, event: Arc<Event>, sync: Arc<HandlerSync>| async move {
//!             // Long-running handlers poll their sync at cooperative
//!             // checkpoints so urgent events can preempt them.
//!             sync.checkpoint().await;
//!             rt.generate(Topic::AgentSpeech, event.args.clone());
//!         }),
//!     );
//!
//!     rt.generate(Topic::TextInput, Args::text("hello"));
//!     rt.add_timer(Duration::from_secs(60), Topic::TextInput, Args::text("status"));
//!
//!     tokio::time::sleep(Duration::from_millis(100)).await;
//!     rt.quit().await;
//!     rt.dispose().unwrap();
//! }
//! ```
//!
//! ## Concurrency model
//!
//! One dispatch task per runtime owns the pending-event queue, the handler
//! slot, and the interrupted stack. At steady state there is zero or one
//! *current* handler task and zero or more *interrupted* handler tasks, all
//! suspended by contract. Producers may generate events and arm timers from
//! any task; both operations are lock-short and never wait on handlers.
//! Preemption and shutdown are cooperative throughout; the runtime never
//! force-kills a handler.

mod command;
mod config;
mod dispatch;
mod error;
mod events;
mod plugins;
mod runtime;

// ---- Public re-exports ----

pub use command::{Command, CommandFuture, CommandParams, CommandRegistry, NullRegistry};
pub use config::Config;
pub use dispatch::{Handler, HandlerFn, HandlerRef, HandlerSync, TimerId};
pub use error::{PluginError, RuntimeError, TimerError};
pub use events::{Args, Event, Topic};
pub use plugins::{
    AddCommandsFn, FunctionTable, LifecycleFn, LocalEnv, PluginInfo, PluginInfoFn,
    PLUGIN_INFO_SYMBOL,
};
pub use runtime::{Runtime, Status};
