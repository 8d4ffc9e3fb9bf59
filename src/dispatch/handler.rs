//! # Event handlers and their running contexts.
//!
//! Defines the [`Handler`] extension point, the closure adapter
//! [`HandlerFn`], and the crate-internal `HandlerContext` that the event
//! dispatch task creates per dispatched event.
//!
//! ## Spawn/reap protocol
//! A context is created with `running = true` and a fresh [`HandlerSync`].
//! The handler runs as its own tokio task; when the body returns, the task
//! either
//! - clears `running` and exits, leaving cleanup to the dispatcher's next
//!   reap step, or
//! - performs the final cleanup itself when the dispatcher transferred it
//!   via the reap flag (the quit-from-handler path).
//!
//! Panics in handler bodies are caught and logged; a panicked handler is
//! reaped like one that returned normally.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{error, trace};

use crate::events::Event;
use crate::runtime::Runtime;

use super::sync::HandlerSync;

tokio::task_local! {
    /// Sync object of the handler the current task is running, if any.
    /// Lets `Runtime::quit` detect that it was called from inside a handler.
    pub(crate) static ACTIVE_SYNC: Arc<HandlerSync>;
}

/// Shared handle to a handler object.
pub type HandlerRef = Arc<dyn Handler>;

/// A subscriber for one event topic.
///
/// Handlers receive the runtime handle (so they may `generate`, `delay`,
/// quit, and so on), the event being handled, and their [`HandlerSync`].
/// Bodies must call [`HandlerSync::checkpoint`] at cooperative points;
/// preemption latency is bounded by the checkpoint interval, not by the
/// dispatcher.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Handles a single event.
    async fn handle(&self, rt: Runtime, event: Arc<Event>, sync: Arc<HandlerSync>);
}

/// Function-backed handler implementation.
///
/// Wraps a closure that creates a fresh future per dispatched event.
pub struct HandlerFn<F> {
    f: F,
}

impl<F> HandlerFn<F> {
    /// Creates a new function-backed handler.
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the handler and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Runtime, Arc<Event>, Arc<HandlerSync>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, rt: Runtime, event: Arc<Event>, sync: Arc<HandlerSync>) {
        (self.f)(rt, event, sync).await;
    }
}

/// Completion state shared between a handler task and the dispatcher.
pub(crate) struct HandlerFlags {
    running: AtomicBool,
    reap_in_handler: AtomicBool,
}

impl HandlerFlags {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            running: AtomicBool::new(true),
            reap_in_handler: AtomicBool::new(false),
        })
    }

    /// True while the handler body has not yet returned.
    pub(crate) fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn set_finished(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Transfers final cleanup from the dispatcher to the handler task.
    pub(crate) fn set_reap_in_handler(&self) {
        self.reap_in_handler.store(true, Ordering::Release);
    }

    fn reap_in_handler(&self) -> bool {
        self.reap_in_handler.load(Ordering::Acquire)
    }
}

/// A scheduled or running instance of an event handler.
///
/// Owned by the event dispatch task; at most one context is current at any
/// instant, the rest sit on the interrupted stack.
pub(crate) struct HandlerContext {
    pub(crate) event: Arc<Event>,
    pub(crate) sync: Arc<HandlerSync>,
    pub(crate) flags: Arc<HandlerFlags>,
    pub(crate) join: JoinHandle<()>,
}

/// Starts a handler task for `event` and returns its context.
pub(crate) fn spawn_handler(rt: Runtime, handler: HandlerRef, event: Arc<Event>) -> HandlerContext {
    let sync = HandlerSync::new();
    let flags = HandlerFlags::new();

    let join = tokio::spawn(ACTIVE_SYNC.scope(
        Arc::clone(&sync),
        run_handler(
            rt,
            handler,
            Arc::clone(&event),
            Arc::clone(&sync),
            Arc::clone(&flags),
        ),
    ));

    HandlerContext {
        event,
        sync,
        flags,
        join,
    }
}

async fn run_handler(
    rt: Runtime,
    handler: HandlerRef,
    event: Arc<Event>,
    sync: Arc<HandlerSync>,
    flags: Arc<HandlerFlags>,
) {
    let topic = event.topic;
    let body = handler.handle(rt, Arc::clone(&event), Arc::clone(&sync));
    if let Err(panic) = std::panic::AssertUnwindSafe(body).catch_unwind().await {
        error!(topic = %topic, "handler panicked: {panic:?}");
    }

    if flags.reap_in_handler() {
        // The dispatcher exited without waiting for us; the event and sync
        // are released here when the task's references drop.
        trace!(topic = %topic, "handler reaping its own context");
    } else {
        flags.set_finished();
    }
}
