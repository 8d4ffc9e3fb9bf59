//! # The event dispatch task (EDT).
//!
//! Exactly one EDT runs per runtime, from `init` until `quit` completes.
//! It owns the handler slot and the interrupted stack outright (they are
//! task-local state) and is the sole consumer of the pending-event queue.
//!
//! ## Main loop
//! Each iteration, in order:
//! 1. **Poll** — inspect the queue head under the queue lock. Dequeue it
//!    when no handler is running, or when its priority is *strictly*
//!    greater than the running handler's event.
//! 2. **Dispatch** — preempt the running handler if any, then spawn a
//!    handler task for the new event, or discard it when its topic has no
//!    subscriber.
//! 3. **Reap** — release the current context once its handler has returned.
//! 4. **Resume** — with the slot empty, pop the most recently interrupted
//!    handler and wake it.
//! 5. **Tick** — at most once per `tick_resolution`, fire due timers.
//! 6. Sleep for `idle_sleep` (woken early by the stop token).
//!
//! ## Preemption
//! The dispatcher requests suspension and sleeps until the handler
//! acknowledges at a cooperative checkpoint. The wait never gives up;
//! responsiveness is bounded by the handler's checkpoint interval, and a
//! warning is logged once the configured grace elapses. Equal priorities
//! never preempt, which avoids livelock under bursts of same-priority
//! events.
//!
//! ## Shutdown
//! On `StopRequested` the loop exits and cleanup runs: the current handler
//! is disposed (without waiting when the quit originated inside it — its
//! reap flag is set instead, and the handler cleans up on return), the
//! interrupted stack is drained top to bottom, queued events are dropped,
//! and all timers are erased.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::events::{Event, EventQueue, Topic};
use crate::runtime::{Runtime, Status};

use super::handler::{spawn_handler, HandlerContext, HandlerRef};
use super::timers::TimerTable;

/// State shared between the EDT and event/timer producers.
pub(crate) struct Dispatch {
    /// Pending events; lock-short, never held across user code.
    pub(crate) queue: Mutex<EventQueue>,
    /// Topic → zero-or-one handler; re-subscribing overwrites.
    pub(crate) handlers: DashMap<Topic, HandlerRef>,
    /// Registered timers; lock-short.
    pub(crate) timers: Mutex<TimerTable>,
    /// Wakes the EDT out of its idle sleep when quit is requested.
    pub(crate) stop: CancellationToken,
    idle_sleep: Duration,
    tick_resolution: Duration,
    suspend_grace: Duration,
}

impl Dispatch {
    pub(crate) fn new(cfg: &Config) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(EventQueue::new()),
            handlers: DashMap::new(),
            timers: Mutex::new(TimerTable::new()),
            stop: CancellationToken::new(),
            idle_sleep: cfg.idle_sleep,
            tick_resolution: cfg.tick_resolution,
            suspend_grace: cfg.suspend_grace,
        })
    }

    /// Enqueues an event; thread-safe and non-blocking.
    pub(crate) fn push(&self, event: Arc<Event>) {
        self.queue.lock().push(event);
    }
}

/// The dispatch loop. Owns the handler slot and the interrupted stack.
pub(crate) struct EventDispatchTask {
    rt: Runtime,
    current: Option<HandlerContext>,
    interrupted: Vec<HandlerContext>,
    last_tick: Option<Instant>,
}

impl EventDispatchTask {
    pub(crate) fn new(rt: Runtime) -> Self {
        Self {
            rt,
            current: None,
            interrupted: Vec::new(),
            last_tick: None,
        }
    }

    pub(crate) async fn run(mut self) {
        self.rt.mark_running();
        trace!("event dispatch task started");

        while self.rt.status() != Status::StopRequested {
            self.iterate().await;

            let dispatch = Arc::clone(self.rt.dispatch());
            tokio::select! {
                _ = time::sleep(dispatch.idle_sleep) => {}
                _ = dispatch.stop.cancelled() => {}
            }
        }
        self.cleanup().await;
        trace!("event dispatch task finished");
    }

    async fn iterate(&mut self) {
        if let Some(event) = self.poll() {
            debug!(topic = %event.topic, priority = event.priority, "dispatching event");
            self.dispatch_event(event).await;
        }
        self.reap_finished().await;
        self.resume_interrupted();
        self.tick();
    }

    /// Dequeues the queue head when it is eligible to run now.
    fn poll(&self) -> Option<Arc<Event>> {
        let mut queue = self.rt.dispatch().queue.lock();
        let head = queue.peek_priority()?;
        if let Some(current) = &self.current {
            // Finish the current work unless the head is strictly more urgent.
            if head <= current.event.priority {
                return None;
            }
        }
        queue.pop()
    }

    async fn dispatch_event(&mut self, event: Arc<Event>) {
        self.preempt_current().await;

        let handler = self
            .rt
            .dispatch()
            .handlers
            .get(&event.topic)
            .map(|entry| Arc::clone(entry.value()));
        match handler {
            Some(handler) => {
                self.current = Some(spawn_handler(self.rt.clone(), handler, event));
            }
            None => {
                debug!(topic = %event.topic, "no handler subscribed, discarding event");
            }
        }
    }

    /// Parks the running handler on the interrupted stack.
    async fn preempt_current(&mut self) {
        let Some(ctx) = self.current.take() else {
            return;
        };
        ctx.sync.request_suspend();
        if self.wait_for_suspend_ack(&ctx).await {
            trace!(topic = %ctx.event.topic, "suspended running handler");
            self.interrupted.push(ctx);
        } else {
            // Finished instead of acknowledging; nothing left to park.
            reap(ctx).await;
        }
    }

    /// Waits until the handler acknowledges suspension (true) or returns
    /// without ever reaching a checkpoint (false).
    async fn wait_for_suspend_ack(&self, ctx: &HandlerContext) -> bool {
        let dispatch = self.rt.dispatch();
        let started = Instant::now();
        let mut warned = false;
        loop {
            if ctx.sync.suspended() {
                return true;
            }
            if !ctx.flags.running() {
                return false;
            }
            ctx.sync.acknowledged_within(dispatch.idle_sleep).await;
            if !warned && started.elapsed() >= dispatch.suspend_grace {
                warn!(
                    topic = %ctx.event.topic,
                    "handler has not acknowledged suspension after {:?}",
                    dispatch.suspend_grace
                );
                warned = true;
            }
        }
    }

    /// Releases the current context once its handler body has returned.
    async fn reap_finished(&mut self) {
        let finished = matches!(&self.current, Some(ctx) if !ctx.flags.running());
        if finished {
            if let Some(ctx) = self.current.take() {
                reap(ctx).await;
            }
        }
    }

    /// Wakes the most recently interrupted handler when the slot is free.
    fn resume_interrupted(&mut self) {
        if self.current.is_none() {
            if let Some(ctx) = self.interrupted.pop() {
                trace!(topic = %ctx.event.topic, "resuming interrupted handler");
                ctx.sync.resume();
                self.current = Some(ctx);
            }
        }
    }

    /// Fires due timers at most once per tick resolution.
    fn tick(&mut self) {
        let dispatch = self.rt.dispatch();
        let now = Instant::now();
        let due_pass = match self.last_tick {
            None => true,
            Some(last) => last + dispatch.tick_resolution <= now,
        };
        if !due_pass {
            return;
        }
        self.last_tick = Some(now);

        let due = dispatch.timers.lock().collect_due(now);
        for timer in due {
            debug!(id = timer.id, topic = %timer.topic, "timer fired");
            self.rt.generate(timer.topic, timer.args);
        }
    }

    async fn cleanup(&mut self) {
        trace!("event dispatch task entering cleanup");

        if let Some(ctx) = self.current.take() {
            // When the quit originated inside this very handler, waiting for
            // it would deadlock: it is itself waiting on the EDT to finish.
            let wait = !ctx.sync.syscall_origin();
            dispose_context(ctx, wait).await;
        }
        while let Some(ctx) = self.interrupted.pop() {
            dispose_context(ctx, true).await;
        }

        let dispatch = self.rt.dispatch();
        let dropped = dispatch.queue.lock().clear();
        if dropped > 0 {
            debug!(count = dropped, "dropped undispatched events at shutdown");
        }
        let erased = dispatch.timers.lock().clear();
        if erased > 0 {
            debug!(count = erased, "erased timers at shutdown");
        }
    }
}

/// Disposes a handler context at shutdown.
///
/// `wait = false` transfers cleanup to the handler task itself via the reap
/// flag; the task is left to finish on its own.
async fn dispose_context(ctx: HandlerContext, wait: bool) {
    if ctx.flags.running() {
        if ctx.sync.suspended() {
            ctx.sync.resume();
        }
        if !wait {
            ctx.flags.set_reap_in_handler();
            trace!(topic = %ctx.event.topic, "cleanup transferred to handler task");
            return;
        }
    }
    reap(ctx).await;
}

async fn reap(ctx: HandlerContext) {
    let _ = ctx.join.await;
    trace!(topic = %ctx.event.topic, "reaped handler context");
}
