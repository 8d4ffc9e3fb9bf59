//! # Runtime handle: process-wide state and lifecycle.
//!
//! [`Runtime`] is the cheaply cloneable handle shared by the event dispatch
//! task, handlers, commands, and plugins. It owns the dispatch context and
//! the plugin manager and exposes the lifecycle triple `init`/`quit`/
//! `dispose`.
//!
//! ## Lifecycle
//! ```text
//! Created ──► Running ──► StopRequested ──► Stopped
//!    init       (EDT         quit              quit
//!               started)                      (after teardown)
//! ```
//! Transitions are monotonic; `dispose` is legal only from `Stopped` and
//! fails with a distinct error for each subsystem still up.
//!
//! ## Quit from inside a handler
//! A handler may call [`Runtime::quit`]. Without care this deadlocks: the
//! handler waits on the dispatch task, which waits on the handler. `quit`
//! therefore marks the calling handler's sync with the syscall-origin bit
//! (detected through a task-local) before joining, and the dispatch task
//! transfers that handler's cleanup to its own return path.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::command::CommandRegistry;
use crate::config::Config;
use crate::dispatch::{
    built_ins, Dispatch, EventDispatchTask, HandlerRef, TimerId, ACTIVE_SYNC, BUILT_IN_NAMES,
};
use crate::error::{PluginError, RuntimeError, TimerError};
use crate::events::{Args, Event, Topic};
use crate::plugins::{PluginInfo, PluginManager};

/// Lifecycle state of a runtime handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Status {
    /// Allocated; the dispatch task has not started yet.
    Created = 0,
    /// The dispatch task is running.
    Running = 1,
    /// `quit` was called; the dispatch task is winding down.
    StopRequested = 2,
    /// All subsystems are torn down; `dispose` is now legal.
    Stopped = 3,
}

impl Status {
    /// Returns a short stable label.
    pub const fn as_label(&self) -> &'static str {
        match self {
            Status::Created => "created",
            Status::Running => "running",
            Status::StopRequested => "stop_requested",
            Status::Stopped => "stopped",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Monotonic status cell; transitions only ever move forward.
struct StatusCell(AtomicU8);

impl StatusCell {
    fn new() -> Self {
        Self(AtomicU8::new(Status::Created as u8))
    }

    fn get(&self) -> Status {
        match self.0.load(Ordering::Acquire) {
            0 => Status::Created,
            1 => Status::Running,
            2 => Status::StopRequested,
            _ => Status::Stopped,
        }
    }

    /// Advances to `to` unless the cell is already there or further.
    fn advance(&self, to: Status) -> bool {
        loop {
            let cur = self.0.load(Ordering::Acquire);
            if cur >= to as u8 {
                return false;
            }
            if self
                .0
                .compare_exchange(cur, to as u8, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }
}

struct RuntimeInner {
    status: StatusCell,
    dispatch: Arc<Dispatch>,
    registry: Arc<dyn CommandRegistry>,
    plugins: Mutex<Option<PluginManager>>,
    edt: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to a running assistant runtime.
///
/// Clones share the same runtime. Handlers, commands, and plugins receive a
/// clone and may generate events, arm timers, and manage plugins through
/// it.
///
/// ```no_run
/// use std::sync::Arc;
/// use famulus::{Args, Config, Event, HandlerFn, HandlerSync, NullRegistry, Runtime, Topic};
///
/// # async fn demo() {
/// let rt = Runtime::init(Config::default(), Arc::new(NullRegistry)).unwrap();
/// rt.subscribe(
///     Topic::TextInput,
///     HandlerFn::arc(|_rt: Runtime, event: Arc<Event>, _sync: Arc<HandlerSync>| async move {
///         println!("user said: {}", event.args);
///     }),
/// );
/// rt.generate(Topic::TextInput, Args::text("hello"));
/// rt.quit().await;
/// rt.dispose().unwrap();
/// # }
/// ```
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Allocates the runtime and brings up its subsystems.
    ///
    /// Validates the configuration, starts the event dispatch task (which
    /// moves the status to [`Status::Running`]), registers the built-in
    /// `TIMER`/`DELTIMER` commands, and constructs the plugin manager,
    /// auto-loading from `cfg.plugin_dir` when configured.
    ///
    /// Must be called from within a tokio runtime.
    pub fn init(
        cfg: Config,
        registry: Arc<dyn CommandRegistry>,
    ) -> Result<Runtime, RuntimeError> {
        cfg.validate()?;

        let rt = Runtime {
            inner: Arc::new(RuntimeInner {
                status: StatusCell::new(),
                dispatch: Dispatch::new(&cfg),
                registry,
                plugins: Mutex::new(None),
                edt: Mutex::new(None),
            }),
        };

        let edt = EventDispatchTask::new(rt.clone());
        *rt.inner.edt.lock() = Some(tokio::spawn(edt.run()));

        for cmd in built_ins() {
            rt.inner.registry.register_command(cmd);
        }

        let mut manager = PluginManager::new(cfg.plugin_dir);
        manager.autoload();
        *rt.inner.plugins.lock() = Some(manager);

        info!("runtime initialized");
        Ok(rt)
    }

    /// Returns the current lifecycle status.
    pub fn status(&self) -> Status {
        self.inner.status.get()
    }

    /// Requests shutdown and waits for all subsystems to tear down.
    ///
    /// Idempotent: callers after the first observe the teardown already in
    /// progress or finished and return without joining anything. Safe to
    /// call from inside a handler; see the module docs.
    pub async fn quit(&self) {
        // When called from inside a handler task, mark its sync so the
        // dispatch task knows not to wait on it.
        let _ = ACTIVE_SYNC.try_with(|sync| sync.mark_syscall_origin());

        self.inner.status.advance(Status::StopRequested);
        self.inner.dispatch.stop.cancel();

        let join = self.inner.edt.lock().take();
        let Some(join) = join else {
            return;
        };
        trace!("joining on event dispatch task");
        let _ = join.await;
        trace!("event dispatch task joined");

        for name in BUILT_IN_NAMES {
            self.inner.registry.unregister_command(name);
        }

        let manager = self.inner.plugins.lock().take();
        if let Some(mut manager) = manager {
            manager.shutdown(self);
        }

        self.inner.status.advance(Status::Stopped);
        info!("runtime stopped");
    }

    /// Releases the handle.
    ///
    /// Legal only once every subsystem is torn down; otherwise fails with
    /// an error whose [`exit_code`](RuntimeError::exit_code) names the
    /// subsystem still up.
    pub fn dispose(self) -> Result<(), RuntimeError> {
        if self.status() != Status::Stopped || self.inner.edt.lock().is_some() {
            return Err(RuntimeError::EventSubsystemUp);
        }
        if self.inner.plugins.lock().is_some() {
            return Err(RuntimeError::PluginSubsystemUp);
        }
        Ok(())
    }

    // ---- events ----

    /// Subscribes `handler` to a topic, replacing any previous handler.
    pub fn subscribe(&self, topic: Topic, handler: HandlerRef) {
        self.inner.dispatch.handlers.insert(topic, handler);
    }

    /// Removes the topic's handler, if any.
    pub fn unsubscribe(&self, topic: Topic) {
        self.inner.dispatch.handlers.remove(&topic);
    }

    /// Generates an event with the topic's default priority.
    ///
    /// Thread-safe and non-blocking; never waits on handlers.
    pub fn generate(&self, topic: Topic, args: Args) {
        self.generate_event(Event::new(topic, args));
    }

    /// Enqueues a pre-built event, e.g. one with an overridden priority.
    pub fn generate_event(&self, event: Event) {
        debug!(topic = %event.topic, seq = event.seq, "queued event");
        self.inner.dispatch.push(Arc::new(event));
    }

    // ---- timers ----

    /// Arms a one-shot timer firing at the wall-clock time `at`.
    ///
    /// Fails with [`TimerError::ScheduleInPast`] — registering nothing —
    /// when `at` is not in the future.
    pub fn schedule(
        &self,
        at: SystemTime,
        topic: Topic,
        args: Args,
    ) -> Result<TimerId, TimerError> {
        match at.duration_since(SystemTime::now()) {
            Ok(remaining) if !remaining.is_zero() => Ok(self.delay(remaining, topic, args)),
            _ => Err(TimerError::ScheduleInPast),
        }
    }

    /// Arms a one-shot timer firing after `after`.
    pub fn delay(&self, after: Duration, topic: Topic, args: Args) -> TimerId {
        let id = self
            .inner
            .dispatch
            .timers
            .lock()
            .insert(after, topic, args, false);
        debug!(id, topic = %topic, after_ms = after.as_millis() as u64, "armed one-shot timer");
        id
    }

    /// Arms a recurring timer firing every `period`.
    pub fn add_timer(&self, period: Duration, topic: Topic, args: Args) -> TimerId {
        let id = self
            .inner
            .dispatch
            .timers
            .lock()
            .insert(period, topic, args, true);
        debug!(id, topic = %topic, period_ms = period.as_millis() as u64, "armed recurring timer");
        id
    }

    /// Removes and destroys a timer.
    pub fn remove_timer(&self, id: TimerId) -> Result<(), TimerError> {
        self.inner.dispatch.timers.lock().remove(id)?;
        debug!(id, "removed timer");
        Ok(())
    }

    /// Returns a snapshot of the currently registered timer ids.
    pub fn timers(&self) -> Vec<TimerId> {
        self.inner.dispatch.timers.lock().ids()
    }

    // ---- plugins ----

    /// Loads a plugin library from `path`.
    pub fn load_plugin(&self, path: impl AsRef<Path>) -> Result<String, PluginError> {
        match self.inner.plugins.lock().as_mut() {
            Some(manager) => manager.load(path.as_ref()),
            None => Err(PluginError::ManagerClosed),
        }
    }

    /// Registers a compiled-in plugin through the regular load path.
    pub fn load_static_plugin(&self, info: &PluginInfo) -> Result<String, PluginError> {
        match self.inner.plugins.lock().as_mut() {
            Some(manager) => manager.load_static(info),
            None => Err(PluginError::ManagerClosed),
        }
    }

    /// Enables a loaded plugin, running its init and contribution entries.
    pub fn enable_plugin(&self, id: &str) -> Result<(), PluginError> {
        let mut plugins = self.inner.plugins.lock();
        match plugins.as_mut() {
            Some(manager) => manager.enable(self, id),
            None => Err(PluginError::ManagerClosed),
        }
    }

    /// Disables an enabled plugin; a no-op otherwise.
    pub fn disable_plugin(&self, id: &str) {
        let mut plugins = self.inner.plugins.lock();
        match plugins.as_mut() {
            Some(manager) => manager.disable(self, id),
            None => warn!(plugin = id, "plugin manager is down, cannot disable"),
        }
    }

    /// Disables (if needed) and unloads a plugin.
    pub fn unload_plugin(&self, id: &str) {
        let mut plugins = self.inner.plugins.lock();
        match plugins.as_mut() {
            Some(manager) => manager.unload(self, id),
            None => warn!(plugin = id, "plugin manager is down, cannot unload"),
        }
    }

    /// Returns true when a plugin with this id is loaded.
    pub fn plugin_loaded(&self, id: &str) -> bool {
        self.inner
            .plugins
            .lock()
            .as_ref()
            .is_some_and(|manager| manager.is_loaded(id))
    }

    /// Returns true when a plugin with this id is enabled.
    pub fn plugin_enabled(&self, id: &str) -> bool {
        self.inner
            .plugins
            .lock()
            .as_ref()
            .is_some_and(|manager| manager.is_enabled(id))
    }

    /// Returns the ids of all loaded plugins.
    pub fn loaded_plugins(&self) -> Vec<String> {
        self.inner
            .plugins
            .lock()
            .as_ref()
            .map(|manager| manager.loaded_ids())
            .unwrap_or_default()
    }

    // ---- crate-internal ----

    pub(crate) fn dispatch(&self) -> &Arc<Dispatch> {
        &self.inner.dispatch
    }

    pub(crate) fn registry(&self) -> &Arc<dyn CommandRegistry> {
        &self.inner.registry
    }

    /// Called by the dispatch task as it starts.
    pub(crate) fn mark_running(&self) {
        self.inner.status.advance(Status::Running);
    }
}
