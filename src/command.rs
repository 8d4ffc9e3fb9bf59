//! # Command descriptors and the registry contract.
//!
//! The command registry itself lives outside the runtime; the core only
//! consumes its two-operation contract, [`CommandRegistry`]. The core
//! contributes the built-in `TIMER` and `DELTIMER` commands at init and
//! withdraws them at quit, and enabled plugins contribute commands through
//! their `add_commands` table entry.
//!
//! A [`Command`] bundles the registry-facing metadata (name, description,
//! argument synopsis, single-character option flags) with an async handler
//! invoked as `(runtime, params, sync)`, mirroring event handlers so a
//! long-running command can honor suspension requests through its
//! [`HandlerSync`].

use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::dispatch::HandlerSync;
use crate::runtime::Runtime;

/// Boxed future returned by a command handler.
pub type CommandFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

type CommandHandler =
    Arc<dyn Fn(Runtime, CommandParams, Arc<HandlerSync>) -> CommandFuture + Send + Sync>;

/// A named command with option flags and an async handler.
#[derive(Clone)]
pub struct Command {
    name: Cow<'static, str>,
    description: Cow<'static, str>,
    synopsis: Cow<'static, str>,
    options: Cow<'static, str>,
    handler: CommandHandler,
}

impl Command {
    /// Creates a new command with no option flags.
    pub fn new<F, Fut>(
        name: impl Into<Cow<'static, str>>,
        description: impl Into<Cow<'static, str>>,
        synopsis: impl Into<Cow<'static, str>>,
        handler: F,
    ) -> Self
    where
        F: Fn(Runtime, CommandParams, Arc<HandlerSync>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            synopsis: synopsis.into(),
            options: Cow::Borrowed(""),
            handler: Arc::new(move |rt, params, sync| Box::pin(handler(rt, params, sync))),
        }
    }

    /// Sets the single-character option flags the command accepts.
    pub fn with_options(mut self, options: impl Into<Cow<'static, str>>) -> Self {
        self.options = options.into();
        self
    }

    /// Returns the command name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the human-readable description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the argument synopsis, e.g. `"time-ms command"`.
    pub fn synopsis(&self) -> &str {
        &self.synopsis
    }

    /// Returns the accepted option flags, e.g. `"r"`.
    pub fn options(&self) -> &str {
        &self.options
    }

    /// Invokes the handler.
    pub fn invoke(
        &self,
        rt: Runtime,
        params: CommandParams,
        sync: Arc<HandlerSync>,
    ) -> CommandFuture {
        (self.handler)(rt, params, sync)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("synopsis", &self.synopsis)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Parsed invocation parameters handed to a command handler.
#[derive(Debug, Clone, Default)]
pub struct CommandParams {
    args: Vec<String>,
    options: Vec<char>,
}

impl CommandParams {
    /// Creates parameters from positional arguments.
    pub fn new(args: Vec<String>) -> Self {
        Self {
            args,
            options: Vec::new(),
        }
    }

    /// Adds a selected option flag.
    pub fn with_option(mut self, option: char) -> Self {
        if !self.options.contains(&option) {
            self.options.push(option);
        }
        self
    }

    /// Returns true when the given option flag was selected.
    pub fn has_option(&self, option: char) -> bool {
        self.options.contains(&option)
    }

    /// Returns the positional argument at `index`.
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// Returns all positional arguments.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns the number of positional arguments.
    pub fn arg_count(&self) -> usize {
        self.args.len()
    }
}

/// Two-operation contract of the external command registry.
///
/// Registration failures are the registry's concern; the runtime treats
/// both operations as infallible.
pub trait CommandRegistry: Send + Sync + 'static {
    /// Makes the command available to the interactive surfaces.
    fn register_command(&self, cmd: Command);

    /// Withdraws the command by name.
    fn unregister_command(&self, name: &str);
}

/// Registry that discards all registrations.
///
/// For embedders that run the dispatch core without an interactive
/// command surface.
pub struct NullRegistry;

impl CommandRegistry for NullRegistry {
    fn register_command(&self, _cmd: Command) {}

    fn unregister_command(&self, _name: &str) {}
}
