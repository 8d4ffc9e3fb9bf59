//! # Plugin ABI.
//!
//! Every plugin library exposes a single well-known symbol,
//! [`PLUGIN_INFO_SYMBOL`], a function returning a pointer to an immutable
//! [`PluginInfo`]: the plugin's name, version, and a [`FunctionTable`] of
//! optional entry points. The getter is invoked exactly once per load.
//!
//! Plugins are Rust cdylibs built with the same toolchain as the host; the
//! info record and the table entries are plain Rust types shared through
//! this crate. Missing table entries are skipped with a warning.
//!
//! ## Local environment
//! Each plugin owns an opaque [`LocalEnv`] sandbox. The runtime threads it
//! through every table call and never reads or mutates it; a plugin
//! typically installs its state in `init` and tears it down in `quit`.
//! Table entries must not call back into plugin management (load, enable,
//! disable, unload) — the manager is not reentrant.
//!
//! ## Example
//! ```
//! use famulus::{FunctionTable, LocalEnv, PluginInfo, Runtime};
//!
//! fn init(_rt: &Runtime, env: &mut LocalEnv) -> i32 {
//!     *env = Some(Box::new(0u64));
//!     0
//! }
//!
//! #[no_mangle]
//! pub extern "C-unwind" fn famulus_plugin_info() -> *const PluginInfo {
//!     static INFO: PluginInfo = PluginInfo {
//!         name: "counter",
//!         version: "0.1.0",
//!         functions: FunctionTable {
//!             init: Some(init),
//!             quit: None,
//!             add_input_devices: None,
//!             add_output_devices: None,
//!             add_agent_props: None,
//!             add_commands: None,
//!         },
//!     };
//!     &INFO
//! }
//! ```

use std::any::Any;

use crate::command::Command;
use crate::runtime::Runtime;

/// Name of the info-getter symbol every plugin library exports.
pub const PLUGIN_INFO_SYMBOL: &[u8] = b"famulus_plugin_info";

/// Signature of the info-getter symbol.
pub type PluginInfoFn = unsafe extern "C-unwind" fn() -> *const PluginInfo;

/// The plugin's private state, owned by the plugin alone.
pub type LocalEnv = Option<Box<dyn Any + Send>>;

/// Signature of the lifecycle and device/property registration entries.
///
/// Returns 0 on success; any other value is a failure status.
pub type LifecycleFn = fn(&Runtime, &mut LocalEnv) -> i32;

/// Signature of the command-contribution entry. Commands pushed into the
/// out-parameter are registered with the command registry on success.
pub type AddCommandsFn = fn(&Runtime, &mut LocalEnv, &mut Vec<Command>) -> i32;

/// Immutable description of a plugin.
#[derive(Debug, Clone, Copy)]
pub struct PluginInfo {
    /// Unique plugin id; loading a second plugin with the same name fails.
    pub name: &'static str,
    /// Informational version string.
    pub version: &'static str,
    /// The plugin's entry points.
    pub functions: FunctionTable,
}

/// Optional plugin entry points, called by the manager at enable/disable.
#[derive(Debug, Clone, Copy, Default)]
pub struct FunctionTable {
    /// Called at enable, before anything else. A non-zero status leaves the
    /// plugin disabled.
    pub init: Option<LifecycleFn>,
    /// Called at disable. A non-zero status unloads the plugin.
    pub quit: Option<LifecycleFn>,
    /// Contributes input devices after a successful init.
    pub add_input_devices: Option<LifecycleFn>,
    /// Contributes output devices.
    pub add_output_devices: Option<LifecycleFn>,
    /// Contributes agent properties.
    pub add_agent_props: Option<LifecycleFn>,
    /// Contributes commands; called last.
    pub add_commands: Option<AddCommandsFn>,
}

impl FunctionTable {
    /// A table with every entry unset, for `..EMPTY` struct updates.
    pub const EMPTY: FunctionTable = FunctionTable {
        init: None,
        quit: None,
        add_input_devices: None,
        add_output_devices: None,
        add_agent_props: None,
        add_commands: None,
    };
}
