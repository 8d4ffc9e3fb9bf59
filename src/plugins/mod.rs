//! Plugin lifecycle: discovery, load, enable, disable, unload.
//!
//! ## Contents
//! - [`PluginInfo`], [`FunctionTable`], [`LocalEnv`] the plugin ABI
//! - `PluginManager` (crate-internal) the loaded/enabled registry wired
//!   into [`Runtime`](crate::Runtime)
//!
//! Plugins extend the assistant with commands, input/output devices, and
//! agent properties. See [`abi`](self) for the library contract and
//! [`Runtime::load_plugin`](crate::Runtime::load_plugin) and friends for
//! the public operations.

mod abi;
mod manager;

pub use abi::{
    AddCommandsFn, FunctionTable, LifecycleFn, LocalEnv, PluginInfo, PluginInfoFn,
    PLUGIN_INFO_SYMBOL,
};

pub(crate) use manager::PluginManager;
