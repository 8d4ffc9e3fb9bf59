//! # Error types used by the famulus runtime.
//!
//! This module defines three error enums:
//!
//! - [`RuntimeError`] errors raised by runtime configuration and lifecycle.
//! - [`TimerError`] errors raised by the timer service.
//! - [`PluginError`] errors raised by the plugin manager.
//!
//! All types provide an `as_label` helper returning a short stable snake_case
//! label for logs and metrics. [`RuntimeError`] additionally maps lifecycle
//! failures to process exit codes via `exit_code`.

use std::path::PathBuf;

use thiserror::Error;

use crate::dispatch::TimerId;

/// # Errors produced by runtime configuration and lifecycle.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A configuration value is malformed or out of range.
    #[error("configuration key {key}: {reason}")]
    Config {
        /// The offending configuration key.
        key: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
    /// `dispose` was called while the event subsystem is still up.
    #[error("event subsystem has not been torn down")]
    EventSubsystemUp,
    /// `dispose` was called while the plugin subsystem is still up.
    #[error("plugin subsystem has not been torn down")]
    PluginSubsystemUp,
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Config { .. } => "runtime_config_invalid",
            RuntimeError::EventSubsystemUp => "runtime_event_subsystem_up",
            RuntimeError::PluginSubsystemUp => "runtime_plugin_subsystem_up",
        }
    }

    /// Maps the error to the process exit code contract:
    /// `1` for configuration and event-subsystem failures, `2` when the
    /// plugin subsystem was not torn down.
    pub fn exit_code(&self) -> i32 {
        match self {
            RuntimeError::Config { .. } | RuntimeError::EventSubsystemUp => 1,
            RuntimeError::PluginSubsystemUp => 2,
        }
    }
}

/// # Errors produced by the timer service.
#[non_exhaustive]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TimerError {
    /// `remove_timer` was called with an id that is not registered.
    #[error("no timer with id {id}")]
    NoSuchTimer {
        /// The missing timer id.
        id: TimerId,
    },
    /// `schedule` was called with a timestamp that is not in the future.
    #[error("timestamp is not in the future")]
    ScheduleInPast,
}

impl TimerError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            TimerError::NoSuchTimer { .. } => "timer_not_found",
            TimerError::ScheduleInPast => "timer_schedule_in_past",
        }
    }
}

/// # Errors produced by the plugin manager.
///
/// Plugin misbehaviour is always recovered locally: the offending plugin is
/// unloaded or left disabled and other plugins are unaffected. These errors
/// report what happened to the caller after recovery.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PluginError {
    /// The plugin library could not be opened.
    #[error("could not open plugin library {path}")]
    Open {
        /// Path of the library that failed to open.
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    /// The library does not export the plugin info symbol.
    #[error("plugin library {path} does not export the info symbol")]
    SymbolMissing {
        /// Path of the offending library.
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    /// The plugin's info getter panicked.
    #[error("plugin info function of {path} panicked")]
    InfoPanicked {
        /// Path of the offending library.
        path: PathBuf,
    },
    /// The plugin's info getter returned a null pointer.
    #[error("plugin info function of {path} returned null")]
    InfoNull {
        /// Path of the offending library.
        path: PathBuf,
    },
    /// A plugin with the same id is already loaded.
    #[error("plugin id is already loaded: {id}")]
    AlreadyLoaded {
        /// The duplicate plugin id.
        id: String,
    },
    /// The operation requires the plugin to be loaded first.
    #[error("plugin is not loaded: {id}")]
    NotLoaded {
        /// The missing plugin id.
        id: String,
    },
    /// `enable` was called on a plugin that is already enabled.
    #[error("plugin is already enabled: {id}")]
    AlreadyEnabled {
        /// The offending plugin id.
        id: String,
    },
    /// The plugin's init function returned a non-zero status; the plugin
    /// was left disabled.
    #[error("plugin '{id}' init function failed with status {status}")]
    InitFailed {
        /// The offending plugin id.
        id: String,
        /// The non-zero status it returned.
        status: i32,
    },
    /// A plugin function panicked; the plugin was unloaded.
    #[error("plugin '{id}' {func} panicked; plugin was unloaded")]
    FuncPanicked {
        /// The offending plugin id.
        id: String,
        /// Name of the function table entry that panicked.
        func: &'static str,
    },
    /// The plugin manager has already been torn down.
    #[error("plugin manager is not initialized")]
    ManagerClosed,
}

impl PluginError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            PluginError::Open { .. } => "plugin_open_failed",
            PluginError::SymbolMissing { .. } => "plugin_symbol_missing",
            PluginError::InfoPanicked { .. } => "plugin_info_panicked",
            PluginError::InfoNull { .. } => "plugin_info_null",
            PluginError::AlreadyLoaded { .. } => "plugin_already_loaded",
            PluginError::NotLoaded { .. } => "plugin_not_loaded",
            PluginError::AlreadyEnabled { .. } => "plugin_already_enabled",
            PluginError::InitFailed { .. } => "plugin_init_failed",
            PluginError::FuncPanicked { .. } => "plugin_func_panicked",
            PluginError::ManagerClosed => "plugin_manager_closed",
        }
    }
}
