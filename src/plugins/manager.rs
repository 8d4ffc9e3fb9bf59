//! # Plugin manager.
//!
//! Discovery, load, enable, disable, and unload of external code bundles.
//! Two keyed sets track plugin state: *loaded* (library opened, info
//! resolved) and *enabled* (init ran, contributions registered), with
//! `enabled ⊆ loaded` after every operation.
//!
//! ## Misbehaviour policy
//! Plugin failures are recovered locally and never disturb other plugins:
//! a panicking entry point unloads the offending plugin; a non-zero status
//! from `init` leaves it disabled; a non-zero status from a contribution
//! entry aborts the remaining contribution calls but leaves the plugin
//! enabled; a failing `quit` unloads it.

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use libloading::Library;
use tracing::{debug, error, info, warn};

use crate::command::Command;
use crate::error::PluginError;
use crate::runtime::Runtime;

use super::abi::{LifecycleFn, LocalEnv, PluginInfo, PluginInfoFn, PLUGIN_INFO_SYMBOL};

/// A loaded plugin: its info record, its sandbox, and the library handle.
struct PluginEntry {
    info: PluginInfo,
    local_env: LocalEnv,
    /// `None` for built-ins registered through [`PluginManager::load_static`].
    lib: Option<Library>,
}

/// Outcome of one optional table-entry call.
enum TableCall {
    /// Ran and returned 0, or was not defined.
    Done,
    /// Ran and returned non-zero.
    Failed,
    /// Panicked; the plugin has been unloaded.
    Panicked,
}

/// Registry of loaded and enabled plugins.
pub(crate) struct PluginManager {
    loaded: BTreeMap<String, PluginEntry>,
    enabled: BTreeSet<String>,
    autoload_dir: Option<PathBuf>,
}

impl PluginManager {
    pub(crate) fn new(autoload_dir: Option<PathBuf>) -> Self {
        Self {
            loaded: BTreeMap::new(),
            enabled: BTreeSet::new(),
            autoload_dir,
        }
    }

    /// Loads every `.so`/`.dll` file in the configured directory.
    ///
    /// Enabling is a separate operation, performed by the embedder or by
    /// subsequent commands. Individual load failures are logged and do not
    /// stop the sweep.
    pub(crate) fn autoload(&mut self) {
        let Some(dir) = self.autoload_dir.clone() else {
            debug!("no plugin directory configured, skipping auto-load");
            return;
        };
        info!(dir = %dir.display(), "auto-loading plugins");
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                error!(dir = %dir.display(), error = %e, "could not list plugin directory");
                return;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.ends_with(".so") || name.ends_with(".dll") {
                let _ = self.load(&entry.path());
            }
        }
    }

    /// Opens a plugin library and records it in the loaded set.
    pub(crate) fn load(&mut self, path: &Path) -> Result<String, PluginError> {
        info!(path = %path.display(), "loading plugin library");

        let lib = unsafe { Library::new(path) }.map_err(|source| {
            error!(path = %path.display(), error = %source, "could not open plugin library");
            PluginError::Open {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let get_info: PluginInfoFn = match unsafe { lib.get::<PluginInfoFn>(PLUGIN_INFO_SYMBOL) } {
            Ok(symbol) => *symbol,
            Err(source) => {
                error!(path = %path.display(), "plugin library does not export the info symbol");
                return Err(PluginError::SymbolMissing {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        // The getter is foreign code; invoke it exactly once, isolated.
        let info_ptr = match catch_unwind(|| unsafe { get_info() }) {
            Ok(ptr) => ptr,
            Err(_) => {
                error!(path = %path.display(), "plugin info function panicked");
                return Err(PluginError::InfoPanicked {
                    path: path.to_path_buf(),
                });
            }
        };
        if info_ptr.is_null() {
            error!(path = %path.display(), "plugin info function returned null");
            return Err(PluginError::InfoNull {
                path: path.to_path_buf(),
            });
        }
        let info = unsafe { *info_ptr };

        self.insert_entry(info, Some(lib))
    }

    /// Registers a compiled-in plugin through the same entry path as
    /// [`load`](Self::load), without a library handle.
    pub(crate) fn load_static(&mut self, info: &PluginInfo) -> Result<String, PluginError> {
        self.insert_entry(*info, None)
    }

    fn insert_entry(
        &mut self,
        info: PluginInfo,
        lib: Option<Library>,
    ) -> Result<String, PluginError> {
        let id = info.name.to_string();
        if self.loaded.contains_key(&id) {
            warn!(plugin = %id, "plugin id is already loaded");
            return Err(PluginError::AlreadyLoaded { id });
        }
        self.loaded.insert(
            id.clone(),
            PluginEntry {
                info,
                local_env: None,
                lib,
            },
        );
        info!(plugin = %id, "loaded plugin");
        Ok(id)
    }

    /// Disables (if needed) and unloads a plugin. Unknown ids warn and
    /// return.
    pub(crate) fn unload(&mut self, rt: &Runtime, id: &str) {
        if !self.loaded.contains_key(id) {
            warn!(plugin = id, "no such plugin loaded, not unloading");
            return;
        }
        info!(plugin = id, "unloading plugin");
        if self.enabled.contains(id) {
            self.disable(rt, id);
        }
        // A failing quit inside disable may already have unloaded it.
        let Some(entry) = self.loaded.remove(id) else {
            return;
        };
        if let Some(lib) = entry.lib {
            if let Err(e) = lib.close() {
                error!(plugin = id, error = %e, "could not close plugin library");
                return;
            }
        }
        info!(plugin = id, "unloaded plugin");
    }

    /// Runs the plugin's init and contribution entries and moves it to the
    /// enabled set.
    pub(crate) fn enable(&mut self, rt: &Runtime, id: &str) -> Result<(), PluginError> {
        info!(plugin = id, "enabling plugin");
        if !self.loaded.contains_key(id) {
            return Err(PluginError::NotLoaded { id: id.to_string() });
        }
        if self.enabled.contains(id) {
            return Err(PluginError::AlreadyEnabled { id: id.to_string() });
        }
        let functions = self.loaded[id].info.functions;

        if let Some(init) = functions.init {
            let status = match self.call_entry(rt, id, init) {
                Ok(status) => status,
                Err(_) => {
                    error!(plugin = id, "plugin init panicked; plugin will be unloaded");
                    self.unload(rt, id);
                    return Err(PluginError::FuncPanicked {
                        id: id.to_string(),
                        func: "init",
                    });
                }
            };
            if status != 0 {
                error!(plugin = id, status, "plugin init function failed");
                return Err(PluginError::InitFailed {
                    id: id.to_string(),
                    status,
                });
            }
        } else {
            warn!(plugin = id, "plugin does not define init, skipping");
        }

        self.enabled.insert(id.to_string());
        info!(plugin = id, "enabled plugin");

        let contributions = [
            ("add_input_devices", functions.add_input_devices),
            ("add_output_devices", functions.add_output_devices),
            ("add_agent_props", functions.add_agent_props),
        ];
        for (name, func) in contributions {
            match self.call_table_fn(rt, id, name, func) {
                TableCall::Done => {}
                // Non-zero aborts further contribution calls but the plugin
                // stays enabled.
                TableCall::Failed => return Ok(()),
                TableCall::Panicked => {
                    return Err(PluginError::FuncPanicked {
                        id: id.to_string(),
                        func: name,
                    });
                }
            }
        }

        self.call_add_commands(rt, id, functions.add_commands)
    }

    /// Removes the plugin from the enabled set and runs its quit entry.
    /// Not-enabled ids are a no-op.
    pub(crate) fn disable(&mut self, rt: &Runtime, id: &str) {
        if !self.enabled.remove(id) {
            return;
        }
        info!(plugin = id, "disabling plugin");
        let Some(entry) = self.loaded.get(id) else {
            return;
        };
        let Some(quit) = entry.info.functions.quit else {
            info!(plugin = id, "plugin does not define quit, skipping");
            return;
        };
        match self.call_entry(rt, id, quit) {
            Ok(0) => {}
            Ok(status) => {
                error!(plugin = id, status, "plugin quit function failed; plugin will be unloaded");
                self.unload(rt, id);
            }
            Err(_) => {
                error!(plugin = id, "plugin quit panicked; plugin will be unloaded");
                self.unload(rt, id);
            }
        }
    }

    pub(crate) fn is_loaded(&self, id: &str) -> bool {
        self.loaded.contains_key(id)
    }

    pub(crate) fn is_enabled(&self, id: &str) -> bool {
        self.enabled.contains(id)
    }

    /// Returns the ids of all loaded plugins, ascending.
    pub(crate) fn loaded_ids(&self) -> Vec<String> {
        self.loaded.keys().cloned().collect()
    }

    /// Disables and unloads every plugin, in id order.
    pub(crate) fn shutdown(&mut self, rt: &Runtime) {
        let ids = self.loaded_ids();
        for id in ids {
            self.unload(rt, &id);
        }
    }

    /// Calls one lifecycle entry with the plugin's sandbox, catching panics.
    fn call_entry(&mut self, rt: &Runtime, id: &str, func: LifecycleFn) -> Result<i32, ()> {
        let Some(entry) = self.loaded.get_mut(id) else {
            return Ok(0);
        };
        catch_unwind(AssertUnwindSafe(|| func(rt, &mut entry.local_env))).map_err(|_| ())
    }

    /// Calls one optional contribution entry, applying the misbehaviour
    /// policy: skip-with-warning when unset, unload on panic.
    fn call_table_fn(
        &mut self,
        rt: &Runtime,
        id: &str,
        name: &'static str,
        func: Option<LifecycleFn>,
    ) -> TableCall {
        let Some(func) = func else {
            warn!(plugin = id, func = name, "plugin does not define {name}, skipping");
            return TableCall::Done;
        };
        match self.call_entry(rt, id, func) {
            Ok(0) => TableCall::Done,
            Ok(status) => {
                error!(plugin = id, func = name, status, "plugin function failed");
                TableCall::Failed
            }
            Err(_) => {
                error!(
                    plugin = id,
                    func = name,
                    "plugin function panicked; plugin will be unloaded"
                );
                self.unload(rt, id);
                TableCall::Panicked
            }
        }
    }

    /// Calls the command-contribution entry and registers what it returns.
    fn call_add_commands(
        &mut self,
        rt: &Runtime,
        id: &str,
        func: Option<super::abi::AddCommandsFn>,
    ) -> Result<(), PluginError> {
        let Some(func) = func else {
            info!(plugin = id, "plugin does not define add_commands, skipping");
            return Ok(());
        };
        let mut new_commands: Vec<Command> = Vec::new();
        let status = {
            let Some(entry) = self.loaded.get_mut(id) else {
                return Ok(());
            };
            catch_unwind(AssertUnwindSafe(|| {
                func(rt, &mut entry.local_env, &mut new_commands)
            }))
        };
        match status {
            Ok(0) => {
                for cmd in new_commands {
                    debug!(plugin = id, command = cmd.name(), "registering plugin command");
                    rt.registry().register_command(cmd);
                }
                Ok(())
            }
            Ok(status) => {
                error!(plugin = id, status, "plugin add_commands failed");
                Ok(())
            }
            Err(_) => {
                error!(plugin = id, "plugin add_commands panicked; plugin will be unloaded");
                self.unload(rt, id);
                Err(PluginError::FuncPanicked {
                    id: id.to_string(),
                    func: "add_commands",
                })
            }
        }
    }
}
