//! Module registry: the runtime context owning every loaded module.
//!
//! Modules are kept in one list, newest first, with the `core` pseudo-module
//! always at the end. Loading goes through the [`ModuleSource`] the runtime
//! was built with; configuration goes through its [`Configurator`].

use crate::callback::{CallbackArgs, CallbackId, CallbackList, ReconfigurePhase};
use crate::config::{self, ConfigAction, Configurator, DirectiveTable};
use crate::error::{LoadError, UnloadError};
use crate::module::{Module, ModuleId};
use crate::source::{ModuleSource, validate_identifier};
use crate::telemetry::spans;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, error, info, warn};

/// Name of the core pseudo-module.
pub const CORE_MODULE_NAME: &str = "core";
/// Core callback fired after a module finished loading.
pub const LOAD_MODULE_CALLBACK: &str = "load module";
/// Core callback fired after a module was unlinked, before it is freed.
pub const UNLOAD_MODULE_CALLBACK: &str = "unload module";
/// Core callback fired before and after a reconfiguration.
pub const RECONFIGURE_CALLBACK: &str = "reconfigure";

const LOAD_MODULE_ID: CallbackId = 0;
const UNLOAD_MODULE_ID: CallbackId = 1;
const RECONFIGURE_ID: CallbackId = 2;

/// The plugin runtime.
///
/// Single-threaded: all state sits behind `RefCell`/`Cell`, and no borrow is
/// held across a call into module code.
pub struct Runtime {
    /// Newest first; core is always last.
    pub(crate) modules: RefCell<Vec<Module>>,
    pub(crate) source: Box<dyn ModuleSource>,
    configurator: Box<dyn Configurator>,
    last_id: Cell<u64>,
    shutting_down: Cell<bool>,
    /// Module entry points and handlers currently on the stack.
    code_depth: Cell<usize>,
    /// Unloaded modules whose code may still be on the stack.
    graveyard: RefCell<Vec<Module>>,
}

impl Runtime {
    /// Create a runtime holding only the core module.
    pub fn new(source: Box<dyn ModuleSource>, configurator: Box<dyn Configurator>) -> Self {
        let mut core = Module::core(CORE_MODULE_NAME);
        core.callbacks = [LOAD_MODULE_CALLBACK, UNLOAD_MODULE_CALLBACK, RECONFIGURE_CALLBACK]
            .into_iter()
            .map(|name| Some(CallbackList::new(name)))
            .collect();
        debug!(source = source.kind(), "Module runtime created");
        Self {
            modules: RefCell::new(vec![core]),
            source,
            configurator,
            last_id: Cell::new(ModuleId::CORE.get()),
            shutting_down: Cell::new(false),
            code_depth: Cell::new(0),
            graveyard: RefCell::new(Vec::new()),
        }
    }

    fn allocate_id(&self) -> ModuleId {
        let next = self.last_id.get() + 1;
        self.last_id.set(next);
        ModuleId::from_raw(next).unwrap_or(ModuleId::CORE)
    }

    /// Load, configure and initialize the module named `identifier`.
    ///
    /// On failure the registry is left exactly as it was.
    pub fn load_module(&self, identifier: &str) -> Result<ModuleId, LoadError> {
        let _span = spans::load(identifier).entered();
        if self.shutting_down.get() {
            warn!(module = %identifier, "Refusing to load a module during shutdown");
            return Err(LoadError::ShuttingDown);
        }
        if let Err(e) = validate_identifier(identifier) {
            warn!(module = %identifier, "Module identifier rejected");
            return Err(e);
        }
        if self.find_module(identifier).is_some() {
            warn!(module = %identifier, "Module already loaded");
            return Err(LoadError::AlreadyLoaded(identifier.to_string()));
        }

        let image = self.source.open(identifier).map_err(|source| {
            warn!(module = %identifier, error = %source, code = source.error_code(), "Module could not be resolved");
            LoadError::Loader {
                module: identifier.to_string(),
                source,
            }
        })?;
        let linkage = self.materialize(image.as_ref(), identifier)?;

        let id = self.allocate_id();
        linkage.slot.set(id);
        let (init, directives) = (linkage.init, linkage.directives);
        self.modules
            .borrow_mut()
            .insert(0, Module::new(id, identifier, image, linkage));

        if let Some(table) = directives
            && let Err(source) =
                config::configure(self.configurator.as_ref(), identifier, table, ConfigAction::Apply)
        {
            warn!(module = %identifier, error = %source, "Module configuration failed");
            self.discard(id);
            return Err(LoadError::Configure {
                module: identifier.to_string(),
                source,
            });
        }

        self.enter_module_code();
        let initialized = init(self, id);
        self.leave_module_code();

        if initialized && !self.is_loaded(id) {
            warn!(module = %identifier, "Module unloaded itself during initialization");
            return Err(LoadError::InitFailed(identifier.to_string()));
        }
        if !initialized {
            warn!(module = %identifier, "Module initialization failed");
            if let Some(table) = directives {
                config::deconfigure(table);
            }
            self.discard(id);
            return Err(LoadError::InitFailed(identifier.to_string()));
        }

        info!(module = %identifier, id = %id, "Module loaded");
        self.fire(
            LOAD_MODULE_ID,
            &CallbackArgs::LoadModule {
                module: id,
                name: identifier,
            },
        );
        Ok(id)
    }

    /// Roll back a module that never finished loading.
    fn discard(&self, id: ModuleId) {
        let Some(mut module) = self.unlink(id) else {
            return;
        };
        let leftovers = self.scrub(&mut module);
        if leftovers > 0 {
            debug!(module = %module.name, leftovers, "Dropped state left by a failed load");
        }
        if let Some(linkage) = &module.linkage {
            linkage.slot.clear();
        }
        self.release(module);
    }

    /// Unload a module that nothing depends on.
    pub fn unload_module(&self, id: ModuleId) -> Result<(), UnloadError> {
        self.unload_inner(id, false)
    }

    fn unload_inner(&self, id: ModuleId, shutdown: bool) -> Result<(), UnloadError> {
        if id == ModuleId::CORE {
            error!("BUG: attempt to unload the core module");
            return Err(UnloadError::Core);
        }
        let (name, exit, blockers) = {
            let mut modules = self.modules.borrow_mut();
            let module = modules
                .iter_mut()
                .find(|m| m.id == id)
                .ok_or(UnloadError::NotLoaded(id))?;
            if module.unloading {
                return Err(UnloadError::InProgress(module.name.clone()));
            }
            let busy = if shutdown {
                module.in_use()
            } else {
                !module.dependents.is_empty()
            };
            let exit = module.linkage.as_ref().map(|l| l.exit);
            if !busy {
                module.unloading = true;
            }
            let blockers = busy.then(|| module.dependents.clone());
            (module.name.clone(), exit, blockers)
        };
        let _span = spans::unload(&name, shutdown).entered();

        if let Some(blockers) = blockers {
            let dependents: Vec<String> = blockers
                .iter()
                .map(|d| self.module_name(*d).unwrap_or_else(|| d.to_string()))
                .collect();
            warn!(module = %name, dependents = ?dependents, "Module is in use, not unloading");
            return Err(UnloadError::InUse {
                module: name,
                dependents,
            });
        }

        self.enter_module_code();
        let accepted = exit.is_none_or(|exit| exit(self, id, shutdown));
        self.leave_module_code();
        if let Some(module) = self.modules.borrow_mut().iter_mut().find(|m| m.id == id) {
            module.unloading = false;
        }

        if !accepted && !shutdown {
            warn!(module = %name, "Module vetoed its unload");
            return Err(UnloadError::Vetoed(name));
        }

        let Some(mut module) = self.unlink(id) else {
            // The exit routine already arranged for the module to go away.
            return Ok(());
        };
        let stale = self.scrub(&mut module);
        if stale > 0 {
            error!(module = %name, stale, "BUG: module left references behind on unload");
        }

        if !accepted {
            error!(module = %name, "Module exit failed during shutdown, leaking its record");
            if let Some(linkage) = &module.linkage {
                linkage.slot.clear();
            }
            std::mem::forget(module);
            return Ok(());
        }

        self.fire(
            UNLOAD_MODULE_ID,
            &CallbackArgs::UnloadModule {
                module: id,
                name: &name,
            },
        );
        if let Some(table) = module.directives() {
            config::deconfigure(table);
        }
        if let Some(linkage) = &module.linkage {
            linkage.slot.clear();
        }
        self.release(module);
        info!(module = %name, id = %id, "Module unloaded");
        Ok(())
    }

    fn unlink(&self, id: ModuleId) -> Option<Module> {
        let mut modules = self.modules.borrow_mut();
        let pos = modules.iter().position(|m| m.id == id)?;
        Some(modules.remove(pos))
    }

    /// Force out every reference the remaining modules still hold to an
    /// unlinked module. Returns how many were found.
    fn scrub(&self, departed: &mut Module) -> usize {
        let mut found = 0;
        let dropped = {
            let mut modules = self.modules.borrow_mut();
            let mut dropped = Vec::new();
            for other in modules.iter_mut() {
                let before = other.dependents.len();
                other.dependents.retain(|d| *d != departed.id);
                if other.dependents.len() != before {
                    error!(module = %departed.name, used = %other.name, "BUG: module still depends on another at unload");
                    found += before - other.dependents.len();
                }
                for list in other.callbacks.iter_mut().flatten() {
                    let removed = list.remove_owned_by(departed.id);
                    if !removed.is_empty() {
                        error!(
                            module = %departed.name,
                            owner = %other.name,
                            callback = %list.name(),
                            count = removed.len(),
                            "BUG: module still subscribed to a callback at unload"
                        );
                        found += removed.len();
                        dropped.extend(removed);
                    }
                }
            }
            dropped
        };
        // Its own lists may hold handlers of others; those go with the record.
        departed.dependents.clear();
        drop(dropped);
        found
    }

    /// Free a module record, deferring while module code may be on the stack.
    fn release(&self, module: Module) {
        if self.code_depth.get() > 0 {
            self.graveyard.borrow_mut().push(module);
        } else {
            drop(module);
        }
    }

    /// Find a loaded module by name.
    pub fn find_module(&self, name: &str) -> Option<ModuleId> {
        self.modules
            .borrow()
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.id)
    }

    /// Unload every module, ignoring vetoes. Used at shutdown.
    ///
    /// Returns the names of modules that could not be unloaded (a nonempty
    /// result means a dependency was never released).
    pub fn unload_all(&self) -> Vec<String> {
        self.shutting_down.set(true);
        let mut attempted = HashSet::new();
        loop {
            let next = self
                .modules
                .borrow()
                .iter()
                .find(|m| {
                    m.id != ModuleId::CORE
                        && !m.in_use()
                        && !m.unloading
                        && !attempted.contains(&m.id)
                })
                .map(|m| m.id);
            let Some(id) = next else { break };
            attempted.insert(id);
            if let Err(e) = self.unload_inner(id, true) {
                warn!(module = %id, error = %e, code = e.error_code(), "Forced unload failed");
            }
        }

        let stuck: Vec<String> = self
            .modules
            .borrow()
            .iter()
            .filter(|m| m.id != ModuleId::CORE)
            .map(|m| m.name.clone())
            .collect();
        if !stuck.is_empty() {
            for name in &stuck {
                let dependents = self
                    .find_module(name)
                    .map(|id| self.dependents(id))
                    .unwrap_or_default();
                error!(module = %name, dependents = ?dependents, "BUG: module survived shutdown");
            }
            error!(count = stuck.len(), modules = ?stuck, "BUG: modules left after unloading everything");
        }
        stuck
    }

    /// Reload every module's configuration.
    ///
    /// All modules stage their new values first; if any of them fails,
    /// nothing changes and `false` is returned.
    pub fn reconfigure_all(&self) -> bool {
        let _span = spans::reconfigure().entered();
        self.fire(RECONFIGURE_ID, &CallbackArgs::Reconfigure(ReconfigurePhase::Before));

        if let Err(e) = self.configurator.refresh() {
            warn!(error = %e, "Configuration could not be reloaded");
            return false;
        }

        let tables: Vec<(String, &'static DirectiveTable)> = self
            .modules
            .borrow()
            .iter()
            .filter_map(|m| m.directives().map(|t| (m.name.clone(), t)))
            .collect();

        for (name, table) in &tables {
            if let Err(e) = config::configure(self.configurator.as_ref(), name, table, ConfigAction::Stage) {
                warn!(module = %name, error = %e, "Reconfiguration rejected, keeping current configuration");
                tables.iter().for_each(|(_, t)| config::discard(t));
                return false;
            }
        }
        tables.iter().for_each(|(_, t)| config::commit(t));

        self.fire(RECONFIGURE_ID, &CallbackArgs::Reconfigure(ReconfigurePhase::After));
        info!(modules = tables.len(), "Configuration reloaded");
        true
    }

    /// Unload everything and consume the runtime.
    ///
    /// Returns the names of any modules that were still loaded afterwards.
    pub fn teardown(self) -> Vec<String> {
        let stuck = self.unload_all();
        info!(stuck = stuck.len(), "Module runtime torn down");
        stuck
    }

    /// Name of a loaded module.
    pub fn module_name(&self, id: ModuleId) -> Option<String> {
        self.modules
            .borrow()
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.name.clone())
    }

    /// Loaded modules in registry order (newest first, core last).
    pub fn modules(&self) -> Vec<(ModuleId, String)> {
        self.modules
            .borrow()
            .iter()
            .map(|m| (m.id, m.name.clone()))
            .collect()
    }

    /// Number of loaded modules, core included.
    pub fn module_count(&self) -> usize {
        self.modules.borrow().len()
    }

    /// Whether `id` refers to a loaded module.
    pub fn is_loaded(&self, id: ModuleId) -> bool {
        self.modules.borrow().iter().any(|m| m.id == id)
    }

    /// Version code a module was loaded with. `None` for core.
    pub fn module_version(&self, id: ModuleId) -> Option<u32> {
        self.modules
            .borrow()
            .iter()
            .find(|m| m.id == id)
            .and_then(|m| m.linkage.as_ref())
            .map(|l| l.version)
    }

    /// Whether [`unload_all`](Self::unload_all) has started.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.get()
    }

    pub(crate) fn enter_module_code(&self) {
        self.code_depth.set(self.code_depth.get() + 1);
    }

    /// The graveyard is emptied once no module code remains on the stack.
    pub(crate) fn leave_module_code(&self) {
        let depth = self.code_depth.get().saturating_sub(1);
        self.code_depth.set(depth);
        if depth == 0 {
            let freed = std::mem::take(&mut *self.graveyard.borrow_mut());
            drop(freed);
        }
    }

    fn fire(&self, id: CallbackId, args: &CallbackArgs<'_>) {
        if let Err(e) = self.dispatch(ModuleId::CORE, id, args) {
            error!(callback = id, error = %e, "BUG: core callback dispatch failed");
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if !self.shutting_down.get() && self.modules.get_mut().len() > 1 {
            self.unload_all();
        }
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("source", &self.source.kind())
            .field("modules", &self.modules())
            .field("shutting_down", &self.shutting_down.get())
            .finish()
    }
}
