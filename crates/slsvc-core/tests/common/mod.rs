//! Shared fixtures for runtime integration tests.
//!
//! Module entry points are plain `fn` pointers, so they report what happened
//! through a thread-local event log. Every fixture leaks its own self slot
//! and directive cells: tests run on parallel threads and must not share
//! module statics.

#![allow(dead_code)]

use slsvc_core::source::{StaticModule, StaticSource};
use slsvc_core::{
    ConfigValue, ConfigureError, Configurator, Directive, DirectiveCell, DirectiveKind,
    DirectiveTable, ModuleId, ModuleSlot, NoopConfigurator, Runtime,
};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

thread_local! {
    static EVENTS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    static VETO: Cell<bool> = const { Cell::new(true) };
}

/// Append an entry to this thread's event log.
pub fn record(event: impl Into<String>) {
    EVENTS.with(|e| e.borrow_mut().push(event.into()));
}

/// Drain this thread's event log.
pub fn take_events() -> Vec<String> {
    EVENTS.with(|e| std::mem::take(&mut *e.borrow_mut()))
}

/// Whether [`vetoing_exit`] refuses non-shutdown unloads.
pub fn set_veto(veto: bool) {
    VETO.with(|v| v.set(veto));
}

fn name_of(rt: &Runtime, me: ModuleId) -> String {
    rt.module_name(me).unwrap_or_else(|| me.to_string())
}

pub fn ok_init(rt: &Runtime, me: ModuleId) -> bool {
    record(format!("init {}", name_of(rt, me)));
    true
}

pub fn failing_init(rt: &Runtime, me: ModuleId) -> bool {
    record(format!("init-fail {}", name_of(rt, me)));
    false
}

pub fn ok_exit(rt: &Runtime, me: ModuleId, shutdown: bool) -> bool {
    record(format!("exit {} shutdown={shutdown}", name_of(rt, me)));
    true
}

pub fn vetoing_exit(rt: &Runtime, me: ModuleId, shutdown: bool) -> bool {
    record(format!("veto {} shutdown={shutdown}", name_of(rt, me)));
    !VETO.with(Cell::get)
}

pub fn leak_slot() -> &'static ModuleSlot {
    Box::leak(Box::new(ModuleSlot::new()))
}

pub fn leak_cell() -> &'static DirectiveCell {
    Box::leak(Box::new(DirectiveCell::new()))
}

pub fn leak_table(directives: Vec<Directive>) -> &'static DirectiveTable {
    Box::leak(Box::new(DirectiveTable::new(Box::leak(directives.into_boxed_slice()))))
}

/// A well-formed module with recording entry points.
pub fn module(name: &'static str) -> StaticModule {
    StaticModule::entry_points(name, leak_slot(), ok_init, ok_exit)
}

/// A well-formed module with custom entry points.
pub fn module_with(
    name: &'static str,
    init: slsvc_core::InitFn,
    exit: slsvc_core::ExitFn,
) -> StaticModule {
    StaticModule::entry_points(name, leak_slot(), init, exit)
}

pub fn runtime(modules: Vec<StaticModule>) -> Runtime {
    Runtime::new(Box::new(StaticSource::new(modules)), Box::new(NoopConfigurator))
}

pub fn runtime_with_config(modules: Vec<StaticModule>, config: &MapConfigurator) -> Runtime {
    Runtime::new(Box::new(StaticSource::new(modules)), Box::new(config.clone()))
}

pub fn names(rt: &Runtime) -> Vec<String> {
    rt.modules().into_iter().map(|(_, name)| name).collect()
}

/// In-memory configurator whose values tests can change between rehashes.
#[derive(Clone, Default)]
pub struct MapConfigurator {
    values: Rc<RefCell<HashMap<(String, String), ConfigValue>>>,
    refreshes: Rc<Cell<usize>>,
    fail_refresh: Rc<Cell<bool>>,
}

impl MapConfigurator {
    pub fn set(&self, module: &str, directive: &str, value: ConfigValue) {
        self.values
            .borrow_mut()
            .insert((module.to_string(), directive.to_string()), value);
    }

    pub fn unset(&self, module: &str, directive: &str) {
        self.values
            .borrow_mut()
            .remove(&(module.to_string(), directive.to_string()));
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.get()
    }

    pub fn fail_refresh(&self, fail: bool) {
        self.fail_refresh.set(fail);
    }
}

impl Configurator for MapConfigurator {
    fn refresh(&self) -> Result<(), ConfigureError> {
        self.refreshes.set(self.refreshes.get() + 1);
        if self.fail_refresh.get() {
            return Err(ConfigureError::Source("unreadable".into()));
        }
        Ok(())
    }

    fn read(&self, module: &str, directive: &Directive) -> Result<Option<ConfigValue>, ConfigureError> {
        Ok(self
            .values
            .borrow()
            .get(&(module.to_string(), directive.name.to_string()))
            .cloned())
    }
}

/// A single-directive table and its cell.
pub fn one_directive(name: &'static str, kind: DirectiveKind, required: bool) -> (&'static DirectiveTable, &'static DirectiveCell) {
    let cell = leak_cell();
    let directive = Directive::new(name, kind, cell);
    let directive = if required { directive.required() } else { directive };
    (leak_table(vec![directive]), cell)
}
