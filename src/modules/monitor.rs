//! `core/monitor`: logs module lifecycle and reconfiguration events.
//!
//! Directive `verbose` (bool) raises the event log lines from debug to info.

use slsvc_core::source::StaticModule;
use slsvc_core::{
    CALLBACK_PRIORITY_MAX, Callback, CallbackArgs, Directive, DirectiveCell, DirectiveKind,
    DirectiveTable, LOAD_MODULE_CALLBACK, ModuleId, ModuleSlot, RECONFIGURE_CALLBACK, Runtime,
    UNLOAD_MODULE_CALLBACK,
};
use std::cell::{Cell, RefCell};
use tracing::{debug, info, warn};

pub const NAME: &str = "core/monitor";

static SELF: ModuleSlot = ModuleSlot::new();
static VERBOSE: DirectiveCell = DirectiveCell::new();
static DIRECTIVE_LIST: [Directive; 1] = [Directive::new("verbose", DirectiveKind::Bool, &VERBOSE)];
static DIRECTIVES: DirectiveTable = DirectiveTable::new(&DIRECTIVE_LIST);

/// Running event counts since the module was loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub loads: u64,
    pub unloads: u64,
    pub reconfigures: u64,
}

thread_local! {
    static TOTALS: Cell<Totals> = const { Cell::new(Totals { loads: 0, unloads: 0, reconfigures: 0 }) };
    static HANDLERS: RefCell<Vec<(&'static str, Callback)>> = const { RefCell::new(Vec::new()) };
}

/// Event counts seen by the monitor on this thread.
pub fn totals() -> Totals {
    TOTALS.with(Cell::get)
}

fn bump(update: impl FnOnce(&mut Totals)) {
    TOTALS.with(|t| {
        let mut totals = t.get();
        update(&mut totals);
        t.set(totals);
    });
}

fn report(event: &str, module: &str) {
    if VERBOSE.get_bool().unwrap_or(false) {
        info!(event, module = %module, "Module event");
    } else {
        debug!(event, module = %module, "Module event");
    }
}

fn on_event(_rt: &Runtime, args: &CallbackArgs<'_>) -> i32 {
    match *args {
        CallbackArgs::LoadModule { name, .. } => {
            bump(|t| t.loads += 1);
            report("load", name);
        }
        CallbackArgs::UnloadModule { name, .. } => {
            bump(|t| t.unloads += 1);
            report("unload", name);
        }
        CallbackArgs::Reconfigure(phase) => {
            bump(|t| t.reconfigures += 1);
            report(&format!("reconfigure {phase:?}").to_lowercase(), NAME);
        }
        _ => {}
    }
    0
}

fn init(rt: &Runtime, me: ModuleId) -> bool {
    TOTALS.with(|t| t.set(Totals::default()));
    for list in [LOAD_MODULE_CALLBACK, UNLOAD_MODULE_CALLBACK, RECONFIGURE_CALLBACK] {
        let handler = Callback::new(on_event);
        if let Err(e) = rt.add_callback(ModuleId::CORE, list, &handler, CALLBACK_PRIORITY_MAX, me) {
            warn!(callback = list, error = %e, "Could not subscribe to core event");
            release(rt, me);
            return false;
        }
        HANDLERS.with(|h| h.borrow_mut().push((list, handler)));
    }
    true
}

fn release(rt: &Runtime, me: ModuleId) {
    let handlers = HANDLERS.with(|h| std::mem::take(&mut *h.borrow_mut()));
    for (list, handler) in handlers {
        if let Err(e) = rt.remove_callback(ModuleId::CORE, list, &handler, me) {
            warn!(callback = list, error = %e, "Could not unsubscribe from core event");
        }
    }
}

fn exit(rt: &Runtime, me: ModuleId, _shutdown: bool) -> bool {
    release(rt, me);
    let totals = totals();
    info!(
        loads = totals.loads,
        unloads = totals.unloads,
        reconfigures = totals.reconfigures,
        "Monitor stopped"
    );
    true
}

/// Static table entry.
pub fn entry() -> StaticModule {
    StaticModule::entry_points(NAME, &SELF, init, exit).directives(&DIRECTIVES)
}
