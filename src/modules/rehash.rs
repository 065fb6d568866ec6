//! `core/rehash`: operator-triggered configuration reloads.
//!
//! Owns the `"rehash requested"` callback list. Modules that need to finish
//! something before configuration changes under them subscribe to it and
//! return nonzero to postpone the rehash.

use super::monitor;
use slsvc_core::source::StaticModule;
use slsvc_core::{CallbackArgs, ModuleId, ModuleSlot, Runtime};
use tracing::{info, warn};

pub const NAME: &str = "core/rehash";

/// Callback list dispatched before every rehash.
pub const REHASH_REQUESTED: &str = "rehash requested";

static SELF: ModuleSlot = ModuleSlot::new();

fn init(rt: &Runtime, me: ModuleId) -> bool {
    let monitor = match rt.find_module(monitor::NAME) {
        Some(id) => id,
        None => match rt.load_module(monitor::NAME) {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Rehash support needs {}", monitor::NAME);
                return false;
            }
        },
    };
    if let Err(e) = rt.register_callback(me, REHASH_REQUESTED) {
        warn!(error = %e, "Could not register rehash callback");
        return false;
    }
    rt.use_module(monitor, me);
    true
}

fn exit(rt: &Runtime, me: ModuleId, _shutdown: bool) -> bool {
    if let Some(monitor) = rt.find_module(monitor::NAME) {
        rt.unuse_module(monitor, me);
    }
    true
}

/// Ask subscribers, then reload every module's configuration.
///
/// Returns whether new configuration was applied. Without `core/rehash`
/// loaded the reload happens unconditionally.
pub fn request(rt: &Runtime) -> bool {
    if let Some(me) = rt.find_module(NAME) {
        match rt.dispatch_named(me, REHASH_REQUESTED, &CallbackArgs::None) {
            Ok(0) => {}
            Ok(code) => {
                warn!(code, "Rehash postponed by a module");
                return false;
            }
            Err(e) => warn!(error = %e, "Rehash callback unavailable"),
        }
    }
    let applied = rt.reconfigure_all();
    if applied {
        info!("Rehash complete");
    }
    applied
}

/// Static table entry.
pub fn entry() -> StaticModule {
    StaticModule::entry_points(NAME, &SELF, init, exit)
}
