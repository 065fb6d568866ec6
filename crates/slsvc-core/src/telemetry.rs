//! Standardized span constructors for runtime observability.

/// Spans wrapping module lifecycle and callback dispatch.
pub mod spans {
    use crate::callback::CallbackId;
    use crate::module::ModuleId;
    use tracing::{Span, debug_span, info_span, trace_span};

    /// Span for loading a module. Nested loads show up nested.
    pub fn load(identifier: &str) -> Span {
        info_span!("module.load", module = %identifier)
    }

    /// Span for unloading a module.
    pub fn unload(name: &str, shutdown: bool) -> Span {
        info_span!("module.unload", module = %name, shutdown)
    }

    /// Span for a reconfiguration pass.
    pub fn reconfigure() -> Span {
        debug_span!("module.reconfigure")
    }

    /// Span for one callback dispatch.
    pub fn dispatch(module: ModuleId, callback: CallbackId) -> Span {
        trace_span!("callback.dispatch", module = %module, callback)
    }
}
