//! # slsvc-core
//!
//! The plugin runtime behind the Straylight services daemon.
//!
//! Every piece of services functionality (NickServ, ChanServ, protocol
//! dialects, database drivers) lives in a module. This crate loads those
//! modules, tracks which modules depend on which, resolves symbols across
//! module boundaries and provides the callback lists modules use to observe
//! and intercept one another.
//!
//! ## Components
//!
//! - [`Runtime`]: the module registry and the single owner of all state
//! - [`source`]: where module images come from (static table or shared objects)
//! - [`symbol`]: module exports and cross-module symbol lookup
//! - [`callback`]: named, prioritized, multi-subscriber callback lists
//! - [`deps`]: dependency ("use count") tracking between modules
//! - [`config`]: module configuration directives and the configurator seam
//!
//! ## Quick Start
//!
//! ```rust
//! use slsvc_core::{
//!     Callback, CallbackArgs, ModuleId, ModuleSlot, NoopConfigurator, Runtime,
//!     source::{StaticModule, StaticSource},
//! };
//!
//! static SELF: ModuleSlot = ModuleSlot::new();
//!
//! fn init(rt: &Runtime, me: ModuleId) -> bool {
//!     rt.register_callback(me, "greeting").is_ok()
//! }
//!
//! fn exit(_rt: &Runtime, _me: ModuleId, _shutdown: bool) -> bool {
//!     true
//! }
//!
//! let source = StaticSource::new(vec![StaticModule::entry_points("demo/hello", &SELF, init, exit)]);
//! let rt = Runtime::new(Box::new(source), Box::new(NoopConfigurator));
//!
//! let hello = rt.load_module("demo/hello").expect("module loads");
//! rt.add_callback(hello, "greeting", &Callback::new(|_, _| 42), 0, ModuleId::CORE)
//!     .expect("subscribe");
//! assert_eq!(rt.dispatch_named(hello, "greeting", &CallbackArgs::None), Ok(42));
//!
//! assert!(rt.teardown().is_empty());
//! ```
//!
//! The runtime is strictly single-threaded. Module code (initializers, exit
//! routines, callback handlers) may call back into the runtime freely; no
//! internal borrow is held while module code runs.

#![warn(missing_docs)]

pub mod callback;
pub mod config;
pub mod deps;
pub mod error;
pub mod loader;
pub mod module;
pub mod registry;
pub mod source;
pub mod symbol;
pub mod telemetry;
pub mod version;

pub use callback::{
    CALLBACK_PRIORITY_MAX, CALLBACK_PRIORITY_MIN, Callback, CallbackArgs, CallbackId,
    ReconfigurePhase,
};
pub use config::{
    ConfigAction, ConfigValue, Configurator, Directive, DirectiveCell, DirectiveKind,
    DirectiveTable, NoopConfigurator,
};
pub use error::{CallbackError, ConfigureError, LoadError, LoaderError, SymbolError, UnloadError};
pub use module::{ExitFn, InitFn, ModuleId, ModuleSlot};
pub use registry::{
    CORE_MODULE_NAME, LOAD_MODULE_CALLBACK, RECONFIGURE_CALLBACK, Runtime, UNLOAD_MODULE_CALLBACK,
};
pub use source::{ModuleImage, ModuleSource};
pub use symbol::Export;
pub use version::{MODULE_VERSION_CODE, ReleaseStatus, describe_version, version_code};
