//! Module exports and cross-module symbol resolution.

use crate::config::DirectiveTable;
use crate::error::SymbolError;
use crate::module::{ExitFn, InitFn, Module, ModuleId, ModuleSlot};
use crate::registry::Runtime;
use std::fmt;
use tracing::debug;

/// Self-pointer slot export.
pub const SELF_SYMBOL: &str = "MODULE_SELF";
/// Version code export.
pub const VERSION_SYMBOL: &str = "MODULE_VERSION";
/// Optional configuration directive table export.
pub const DIRECTIVES_SYMBOL: &str = "MODULE_DIRECTIVES";
/// Initializer entry point.
pub const INIT_SYMBOL: &str = "module_init";
/// Exit entry point.
pub const EXIT_SYMBOL: &str = "module_exit";

/// A value exported by a module image.
///
/// Well-known exports are typed; anything else is an opaque address that
/// the importing module interprets.
#[derive(Clone, Copy)]
pub enum Export {
    /// `MODULE_SELF`.
    Slot(&'static ModuleSlot),
    /// `MODULE_VERSION`.
    Version(&'static u32),
    /// `MODULE_DIRECTIVES`.
    Directives(&'static DirectiveTable),
    /// `module_init`.
    Init(InitFn),
    /// `module_exit`.
    Exit(ExitFn),
    /// Any other symbol, by address.
    Opaque(usize),
}

impl Export {
    /// Address of the exported object. `0` for a null opaque symbol.
    pub fn address(&self) -> usize {
        match *self {
            Self::Slot(slot) => slot as *const ModuleSlot as usize,
            Self::Version(code) => code as *const u32 as usize,
            Self::Directives(table) => table as *const DirectiveTable as usize,
            Self::Init(f) => f as usize,
            Self::Exit(f) => f as usize,
            Self::Opaque(addr) => addr,
        }
    }
}

impl fmt::Debug for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Slot(_) => "Slot",
            Self::Version(_) => "Version",
            Self::Directives(_) => "Directives",
            Self::Init(_) => "Init",
            Self::Exit(_) => "Exit",
            Self::Opaque(_) => "Opaque",
        };
        write!(f, "{kind}({:#x})", self.address())
    }
}

/// Whether `export`, found under `symbol` in a module loaded after every
/// module in `older`, is really one of theirs leaking through a shared
/// symbol namespace.
pub(crate) fn leaked_from<'m>(older: &'m [Module], symbol: &str, export: &Export) -> Option<&'m str> {
    let addr = export.address();
    if addr == 0 {
        return None;
    }
    older
        .iter()
        .find(|m| {
            m.image
                .as_ref()
                .and_then(|image| image.export(symbol))
                .is_some_and(|theirs| theirs.address() == addr)
        })
        .map(|m| m.name.as_str())
}

impl Runtime {
    /// Export `symbol` of the module at `index`, with leak detection.
    fn export_at(&self, modules: &[Module], index: usize, symbol: &str) -> Option<Export> {
        let module = &modules[index];
        let export = module.image.as_ref()?.export(symbol)?;
        if self.source.shared_namespace() {
            // Modules are inserted at the front, so older ones follow.
            if let Some(owner) = leaked_from(&modules[index + 1..], symbol, &export) {
                debug!(module = %module.name, symbol, owner, "Ignoring symbol leaked from another module");
                return None;
            }
        }
        Some(export)
    }

    /// Look up `symbol` in `module`, or in every module (registry order)
    /// when `module` is `None`.
    ///
    /// Distinguishes a missing symbol from one whose value is null: the
    /// latter resolves to `Export::Opaque(0)`.
    pub fn lookup_checked(&self, module: Option<ModuleId>, symbol: &str) -> Result<Export, SymbolError> {
        let modules = self.modules.borrow();
        let found = match module {
            Some(id) => {
                let index = modules
                    .iter()
                    .position(|m| m.id == id)
                    .ok_or(SymbolError::NoSuchModule(id))?;
                self.export_at(&modules, index, symbol)
            }
            None => (0..modules.len()).find_map(|i| self.export_at(&modules, i, symbol)),
        };
        found.ok_or_else(|| SymbolError::NotFound(symbol.to_string()))
    }

    /// [`lookup_checked`](Self::lookup_checked) without the error detail.
    pub fn lookup(&self, module: Option<ModuleId>, symbol: &str) -> Option<Export> {
        self.lookup_checked(module, symbol).ok()
    }

    /// Address of `symbol`, `0` when it is missing.
    ///
    /// A null-valued symbol also yields `0`; use
    /// [`lookup_checked`](Self::lookup_checked) when the two must be told apart.
    pub fn lookup_address(&self, module: Option<ModuleId>, symbol: &str) -> usize {
        self.lookup(module, symbol).map_or(0, |e| e.address())
    }
}
