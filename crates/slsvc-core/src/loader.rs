//! Module loader: validates a resolved image's exports.
//!
//! An image becomes a module only if it exports a self slot, a version code
//! equal to [`MODULE_VERSION_CODE`] and both entry points. The directive
//! table is optional. On any failure the image is dropped, which releases
//! its loader handle.

use crate::error::LoadError;
use crate::module::{Linkage, Module};
use crate::registry::Runtime;
use crate::source::ModuleImage;
use crate::symbol::{
    DIRECTIVES_SYMBOL, EXIT_SYMBOL, Export, INIT_SYMBOL, SELF_SYMBOL, VERSION_SYMBOL, leaked_from,
};
use crate::version::{MODULE_VERSION_CODE, describe_version};
use tracing::{debug, warn};

/// Resolve `symbol` in a not-yet-registered image, ignoring exports that
/// actually belong to an already loaded module.
fn resolve(
    image: &dyn ModuleImage,
    loaded: &[Module],
    shared_namespace: bool,
    identifier: &str,
    symbol: &str,
) -> Option<Export> {
    let export = image.export(symbol)?;
    if shared_namespace && let Some(owner) = leaked_from(loaded, symbol, &export) {
        debug!(module = %identifier, symbol, owner, "Ignoring symbol leaked from another module");
        return None;
    }
    Some(export)
}

fn missing(identifier: &str, symbol: &'static str) -> LoadError {
    warn!(module = %identifier, symbol, "Required symbol not found");
    LoadError::MissingSymbol {
        module: identifier.to_string(),
        symbol,
    }
}

impl Runtime {
    /// Validate the exports of `image` and extract the module's linkage.
    pub(crate) fn materialize(
        &self,
        image: &dyn ModuleImage,
        identifier: &str,
    ) -> Result<Linkage, LoadError> {
        let modules = self.modules.borrow();
        let shared = self.source.shared_namespace();
        let lookup = |symbol: &str| resolve(image, &modules, shared, identifier, symbol);

        let Some(Export::Slot(slot)) = lookup(SELF_SYMBOL) else {
            return Err(missing(identifier, SELF_SYMBOL));
        };

        let Some(Export::Version(&version)) = lookup(VERSION_SYMBOL) else {
            return Err(missing(identifier, VERSION_SYMBOL));
        };
        if version != MODULE_VERSION_CODE {
            warn!(
                module = %identifier,
                module_version = %describe_version(version),
                runtime_version = %describe_version(MODULE_VERSION_CODE),
                "Module version mismatch"
            );
            return Err(LoadError::VersionMismatch {
                module: identifier.to_string(),
                found: version,
                expected: MODULE_VERSION_CODE,
            });
        }

        let directives = match lookup(DIRECTIVES_SYMBOL) {
            Some(Export::Directives(table)) => Some(table),
            Some(other) => {
                warn!(module = %identifier, export = ?other, "Directive table has the wrong type, ignoring");
                None
            }
            None => None,
        };

        let Some(Export::Init(init)) = lookup(INIT_SYMBOL) else {
            return Err(missing(identifier, INIT_SYMBOL));
        };
        let Some(Export::Exit(exit)) = lookup(EXIT_SYMBOL) else {
            return Err(missing(identifier, EXIT_SYMBOL));
        };

        Ok(Linkage {
            slot,
            version,
            directives,
            init,
            exit,
        })
    }
}
