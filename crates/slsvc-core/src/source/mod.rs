//! Module sources: where loadable module images come from.
//!
//! Two interchangeable strategies sit behind [`ModuleSource`]:
//! - [`table`]: a table of modules linked into the daemon binary
//! - [`dynamic`]: shared objects opened at runtime (`dynamic` feature)
//!
//! Everything above this layer is agnostic to which one is active.

#[cfg(feature = "dynamic")]
pub mod dynamic;
pub mod table;

#[cfg(feature = "dynamic")]
pub use dynamic::DynamicSource;
pub use table::{StaticModule, StaticSource};

use crate::error::{LoadError, LoaderError};
use crate::symbol::Export;

/// A resolved, not yet validated module image.
///
/// Dropping the image releases the underlying loader handle.
pub trait ModuleImage {
    /// Look up an export by name in this image only.
    fn export(&self, symbol: &str) -> Option<Export>;
}

/// Resolves module identifiers to images.
pub trait ModuleSource {
    /// Short backend name for logs.
    fn kind(&self) -> &'static str;

    /// Resolve `identifier` to a loadable image.
    fn open(&self, identifier: &str) -> Result<Box<dyn ModuleImage>, LoaderError>;

    /// Whether exports of one image can leak into lookups on another
    /// (global symbol visibility). When true, the resolver cross-checks
    /// addresses against already loaded modules.
    fn shared_namespace(&self) -> bool {
        false
    }
}

/// Reject identifiers that could escape the module directory.
pub fn validate_identifier(identifier: &str) -> Result<(), LoadError> {
    let traverses = identifier.split(['/', '\\']).any(|part| part == "..");
    let absolute = identifier.starts_with(['/', '\\']) || identifier.contains(':');
    if identifier.is_empty() || traverses || absolute {
        return Err(LoadError::InvalidIdentifier(identifier.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_is_rejected() {
        for bad in ["", "..", "../etc/passwd", "nickserv/../../x", "a\\..\\b", "/etc/passwd", "C:\\x"] {
            assert!(validate_identifier(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn nested_identifiers_are_accepted() {
        for good in ["nickserv/main", "protocol/inspircd3", "database/version4", "a..b"] {
            assert!(validate_identifier(good).is_ok(), "{good:?} should be accepted");
        }
    }
}
