//! Shared-object module source.
//!
//! The identifier `protocol/inspircd3` maps to
//! `<module_dir>/protocol/inspircd3.so` (or the platform's equivalent
//! suffix). Modules must be built against the same `slsvc-core` as the
//! daemon; the version code check enforces that.

#![allow(unsafe_code)]

use super::{ModuleImage, ModuleSource};
use crate::config::DirectiveTable;
use crate::error::LoaderError;
use crate::module::{ExitFn, InitFn, ModuleSlot};
use crate::symbol::{DIRECTIVES_SYMBOL, EXIT_SYMBOL, Export, INIT_SYMBOL, SELF_SYMBOL, VERSION_SYMBOL};
use libloading::{Library, Symbol};
use std::env::consts::DLL_SUFFIX;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Module source opening shared objects from a directory.
#[derive(Debug, Clone)]
pub struct DynamicSource {
    module_dir: PathBuf,
}

impl DynamicSource {
    /// Load modules from `module_dir`.
    pub fn new(module_dir: impl Into<PathBuf>) -> Self {
        Self {
            module_dir: module_dir.into(),
        }
    }

    /// Path a module identifier resolves to.
    pub fn path_for(&self, identifier: &str) -> PathBuf {
        self.module_dir.join(format!("{identifier}{DLL_SUFFIX}"))
    }

    /// Directory modules are loaded from.
    pub fn module_dir(&self) -> &Path {
        &self.module_dir
    }
}

impl ModuleSource for DynamicSource {
    fn kind(&self) -> &'static str {
        "dynamic"
    }

    fn open(&self, identifier: &str) -> Result<Box<dyn ModuleImage>, LoaderError> {
        let path = self.path_for(identifier);
        // SAFETY: running a module's static initializers is inherent to
        // loading it; modules are trusted code built against this crate.
        let library = unsafe { Library::new(&path) }.map_err(|e| LoaderError::Open {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        debug!(module = %identifier, path = %path.display(), "Shared object opened");
        Ok(Box::new(SharedObject { library }))
    }

    fn shared_namespace(&self) -> bool {
        // dlopen'd objects can resolve symbols of earlier ones through the
        // global scope; Windows keeps per-DLL export tables.
        cfg!(unix)
    }
}

struct SharedObject {
    library: Library,
}

impl SharedObject {
    /// Address of a data export, `None` if absent or null.
    fn data<T>(&self, symbol: &str) -> Option<&'static T> {
        // SAFETY: the exported object lives as long as the library. The
        // registry drops every reference derived from an image before the
        // image itself, so `'static` never outlives the mapping in practice.
        unsafe {
            let sym: Symbol<*const T> = self.library.get(symbol.as_bytes()).ok()?;
            (*sym).as_ref()
        }
    }

    fn function<F: Copy>(&self, symbol: &str) -> Option<F> {
        // SAFETY: well-known entry points are declared with the exact
        // `InitFn`/`ExitFn` signatures by every module.
        unsafe {
            let sym: Symbol<F> = self.library.get(symbol.as_bytes()).ok()?;
            Some(*sym)
        }
    }
}

impl ModuleImage for SharedObject {
    fn export(&self, symbol: &str) -> Option<Export> {
        match symbol {
            SELF_SYMBOL => self.data::<ModuleSlot>(symbol).map(Export::Slot),
            VERSION_SYMBOL => self.data::<u32>(symbol).map(Export::Version),
            DIRECTIVES_SYMBOL => self.data::<DirectiveTable>(symbol).map(Export::Directives),
            INIT_SYMBOL => self.function::<InitFn>(symbol).map(Export::Init),
            EXIT_SYMBOL => self.function::<ExitFn>(symbol).map(Export::Exit),
            _ => {
                // SAFETY: only the address is taken, nothing is read.
                let sym: Symbol<*const ()> = unsafe { self.library.get(symbol.as_bytes()) }.ok()?;
                Some(Export::Opaque(*sym as usize))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_map_into_module_dir() {
        let source = DynamicSource::new("/usr/lib/slsvcd");
        let path = source.path_for("nickserv/main");
        assert!(path.starts_with("/usr/lib/slsvcd/nickserv"));
        assert!(path.to_string_lossy().ends_with(&format!("main{DLL_SUFFIX}")));
    }

    #[test]
    fn missing_library_reports_path() {
        let dir = std::env::temp_dir().join("slsvc-core-no-such-dir");
        let source = DynamicSource::new(&dir);
        match source.open("missing/module") {
            Err(LoaderError::Open { path, .. }) => assert_eq!(path, source.path_for("missing/module")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("opened a module that does not exist"),
        }
    }
}
