//! Statically linked module table.

use super::{ModuleImage, ModuleSource};
use crate::config::DirectiveTable;
use crate::error::LoaderError;
use crate::module::{ExitFn, InitFn, ModuleSlot};
use crate::symbol::{DIRECTIVES_SYMBOL, EXIT_SYMBOL, Export, INIT_SYMBOL, SELF_SYMBOL, VERSION_SYMBOL};
use crate::version::MODULE_VERSION_CODE;
use std::borrow::Cow;

/// One entry of the static module table: a name and its exports.
#[derive(Debug, Clone)]
pub struct StaticModule {
    name: Cow<'static, str>,
    exports: Vec<(&'static str, Export)>,
}

impl StaticModule {
    /// A module with no exports.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            exports: Vec::new(),
        }
    }

    /// A module exporting the mandatory symbols at the runtime's version.
    pub fn entry_points(
        name: impl Into<Cow<'static, str>>,
        slot: &'static ModuleSlot,
        init: InitFn,
        exit: ExitFn,
    ) -> Self {
        Self::new(name)
            .export(SELF_SYMBOL, Export::Slot(slot))
            .export(VERSION_SYMBOL, Export::Version(&MODULE_VERSION_CODE))
            .export(INIT_SYMBOL, Export::Init(init))
            .export(EXIT_SYMBOL, Export::Exit(exit))
    }

    /// Add (or replace) an export.
    pub fn export(mut self, symbol: &'static str, export: Export) -> Self {
        self.exports.retain(|(name, _)| *name != symbol);
        self.exports.push((symbol, export));
        self
    }

    /// Export a configuration directive table.
    pub fn directives(self, table: &'static DirectiveTable) -> Self {
        self.export(DIRECTIVES_SYMBOL, Export::Directives(table))
    }

    /// Module name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

struct TableImage {
    exports: Vec<(&'static str, Export)>,
}

impl ModuleImage for TableImage {
    fn export(&self, symbol: &str) -> Option<Export> {
        self.exports
            .iter()
            .find(|(name, _)| *name == symbol)
            .map(|(_, export)| *export)
    }
}

/// Module source backed by a table compiled into the binary.
#[derive(Debug, Default, Clone)]
pub struct StaticSource {
    table: Vec<StaticModule>,
}

impl StaticSource {
    /// Build a source from table entries.
    pub fn new(table: Vec<StaticModule>) -> Self {
        Self { table }
    }

    /// Add an entry.
    pub fn with(mut self, module: StaticModule) -> Self {
        self.table.push(module);
        self
    }

    /// Names of every module in the table.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.table.iter().map(StaticModule::name)
    }
}

impl ModuleSource for StaticSource {
    fn kind(&self) -> &'static str {
        "static"
    }

    fn open(&self, identifier: &str) -> Result<Box<dyn ModuleImage>, LoaderError> {
        let entry = self
            .table
            .iter()
            .find(|m| m.name == identifier)
            .ok_or_else(|| LoaderError::NotInTable(identifier.to_string()))?;
        Ok(Box::new(TableImage {
            exports: entry.exports.clone(),
        }))
    }
}
