//! Module configuration directives.
//!
//! A module describes its settings with a [`DirectiveTable`]. Values live in
//! [`DirectiveCell`]s owned by the module; the runtime only references the
//! table. Where values come from is up to the [`Configurator`] the runtime
//! was built with (the daemon reads them from its TOML file).
//!
//! Loading a module applies values immediately. Reconfiguration is two-phase:
//! every module stages its new values first, and only if all of them succeed
//! are the staged values committed.

use crate::error::ConfigureError;
use parking_lot::{Mutex, const_mutex};
use std::fmt;
use tracing::debug;

/// Type of a directive value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    /// `true` / `false`.
    Bool,
    /// Signed 64-bit integer.
    Integer,
    /// Free-form text.
    String,
    /// Ordered list of strings.
    List,
}

impl fmt::Display for DirectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bool => "bool",
            Self::Integer => "integer",
            Self::String => "string",
            Self::List => "list",
        })
    }
}

/// A directive value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    /// A [`DirectiveKind::Bool`] value.
    Bool(bool),
    /// A [`DirectiveKind::Integer`] value.
    Integer(i64),
    /// A [`DirectiveKind::String`] value.
    String(String),
    /// A [`DirectiveKind::List`] value.
    List(Vec<String>),
}

impl ConfigValue {
    /// The kind of this value.
    pub fn kind(&self) -> DirectiveKind {
        match self {
            Self::Bool(_) => DirectiveKind::Bool,
            Self::Integer(_) => DirectiveKind::Integer,
            Self::String(_) => DirectiveKind::String,
            Self::List(_) => DirectiveKind::List,
        }
    }
}

/// What [`configure`] should do with a directive table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigAction {
    /// Read values and make them live immediately (module load).
    Apply,
    /// Read values into the staging area only.
    Stage,
    /// Move staged values live.
    Commit,
    /// Drop staged values.
    Discard,
}

#[derive(Debug)]
enum Staged {
    Empty,
    Value(Option<ConfigValue>),
}

/// Storage for one directive's value, shared between a module and the runtime.
#[derive(Debug)]
pub struct DirectiveCell {
    live: Mutex<Option<ConfigValue>>,
    staged: Mutex<Staged>,
}

impl DirectiveCell {
    /// An unset cell, usable in a `static`.
    pub const fn new() -> Self {
        Self {
            live: const_mutex(None),
            staged: const_mutex(Staged::Empty),
        }
    }

    /// Current live value.
    pub fn get(&self) -> Option<ConfigValue> {
        self.live.lock().clone()
    }

    /// Current value if it is a bool.
    pub fn get_bool(&self) -> Option<bool> {
        match *self.live.lock() {
            Some(ConfigValue::Bool(b)) => Some(b),
            _ => None,
        }
    }

    /// Current value if it is an integer.
    pub fn get_integer(&self) -> Option<i64> {
        match *self.live.lock() {
            Some(ConfigValue::Integer(i)) => Some(i),
            _ => None,
        }
    }

    /// Current value if it is a string.
    pub fn get_string(&self) -> Option<String> {
        match &*self.live.lock() {
            Some(ConfigValue::String(s)) => Some(s.clone()),
            _ => None,
        }
    }

    /// Current value if it is a list.
    pub fn get_list(&self) -> Option<Vec<String>> {
        match &*self.live.lock() {
            Some(ConfigValue::List(l)) => Some(l.clone()),
            _ => None,
        }
    }

    fn set(&self, value: Option<ConfigValue>) {
        *self.live.lock() = value;
    }

    fn stage(&self, value: Option<ConfigValue>) {
        *self.staged.lock() = Staged::Value(value);
    }

    fn commit(&self) {
        let staged = std::mem::replace(&mut *self.staged.lock(), Staged::Empty);
        if let Staged::Value(value) = staged {
            self.set(value);
        }
    }

    fn discard(&self) {
        *self.staged.lock() = Staged::Empty;
    }

    fn clear(&self) {
        self.discard();
        self.set(None);
    }
}

impl Default for DirectiveCell {
    fn default() -> Self {
        Self::new()
    }
}

/// One configuration directive declared by a module.
#[derive(Debug)]
pub struct Directive {
    /// Key looked up in the module's configuration.
    pub name: &'static str,
    /// Expected value type.
    pub kind: DirectiveKind,
    /// Whether configuration fails when the value is absent.
    pub required: bool,
    /// Where the live and staged values are kept.
    pub cell: &'static DirectiveCell,
}

impl Directive {
    /// An optional directive.
    pub const fn new(name: &'static str, kind: DirectiveKind, cell: &'static DirectiveCell) -> Self {
        Self {
            name,
            kind,
            required: false,
            cell,
        }
    }

    /// Mark the directive as required.
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// The directive table a module exports.
#[derive(Debug)]
pub struct DirectiveTable(&'static [Directive]);

impl DirectiveTable {
    /// Wrap a static directive slice.
    pub const fn new(directives: &'static [Directive]) -> Self {
        Self(directives)
    }

    /// All directives, in declaration order.
    pub fn directives(&self) -> &'static [Directive] {
        self.0
    }

    /// Find a directive by name.
    pub fn find(&self, name: &str) -> Option<&'static Directive> {
        self.0.iter().find(|d| d.name == name)
    }
}

/// Source of directive values.
pub trait Configurator {
    /// Re-read the underlying configuration before a reconfiguration.
    fn refresh(&self) -> Result<(), ConfigureError> {
        Ok(())
    }

    /// The configured value of `directive` for `module`, `None` if unset.
    fn read(&self, module: &str, directive: &Directive) -> Result<Option<ConfigValue>, ConfigureError>;
}

/// A configurator with no values at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopConfigurator;

impl Configurator for NoopConfigurator {
    fn read(&self, _module: &str, _directive: &Directive) -> Result<Option<ConfigValue>, ConfigureError> {
        Ok(None)
    }
}

fn read_all(
    configurator: &dyn Configurator,
    module: &str,
    table: &DirectiveTable,
) -> Result<Vec<Option<ConfigValue>>, ConfigureError> {
    table
        .directives()
        .iter()
        .map(|directive| {
            let value = configurator.read(module, directive)?;
            if let Some(found) = value.as_ref().map(ConfigValue::kind)
                && found != directive.kind
            {
                return Err(ConfigureError::TypeMismatch {
                    module: module.to_string(),
                    directive: directive.name.to_string(),
                    expected: directive.kind,
                    found,
                });
            }
            if value.is_none() && directive.required {
                return Err(ConfigureError::MissingRequired {
                    module: module.to_string(),
                    directive: directive.name.to_string(),
                });
            }
            Ok(value)
        })
        .collect()
}

/// Apply `action` to every directive in `table`.
///
/// `Apply` and `Stage` read every value before touching any cell, so a
/// failure leaves the table exactly as it was.
pub fn configure(
    configurator: &dyn Configurator,
    module: &str,
    table: &DirectiveTable,
    action: ConfigAction,
) -> Result<(), ConfigureError> {
    match action {
        ConfigAction::Apply | ConfigAction::Stage => {
            let values = read_all(configurator, module, table)?;
            for (directive, value) in table.directives().iter().zip(values) {
                if action == ConfigAction::Apply {
                    directive.cell.set(value);
                } else {
                    directive.cell.stage(value);
                }
            }
        }
        ConfigAction::Commit => commit(table),
        ConfigAction::Discard => discard(table),
    }
    debug!(module = %module, ?action, directives = table.directives().len(), "Directives configured");
    Ok(())
}

/// Make every staged value in `table` live.
pub fn commit(table: &DirectiveTable) {
    table.directives().iter().for_each(|d| d.cell.commit());
}

/// Drop every staged value in `table`.
pub fn discard(table: &DirectiveTable) {
    table.directives().iter().for_each(|d| d.cell.discard());
}

/// Forget every live and staged value in `table`.
pub fn deconfigure(table: &DirectiveTable) {
    table.directives().iter().for_each(|d| d.cell.clear());
}
