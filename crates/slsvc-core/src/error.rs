//! Unified error handling for the plugin runtime.
//!
//! Every fallible runtime operation reports failure through one of these
//! enums. None of them is process-fatal: the runtime always returns to its
//! pre-call state before handing an error back.

use crate::callback::CallbackId;
use crate::config::DirectiveKind;
use crate::module::ModuleId;
use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Loader Errors (module source backends)
// ============================================================================

/// Errors raised by a [`ModuleSource`](crate::source::ModuleSource) while
/// resolving an identifier to a loadable image.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The static table has no entry with this name.
    #[error("no module named {0} in the static module table")]
    NotInTable(String),

    /// The shared object could not be opened.
    #[error("failed to open {}: {reason}", path.display())]
    Open {
        /// File the identifier mapped to.
        path: PathBuf,
        /// Error text from the platform loader.
        reason: String,
    },
}

impl LoaderError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotInTable(_) => "not_in_table",
            Self::Open { .. } => "open_failed",
        }
    }
}

// ============================================================================
// Load Errors (Runtime::load_module)
// ============================================================================

/// Errors that can occur while loading a module.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Empty identifier, or one that could escape the module directory.
    #[error("invalid module identifier: {0:?}")]
    InvalidIdentifier(String),

    /// A module with this name is already loaded.
    #[error("module {0} is already loaded")]
    AlreadyLoaded(String),

    /// [`Runtime::unload_all`](crate::Runtime::unload_all) has started.
    #[error("runtime is shutting down")]
    ShuttingDown,

    /// The module source could not produce an image.
    #[error("module {module}: {source}")]
    Loader {
        /// Identifier being loaded.
        module: String,
        /// Backend failure.
        #[source]
        source: LoaderError,
    },

    /// A mandatory export is absent or has the wrong kind.
    #[error("module {module}: required symbol {symbol} not found")]
    MissingSymbol {
        /// Identifier being loaded.
        module: String,
        /// Name of the missing export.
        symbol: &'static str,
    },

    /// The module was built against a different runtime version.
    #[error("module {module}: version code {found:#010x} does not match runtime {expected:#010x}")]
    VersionMismatch {
        /// Identifier being loaded.
        module: String,
        /// Code the module exports.
        found: u32,
        /// [`MODULE_VERSION_CODE`](crate::MODULE_VERSION_CODE).
        expected: u32,
    },

    /// The module's directives could not be applied.
    #[error("module {module}: configuration failed: {source}")]
    Configure {
        /// Identifier being loaded.
        module: String,
        /// Configurator failure.
        #[source]
        source: ConfigureError,
    },

    /// The initializer returned `false`, or the module was gone when it returned.
    #[error("module {0}: initialization failed")]
    InitFailed(String),
}

impl LoadError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidIdentifier(_) => "invalid_identifier",
            Self::AlreadyLoaded(_) => "already_loaded",
            Self::ShuttingDown => "shutting_down",
            Self::Loader { .. } => "loader_failed",
            Self::MissingSymbol { .. } => "missing_symbol",
            Self::VersionMismatch { .. } => "version_mismatch",
            Self::Configure { .. } => "configure_failed",
            Self::InitFailed(_) => "init_failed",
        }
    }
}

// ============================================================================
// Unload Errors (Runtime::unload_module)
// ============================================================================

/// Errors that can occur while unloading a module.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnloadError {
    /// Attempt to unload the core module.
    #[error("the core module cannot be unloaded")]
    Core,

    /// No loaded module has this id.
    #[error("module {0} is not loaded")]
    NotLoaded(ModuleId),

    /// Other modules still depend on this one.
    #[error("module {module} is in use by {}", dependents.join(", "))]
    InUse {
        /// Module that was asked to unload.
        module: String,
        /// Names of the modules using it.
        dependents: Vec<String>,
    },

    /// The exit routine returned `false` outside shutdown.
    #[error("module {0} refused to unload")]
    Vetoed(String),

    /// The module's exit routine is already running.
    #[error("module {0} is already being unloaded")]
    InProgress(String),
}

impl UnloadError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::NotLoaded(_) => "not_loaded",
            Self::InUse { .. } => "in_use",
            Self::Vetoed(_) => "vetoed",
            Self::InProgress(_) => "in_progress",
        }
    }
}

// ============================================================================
// Callback Errors (callback registry)
// ============================================================================

/// Callback registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    /// The owning or subscribing module is not loaded.
    #[error("module {0} is not loaded")]
    NoSuchModule(ModuleId),

    /// The module already has a list with this name.
    #[error("callback {name:?} is already registered by {module}")]
    Duplicate {
        /// Owning module.
        module: String,
        /// List name.
        name: String,
    },

    /// The id was never issued or its list has been unregistered.
    #[error("invalid callback id {0}")]
    InvalidId(CallbackId),

    /// The module has no live list with this name.
    #[error("module {module} has no callback named {name:?}")]
    NoSuchCallback {
        /// Owning module.
        module: String,
        /// List name.
        name: String,
    },

    /// Priority outside `CALLBACK_PRIORITY_MIN..=CALLBACK_PRIORITY_MAX`.
    #[error("priority {0} is outside the supported range")]
    PriorityOutOfRange(i32),

    /// The handler is not on the list.
    #[error("handler is not subscribed to {0:?}")]
    NotSubscribed(String),

    /// The handler was added by a different module.
    #[error("handler on {name:?} belongs to module {owner}")]
    NotOwner {
        /// List name.
        name: String,
        /// Module that added the handler.
        owner: ModuleId,
    },
}

impl CallbackError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NoSuchModule(_) => "no_such_module",
            Self::Duplicate { .. } => "duplicate",
            Self::InvalidId(_) => "invalid_id",
            Self::NoSuchCallback { .. } => "no_such_callback",
            Self::PriorityOutOfRange(_) => "priority_out_of_range",
            Self::NotSubscribed(_) => "not_subscribed",
            Self::NotOwner { .. } => "not_owner",
        }
    }
}

// ============================================================================
// Symbol Errors (symbol resolver)
// ============================================================================

/// Symbol lookup errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymbolError {
    /// The module to search is not loaded.
    #[error("module {0} is not loaded")]
    NoSuchModule(ModuleId),

    /// No searched module exports the symbol.
    #[error("symbol {0} not found")]
    NotFound(String),
}

// ============================================================================
// Configure Errors (configuration collaborator)
// ============================================================================

/// Errors reported while reading module configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigureError {
    /// A required directive has no value.
    #[error("{module}: required directive {directive} is missing")]
    MissingRequired {
        /// Module being configured.
        module: String,
        /// Directive name.
        directive: String,
    },

    /// The configured value has the wrong kind.
    #[error("{module}: directive {directive} expects {expected}, found {found}")]
    TypeMismatch {
        /// Module being configured.
        module: String,
        /// Directive name.
        directive: String,
        /// Kind the directive declares.
        expected: DirectiveKind,
        /// Kind of the configured value.
        found: DirectiveKind,
    },

    /// The underlying configuration could not be read.
    #[error("configuration source: {0}")]
    Source(String),
}
